// crates/bmc_cma/src/transition.rs

//! 稀疏转移矩阵与累积概率表
//!
//! 从稠密流量快照构造 CSR 稀疏转移矩阵：非对角元为隔室间
//! 流量，对角元为负的行流出总和。在其上按邻接表构造行归一化
//! 的累积概率表，供移动核按两次随机数采样目标隔室。
//!
//! # 概率表约定
//!
//! - 对角元非零的行，最后一个累积项在浮点容差内等于 1
//! - 对角元为零（无流出）的行整行为 0
//! - 邻接行中间出现的自环填充用 `continue` 跳过而非 `break`，
//!   允许 `[j, k, i, i, l]` 这种次序（流图概念上不推荐，但需容忍）

use crate::snapshot::NeighborTable;

/// CSR 稀疏转移矩阵
///
/// 只存非零非对角元和对角元；`coeff` 缺省返回 0。
#[derive(Debug, Clone, Default)]
pub struct FlowMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl FlowMatrix {
    /// 从稠密行主序流量矩阵构造转移矩阵
    ///
    /// 对角元设为负的行流出总和（自环流量不计入）。
    ///
    /// # Panics
    ///
    /// debug 模式下 `flows.len() != n * n` 触发断言。
    pub fn from_dense_flows(flows: &[f64], n: usize) -> Self {
        debug_assert_eq!(flows.len(), n * n, "流量矩阵必须为方阵");

        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        for i in 0..n {
            let mut row_sum = 0.0;
            let mut diag_slot = None;
            for j in 0..n {
                if i == j {
                    // 对角元稍后回填为 -row_sum
                    diag_slot = Some(values.len());
                    col_idx.push(j);
                    values.push(0.0);
                    continue;
                }
                let val = flows[i * n + j];
                if val != 0.0 {
                    col_idx.push(j);
                    values.push(val);
                    row_sum += val;
                }
            }
            if let Some(slot) = diag_slot {
                values[slot] = -row_sum;
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// 矩阵维度
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// 取元素 (i, j)，缺省为 0
    #[inline]
    pub fn coeff(&self, i: usize, j: usize) -> f64 {
        let start = self.row_ptr[i];
        let end = self.row_ptr[i + 1];
        match self.col_idx[start..end].binary_search(&j) {
            Ok(pos) => self.values[start + pos],
            Err(_) => 0.0,
        }
    }

    /// 各隔室流出总量（对角元取反）
    ///
    /// 移动核用它作为离开概率的流量项。
    pub fn outflow_diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|i| -self.coeff(i, i)).collect()
    }
}

/// 行主序稠密累积概率表
///
/// 行 = 隔室，列对齐邻接表列。行宽与邻接表一致。
#[derive(Debug, Clone, Default)]
pub struct CumulativeProbability {
    n_row: usize,
    n_col: usize,
    data: Vec<f64>,
}

impl CumulativeProbability {
    /// 由转移矩阵和邻接表构造累积概率表
    pub fn build(transition: &FlowMatrix, neighbors: &NeighborTable) -> Self {
        let n_row = neighbors.n_row();
        let n_col = neighbors.n_col();
        let mut data = vec![0.0; n_row * n_col];

        for k in 0..n_row {
            let mut cumsum = 0.0;
            let mut count_neighbor = 0usize;
            let out_flow = transition.coeff(k, k);

            for &neighbor in neighbors.row(k) {
                // 自环填充：跳过但推进列计数，容忍行中间的填充
                if neighbor == k {
                    count_neighbor += 1;
                    continue;
                }

                let proba_out = if out_flow != 0.0 {
                    transition.coeff(k, neighbor) / out_flow.abs()
                } else {
                    0.0
                };

                data[k * n_col + count_neighbor] = proba_out + cumsum;
                count_neighbor += 1;
                cumsum += proba_out;
            }
        }

        Self { n_row, n_col, data }
    }

    /// 行数
    #[inline]
    pub fn n_row(&self) -> usize {
        self.n_row
    }

    /// 行宽
    #[inline]
    pub fn n_col(&self) -> usize {
        self.n_col
    }

    /// 隔室 `i` 的累积概率行
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_col..(i + 1) * self.n_col]
    }

    /// 取元素
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_col + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    fn two_compartment() -> (FlowMatrix, NeighborTable) {
        // 0 <-> 1, 流量 2.0 / 3.0
        let flows = vec![0.0, 2.0, 3.0, 0.0];
        let m = FlowMatrix::from_dense_flows(&flows, 2);
        let table = NeighborTable::new(2, 2, vec![1, 0, 0, 1]).unwrap();
        (m, table)
    }

    #[test]
    fn test_transition_diagonal_is_negative_row_sum() {
        let (m, _) = two_compartment();
        assert!((m.coeff(0, 0) + 2.0).abs() < TOL);
        assert!((m.coeff(1, 1) + 3.0).abs() < TOL);
        assert!((m.coeff(0, 1) - 2.0).abs() < TOL);
        assert_eq!(m.outflow_diagonal(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_cumulative_probability_sums_to_one() {
        let (m, table) = two_compartment();
        let cp = CumulativeProbability::build(&m, &table);
        // 每行最后一个非填充项为 1
        assert!((cp.get(0, 0) - 1.0).abs() < TOL);
        assert!((cp.get(1, 1) - 1.0).abs() < TOL);
    }

    #[test]
    fn test_cumulative_probability_zero_outflow_row() {
        // 隔室 1 无流出
        let flows = vec![0.0, 2.0, 0.0, 0.0];
        let m = FlowMatrix::from_dense_flows(&flows, 2);
        let table = NeighborTable::new(2, 2, vec![1, 0, 0, 1]).unwrap();
        let cp = CumulativeProbability::build(&m, &table);
        assert!(cp.row(1).iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_cumulative_probability_mid_row_padding() {
        // 三隔室，隔室 0 的邻接行为 [1, 0, 2]：填充在中间
        let flows = vec![
            0.0, 1.0, 3.0, //
            1.0, 0.0, 0.0, //
            0.0, 2.0, 0.0,
        ];
        let m = FlowMatrix::from_dense_flows(&flows, 3);
        let table = NeighborTable::new(3, 3, vec![1, 0, 2, 0, 1, 1, 1, 2, 2]).unwrap();
        let cp = CumulativeProbability::build(&m, &table);
        // 列 0: 1/4, 列 1 为填充保持 0, 列 2: 1/4 + 3/4 = 1
        assert!((cp.get(0, 0) - 0.25).abs() < TOL);
        assert_eq!(cp.get(0, 1), 0.0);
        assert!((cp.get(0, 2) - 1.0).abs() < TOL);
    }

    #[test]
    fn test_single_compartment_trivial() {
        let m = FlowMatrix::from_dense_flows(&[0.0], 1);
        let table = NeighborTable::single_compartment();
        let cp = CumulativeProbability::build(&m, &table);
        assert_eq!(cp.row(0), &[0.0]);
        assert_eq!(m.outflow_diagonal(), vec![0.0]);
    }
}
