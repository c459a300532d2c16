// crates/bmc_cma/src/snapshot.rs

//! 流图快照与邻接表
//!
//! 定义外部流场读取器交付的数据形式：每个快照包含隔室数量、
//! 液相/气相体积、稠密行主序流量矩阵和隔室邻接表。
//!
//! 读取器本身不在本仓库范围内，核心只通过 [`FlowProvider`]
//! 顺序访问接口消费快照；仅 host 进程持有 provider。
//!
//! # 邻接表布局
//!
//! 扁平化 CSR 风格定宽表：行 = 隔室，列 = 邻居编号，行宽取
//! 最大邻居数，不足处用自环（行自身编号）填充。
//!
//! ```text
//! 隔室 0: [1, 2, 0, 0]   <- 两个真实邻居 + 自环填充
//! 隔室 1: [0, 2, 3, 1]
//! ```

use bmc_foundation::error::{BmcError, BmcResult};
use serde::{Deserialize, Serialize};

/// 扁平化隔室邻接表（定宽，自环填充）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborTable {
    n_row: usize,
    n_col: usize,
    data: Vec<usize>,
}

impl NeighborTable {
    /// 从扁平数据创建邻接表
    ///
    /// # 参数
    /// - `n_row`: 隔室数量
    /// - `n_col`: 行宽（最大邻居数）
    /// - `data`: 行主序扁平数据，长度必须为 `n_row * n_col`
    pub fn new(n_row: usize, n_col: usize, data: Vec<usize>) -> BmcResult<Self> {
        if data.len() != n_row * n_col {
            return Err(BmcError::dimension_mismatch(
                "邻接表数据",
                n_row * n_col,
                data.len(),
            ));
        }
        if let Some(&bad) = data.iter().find(|&&c| c >= n_row) {
            return Err(BmcError::invalid_input(format!(
                "邻接表包含越界隔室编号 {bad} (隔室数 {n_row})"
            )));
        }
        Ok(Self { n_row, n_col, data })
    }

    /// 单隔室（0-D 反应器）的平凡邻接表
    pub fn single_compartment() -> Self {
        Self {
            n_row: 1,
            n_col: 1,
            data: vec![0],
        }
    }

    /// 隔室数量
    #[inline]
    pub fn n_row(&self) -> usize {
        self.n_row
    }

    /// 行宽
    #[inline]
    pub fn n_col(&self) -> usize {
        self.n_col
    }

    /// 获取隔室 `i` 的邻居行（含自环填充）
    #[inline]
    pub fn row(&self, i: usize) -> &[usize] {
        &self.data[i * self.n_col..(i + 1) * self.n_col]
    }

    /// 扁平数据视图（用于线路传输）
    #[inline]
    pub fn data(&self) -> &[usize] {
        &self.data
    }
}

/// 一个离散化反应器流场快照
///
/// 流量矩阵为稠密行主序 `n × n`；`flow[i*n + j]` 表示隔室 i
/// 到隔室 j 的体积流量。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSnapshot {
    /// 隔室数量
    pub n_compartments: usize,
    /// 液相流量矩阵（稠密行主序）
    pub liquid_flow: Vec<f64>,
    /// 气相流量矩阵（两相流时存在）
    pub gas_flow: Option<Vec<f64>>,
    /// 各隔室液相体积
    pub liquid_volume: Vec<f64>,
    /// 各隔室气相体积
    pub gas_volume: Vec<f64>,
    /// 隔室邻接表
    pub neighbors: NeighborTable,
    /// 湍动能耗散率（每步辅助标量）
    pub energy_dissipation: f64,
}

impl FlowSnapshot {
    /// 校验快照内部一致性
    pub fn validate(&self) -> BmcResult<()> {
        let n = self.n_compartments;
        bmc_foundation::validation::check_dimension("液相流量矩阵", n * n, self.liquid_flow.len())?;
        bmc_foundation::validation::check_dimension("液相体积", n, self.liquid_volume.len())?;
        if !self.gas_volume.is_empty() {
            bmc_foundation::validation::check_dimension("气相体积", n, self.gas_volume.len())?;
        }
        if let Some(gas) = &self.gas_flow {
            bmc_foundation::validation::check_dimension("气相流量矩阵", n * n, gas.len())?;
        }
        bmc_foundation::validation::check_dimension("邻接表行数", n, self.neighbors.n_row())?;
        Ok(())
    }

    /// 单隔室快照（0-D 反应器，无水力时间尺度）
    pub fn zero_dimensional(liquid_volume: f64, gas_volume: f64) -> Self {
        Self {
            n_compartments: 1,
            liquid_flow: vec![0.0],
            gas_flow: None,
            liquid_volume: vec![liquid_volume],
            gas_volume: vec![gas_volume],
            neighbors: NeighborTable::single_compartment(),
            energy_dissipation: 0.0,
        }
    }
}

/// 流图快照的顺序访问接口
///
/// 外部读取器（文件、网络、内存）实现此 trait；核心按索引
/// 顺序消费。仅 host 进程持有实现，worker 通过线路协议接收
/// 等价数据。
pub trait FlowProvider: Send {
    /// 不同快照的数量
    fn len(&self) -> usize;

    /// 集合是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按索引访问快照
    fn snapshot_at(&mut self, index: usize) -> BmcResult<&FlowSnapshot>;
}

/// 内存快照集合（测试与内嵌场景）
#[derive(Debug, Clone, Default)]
pub struct InMemoryFlowProvider {
    snapshots: Vec<FlowSnapshot>,
}

impl InMemoryFlowProvider {
    /// 从快照向量创建，逐一校验
    pub fn new(snapshots: Vec<FlowSnapshot>) -> BmcResult<Self> {
        for s in &snapshots {
            s.validate()?;
        }
        Ok(Self { snapshots })
    }
}

impl FlowProvider for InMemoryFlowProvider {
    fn len(&self) -> usize {
        self.snapshots.len()
    }

    fn snapshot_at(&mut self, index: usize) -> BmcResult<&FlowSnapshot> {
        self.snapshots.get(index).ok_or_else(|| {
            BmcError::invalid_input(format!(
                "快照索引 {index} 越界 (共 {} 个)",
                self.snapshots.len()
            ))
        })
    }
}
