// crates/bmc_cma/src/state.rs

//! 预计算水力状态
//!
//! 单个流图快照派生出的全部水力数据：转移矩阵、累积概率表、
//! 逆体积对角阵。只在快照首次被访问时计算一次，之后整槽复用，
//! 计算期间以外不做原位修改。

use crate::snapshot::NeighborTable;
use crate::transition::{CumulativeProbability, FlowMatrix};
use bmc_foundation::error::BmcResult;

/// 单个流图对应的预计算水力状态
///
/// 缓存槽由 [`crate::transitioner::FlowMapTransitioner`] 持有，
/// 槽数以不同流图数量为上界，与时间步数无关。
#[derive(Debug, Clone, Default)]
pub struct PreCalculatedHydroState {
    /// 稀疏转移矩阵
    pub transition: FlowMatrix,
    /// 累积概率表（行对齐邻接表）
    pub cumulative_probability: CumulativeProbability,
    /// 各隔室流出总量（对角元取反）
    pub outflow_diagonal: Vec<f64>,
    /// 各隔室逆体积
    pub inverse_volume: Vec<f64>,
    /// 各隔室体积
    pub volume: Vec<f64>,
    /// 构造时使用的邻接表（与累积概率表同生命周期）
    pub neighbors: NeighborTable,
}

impl PreCalculatedHydroState {
    /// 从原始流量缓冲区计算完整液相状态
    ///
    /// # 错误
    ///
    /// 任何隔室体积为零时返回 [`BmcError::ZeroVolume`]
    /// （逆体积矩阵不可求，属不可恢复配置错误）。
    pub fn compute_liquid(
        flows: &[f64],
        volumes: &[f64],
        neighbors: &NeighborTable,
    ) -> BmcResult<Self> {
        let n = volumes.len();
        bmc_foundation::validation::check_dimension("流量矩阵", n * n, flows.len())?;
        bmc_foundation::validation::check_dimension("邻接表行数", n, neighbors.n_row())?;

        let transition = FlowMatrix::from_dense_flows(flows, n);
        let cumulative_probability = CumulativeProbability::build(&transition, neighbors);
        let outflow_diagonal = transition.outflow_diagonal();
        let inverse_volume = compute_inverse_diagonal(volumes)?;

        Ok(Self {
            transition,
            cumulative_probability,
            outflow_diagonal,
            inverse_volume,
            volume: volumes.to_vec(),
            neighbors: neighbors.clone(),
        })
    }

    /// 从原始流量缓冲区计算气相状态（不需要概率表）
    pub fn compute_gas(flows: &[f64], volumes: &[f64]) -> BmcResult<Self> {
        let n = volumes.len();
        bmc_foundation::validation::check_dimension("气相流量矩阵", n * n, flows.len())?;

        let transition = FlowMatrix::from_dense_flows(flows, n);
        let outflow_diagonal = transition.outflow_diagonal();
        let inverse_volume = compute_inverse_diagonal(volumes)?;

        Ok(Self {
            transition,
            cumulative_probability: CumulativeProbability::default(),
            outflow_diagonal,
            inverse_volume,
            volume: volumes.to_vec(),
            neighbors: NeighborTable::default(),
        })
    }

    /// 仅由体积构造气相状态
    ///
    /// worker 侧线路载荷不携带气相流量矩阵（气相不参与粒子
    /// 迁移决策），体积与逆体积与主进程
    /// [`compute_gas`](Self::compute_gas) 的结果一致即可。
    pub fn from_volumes(volumes: &[f64]) -> BmcResult<Self> {
        let inverse_volume = compute_inverse_diagonal(volumes)?;
        Ok(Self {
            inverse_volume,
            volume: volumes.to_vec(),
            ..Self::default()
        })
    }

    /// 隔室数量
    #[inline]
    pub fn n_compartments(&self) -> usize {
        self.volume.len()
    }
}

/// 计算逆体积对角阵
fn compute_inverse_diagonal(volumes: &[f64]) -> BmcResult<Vec<f64>> {
    bmc_foundation::validation::check_volumes(volumes)?;
    Ok(volumes.iter().map(|&v| 1.0 / v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_foundation::error::BmcError;

    #[test]
    fn test_compute_liquid_state() {
        let flows = vec![0.0, 2.0, 3.0, 0.0];
        let volumes = vec![0.5, 2.0];
        let table = NeighborTable::new(2, 2, vec![1, 0, 0, 1]).unwrap();
        let state = PreCalculatedHydroState::compute_liquid(&flows, &volumes, &table).unwrap();

        assert_eq!(state.n_compartments(), 2);
        assert_eq!(state.inverse_volume, vec![2.0, 0.5]);
        assert_eq!(state.outflow_diagonal, vec![2.0, 3.0]);
    }

    #[test]
    fn test_from_volumes_only() {
        let state = PreCalculatedHydroState::from_volumes(&[0.25, 0.5]).unwrap();
        assert_eq!(state.n_compartments(), 2);
        assert_eq!(state.inverse_volume, vec![4.0, 2.0]);
        assert!(
            matches!(
                PreCalculatedHydroState::from_volumes(&[1.0, 0.0]).unwrap_err(),
                BmcError::ZeroVolume { compartment: 1 }
            )
        );
    }

    #[test]
    fn test_zero_volume_is_fatal() {
        let flows = vec![0.0; 4];
        let volumes = vec![1.0, 0.0];
        let table = NeighborTable::new(2, 2, vec![1, 0, 0, 1]).unwrap();
        let err = PreCalculatedHydroState::compute_liquid(&flows, &volumes, &table).unwrap_err();
        assert!(matches!(err, BmcError::ZeroVolume { compartment: 1 }));
    }
}
