// crates/bmc_mc/src/domain.rs

//! 反应器隔室域
//!
//! 隔室是流图提供的空间离散单元：每个隔室持有液相体积与一个
//! 原子粒子计数。粒子计数在并行扫描期间由迁移核直接增减，
//! 因此必须是原子的；体积只在流图推进时由单线程写入。

use bmc_foundation::error::{BmcError, BmcResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// 单个隔室的可观测状态
#[derive(Debug, Default)]
pub struct CompartmentState {
    /// 隔室内模拟粒子计数（扫描期间并发增减）
    pub n_cells: AtomicU64,
    /// 液相体积 \[m³\]
    pub volume_liquid: f64,
    /// 气相体积 \[m³\]
    pub volume_gas: f64,
}

impl CompartmentState {
    /// 粒子计数快照
    #[inline]
    pub fn cells(&self) -> u64 {
        self.n_cells.load(Ordering::Relaxed)
    }

    /// 粒子迁入
    #[inline]
    pub fn incr(&self) {
        self.n_cells.fetch_add(1, Ordering::Relaxed);
    }

    /// 粒子迁出
    #[inline]
    pub fn decr(&self) {
        self.n_cells.fetch_sub(1, Ordering::Relaxed);
    }
}

/// 反应器域：隔室状态数组
///
/// 大小在运行期间不变；体积随流图快照更新。
#[derive(Debug)]
pub struct ReactorDomain {
    compartments: Vec<CompartmentState>,
    total_volume_liquid: f64,
}

impl ReactorDomain {
    /// 创建 `n_compartments` 个空隔室
    pub fn new(n_compartments: usize) -> BmcResult<Self> {
        if n_compartments == 0 {
            return Err(BmcError::invalid_input("隔室数量必须为正"));
        }
        let compartments = (0..n_compartments).map(|_| CompartmentState::default()).collect();
        Ok(Self {
            compartments,
            total_volume_liquid: 0.0,
        })
    }

    /// 隔室数量
    #[inline]
    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    /// 是否为空（构造时已排除，保留惯用接口）
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    /// 隔室访问
    #[inline]
    pub fn compartment(&self, idx: usize) -> &CompartmentState {
        &self.compartments[idx]
    }

    /// 遍历隔室
    pub fn iter(&self) -> impl Iterator<Item = &CompartmentState> {
        self.compartments.iter()
    }

    /// 从流图快照更新两相体积并重算液相总体积
    pub fn set_volumes(&mut self, liquid: &[f64], gas: &[f64]) -> BmcResult<()> {
        bmc_foundation::validation::check_dimension("液相体积", self.len(), liquid.len())?;
        bmc_foundation::validation::check_dimension("气相体积", self.len(), gas.len())?;
        for (c, (&vl, &vg)) in self.compartments.iter_mut().zip(liquid.iter().zip(gas)) {
            c.volume_liquid = vl;
            c.volume_gas = vg;
        }
        self.total_volume_liquid = liquid.iter().sum();
        Ok(())
    }

    /// 液相总体积（上次 [`Self::set_volumes`] 时缓存）
    #[inline]
    pub fn total_volume_liquid(&self) -> f64 {
        self.total_volume_liquid
    }

    /// 各隔室粒子计数分布快照
    pub fn distribution(&self) -> Vec<u64> {
        self.compartments.iter().map(|c| c.cells()).collect()
    }

    /// 粒子计数总和
    pub fn total_cells(&self) -> u64 {
        self.compartments.iter().map(|c| c.cells()).sum()
    }

    /// 清零所有粒子计数（重新分布前调用）
    pub fn reset_cells(&self) {
        for c in &self.compartments {
            c.n_cells.store(0, Ordering::Relaxed);
        }
    }
}

/// 归并多个 rank 的级联分布数组
///
/// 输入为 `n_rank` 段、每段 `size` 长的计数首尾相接；输出逐隔室
/// 求和。主进程在屏障后对采集到的各工作进程分布调用。
pub fn reduce_distributions(flat: &[u64], size: usize, n_rank: usize) -> BmcResult<Vec<u64>> {
    bmc_foundation::validation::check_dimension("级联分布", size * n_rank, flat.len())?;
    let mut reduced = vec![0u64; size];
    for rank in 0..n_rank {
        let segment = &flat[rank * size..(rank + 1) * size];
        for (acc, &v) in reduced.iter_mut().zip(segment) {
            *acc += v;
        }
    }
    Ok(reduced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_basic() {
        let mut domain = ReactorDomain::new(3).unwrap();
        assert_eq!(domain.len(), 3);
        domain.set_volumes(&[1.0, 2.0, 3.0], &[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(domain.compartment(1).volume_liquid, 2.0);
        assert_eq!(domain.compartment(2).volume_gas, 0.3);
        assert_eq!(domain.total_volume_liquid(), 6.0);
    }

    #[test]
    fn test_empty_domain_rejected() {
        assert!(ReactorDomain::new(0).is_err());
    }

    #[test]
    fn test_volume_dimension_mismatch() {
        let mut domain = ReactorDomain::new(3).unwrap();
        assert!(domain.set_volumes(&[1.0, 2.0], &[0.1, 0.2, 0.3]).is_err());
    }

    #[test]
    fn test_cell_counters() {
        let domain = ReactorDomain::new(2).unwrap();
        domain.compartment(0).incr();
        domain.compartment(0).incr();
        domain.compartment(1).incr();
        domain.compartment(0).decr();
        assert_eq!(domain.distribution(), vec![1, 1]);
        assert_eq!(domain.total_cells(), 2);
        domain.reset_cells();
        assert_eq!(domain.total_cells(), 0);
    }

    #[test]
    fn test_reduce_distributions() {
        // 两段长度 4 的分布逐元素求和
        let flat = [1u64, 2, 3, 4, 5, 6, 7, 8];
        let reduced = reduce_distributions(&flat, 4, 2).unwrap();
        assert_eq!(reduced, vec![6, 8, 10, 12]);
    }

    #[test]
    fn test_reduce_bad_shape() {
        assert!(reduce_distributions(&[1, 2, 3], 2, 2).is_err());
    }
}
