// crates/bmc_mc/src/contribution.rs

//! 物种贡献散射累加器
//!
//! 并行粒子扫描期间，每个粒子把 `weight × 速率` 原子累加到
//! 共享的 (隔室 × 物种) 累加器上。浮点原子加法用
//! compare-exchange 位转换循环实现，结果与累加次序无关
//! （交换律求和）。
//!
//! # 布局
//!
//! 行主序 `n_compartments × n_species`，与液相浓度场布局一致，
//! 归约与应用阶段可以整块处理。

use std::sync::atomic::{AtomicU64, Ordering};

/// 原子物种贡献累加器
///
/// 所有粒子可并发调用 [`add`](Self::add)；收集与清零只在
/// 同步点由单线程执行。
#[derive(Debug)]
pub struct ContributionView {
    n_compartments: usize,
    n_species: usize,
    data: Vec<AtomicU64>,
}

impl ContributionView {
    /// 创建零值累加器
    pub fn new(n_compartments: usize, n_species: usize) -> Self {
        Self {
            n_compartments,
            n_species,
            data: (0..n_compartments * n_species)
                .map(|_| AtomicU64::new(0))
                .collect(),
        }
    }

    /// 隔室数量
    #[inline]
    pub fn n_compartments(&self) -> usize {
        self.n_compartments
    }

    /// 物种数量
    #[inline]
    pub fn n_species(&self) -> usize {
        self.n_species
    }

    /// 原子加法
    ///
    /// compare-exchange 循环实现的浮点原子累加，可在扫描核内
    /// 并发调用。
    #[inline]
    pub fn add(&self, compartment: usize, species: usize, value: f64) {
        let atomic = &self.data[compartment * self.n_species + species];
        let mut old = atomic.load(Ordering::Relaxed);
        loop {
            let new = f64::from_bits(old) + value;
            match atomic.compare_exchange_weak(
                old,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => old = x,
            }
        }
    }

    /// 重置所有累加值为零
    pub fn reset(&self) {
        for atomic in &self.data {
            atomic.store(0, Ordering::Relaxed);
        }
    }

    /// 收集累加结果的非原子副本（行主序 隔室 × 物种）
    pub fn collect(&self) -> Vec<f64> {
        self.data
            .iter()
            .map(|a| f64::from_bits(a.load(Ordering::Relaxed)))
            .collect()
    }

    /// 从线性缓冲区覆盖填充（host 归约后回填用）
    pub fn store_from(&self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.data.len());
        for (atomic, &v) in self.data.iter().zip(values) {
            atomic.store(v.to_bits(), Ordering::Relaxed);
        }
    }
}
