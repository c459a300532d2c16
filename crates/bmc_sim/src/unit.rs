// crates/bmc_sim/src/unit.rs

//! 模拟单元
//!
//! 把一个 rank 本地的全部模拟状态聚为一体：粒子容器、隔室域、
//! 液相浓度场、事件计数与贡献累加器，并驱动每步的并行扫描与
//! 步末收尾（缓冲区合并、批量压实）。

use crate::kernel::{ExitFlow, SweepContext};
use bmc_cma::transitioner::IterationState;
use bmc_foundation::error::BmcResult;
use bmc_foundation::validation;
use bmc_mc::container::ParticlesContainer;
use bmc_mc::contribution::ContributionView;
use bmc_mc::domain::ReactorDomain;
use bmc_mc::events::EventContainer;
use bmc_mc::model::{ParticleModel, Status};
use bmc_mc::prng::RngPool;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

/// 低于此粒子数时扫描走串行路径
const MIN_PARALLEL_SIZE: usize = 256;

/// 批量压实的种群分数阈值
const CLEAN_FRACTION: f64 = 0.05;

/// 一个时间步的收尾汇总
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleReport {
    /// 本步失活粒子数（死亡 + 流出）
    pub newly_inactive: usize,
    /// 本步合并进主表的新生粒子数
    pub merged: usize,
    /// 本步压实移除的行数（0 表示未触发）
    pub compacted: usize,
}

/// rank 本地模拟状态与每步扫描驱动
pub struct SimulationUnit<M: ParticleModel> {
    container: ParticlesContainer<M>,
    domain: ReactorDomain,
    events: EventContainer,
    contributions: ContributionView,
    /// 液相浓度场，行主序 `[隔室][物种]`
    liquid_concentration: Vec<f64>,
    pool: RngPool,
    exit_flows: Vec<ExitFlow>,
}

impl<M: ParticleModel> SimulationUnit<M> {
    /// 组装一个模拟单元
    ///
    /// 浓度场初始化为零，出口流表可为空（封闭反应器）。
    pub fn new(
        container: ParticlesContainer<M>,
        domain: ReactorDomain,
        pool: RngPool,
        exit_flows: Vec<ExitFlow>,
    ) -> Self {
        let n = domain.len();
        Self {
            container,
            domain,
            events: EventContainer::new(),
            contributions: ContributionView::new(n, M::N_SPECIES),
            liquid_concentration: vec![0.0; n * M::N_SPECIES],
            pool,
            exit_flows,
        }
    }

    // ------------------------------------------------------------------
    // 访问器
    // ------------------------------------------------------------------

    /// 粒子容器
    pub fn container(&self) -> &ParticlesContainer<M> {
        &self.container
    }

    /// 粒子容器（可变，初始化与测试用）
    pub fn container_mut(&mut self) -> &mut ParticlesContainer<M> {
        &mut self.container
    }

    /// 隔室域
    pub fn domain(&self) -> &ReactorDomain {
        &self.domain
    }

    /// 隔室域（可变）
    pub fn domain_mut(&mut self) -> &mut ReactorDomain {
        &mut self.domain
    }

    /// 事件计数
    pub fn events(&self) -> &EventContainer {
        &self.events
    }

    /// 浓度场只读视图
    pub fn concentrations(&self) -> &[f64] {
        &self.liquid_concentration
    }

    /// 设置单个隔室单个物种的浓度（初始条件）
    pub fn set_concentration(&mut self, compartment: usize, species: usize, value: f64) {
        self.liquid_concentration[compartment * M::N_SPECIES + species] = value;
    }

    /// 以给定隔室序列放置粒子并同步隔室计数
    ///
    /// `compartments[i % len]` 即粒子 `i` 的初始隔室，序列通常由
    /// 上层按体积加权分布生成。
    pub fn scatter_particles(&mut self, compartments: &[usize]) -> BmcResult<()> {
        validation::check_positive("初始分布序列长度", compartments.len() as f64)?;
        for i in 0..self.container.n_particles() {
            let c = compartments[i % compartments.len()];
            self.container.set_position(i, c);
        }
        self.sync_domain_counts();
        Ok(())
    }

    /// 按粒子位置重建隔室计数
    pub fn sync_domain_counts(&self) {
        self.domain.reset_cells();
        for i in 0..self.container.n_particles() {
            self.domain.compartment(self.container.position(i)).incr();
        }
    }

    // ------------------------------------------------------------------
    // 每步循环
    // ------------------------------------------------------------------

    /// 执行一个时间步：并行扫描 + 步末收尾
    ///
    /// 扫描对每个存活粒子执行迁移/出口/更新/分裂核；收尾按固定
    /// 次序合并分裂缓冲区、批量压实失活行。物种贡献留在累加器
    /// 中，待跨 rank 归约后经 [`Self::apply_contributions`] 落入浓度场。
    pub fn cycle(&mut self, step: u64, d_t: f64, state: &IterationState<'_>) -> BmcResult<CycleReport> {
        // 体积随流图快照走，单相流时气相为零
        let zero_gas;
        let gas_volume = match state.gas {
            Some(g) => g.volume.as_slice(),
            None => {
                zero_gas = vec![0.0; self.domain.len()];
                zero_gas.as_slice()
            }
        };
        self.domain.set_volumes(&state.liquid.volume, gas_volume)?;

        let weight = self.container.get_weight(0);
        let n = self.container.n_particles();
        let pool = self.pool;

        let newly_inactive = {
            let (mut rows, buffer) = self.container.split_for_sweep();
            let ctx = SweepContext {
                d_t,
                domain: &self.domain,
                hydro: state.liquid,
                neighbors: state.neighbors,
                concentrations: &self.liquid_concentration,
                n_species: M::N_SPECIES,
                exit_flows: &self.exit_flows,
                events: &self.events,
                contributions: &self.contributions,
                weight,
            };

            if n >= MIN_PARALLEL_SIZE {
                rows.status
                    .par_iter_mut()
                    .zip(rows.position.par_iter_mut())
                    .zip(rows.model.par_chunks_mut(M::N_VAR))
                    .enumerate()
                    .map(|(i, ((status, position), props))| {
                        let mut rng = pool.particle_stream(step, i as u64);
                        usize::from(ctx.advance_particle::<M>(
                            &mut rng, status, position, props, &buffer,
                        ))
                    })
                    .sum()
            } else {
                rows.status
                    .iter_mut()
                    .zip(rows.position.iter_mut())
                    .zip(rows.model.chunks_mut(M::N_VAR))
                    .enumerate()
                    .map(|(i, ((status, position), props))| {
                        let mut rng = pool.particle_stream(step, i as u64);
                        usize::from(ctx.advance_particle::<M>(
                            &mut rng, status, position, props, &buffer,
                        ))
                    })
                    .sum()
            }
        };

        // 新生粒子进入主表并计入隔室计数
        let before = self.container.n_particles();
        self.container.merge_buffer();
        let merged = self.container.n_particles() - before;
        for i in before..self.container.n_particles() {
            self.domain.compartment(self.container.position(i)).incr();
        }

        let compacted = self
            .container
            .update_and_clean_dead(newly_inactive, CLEAN_FRACTION)?;

        debug!(
            step,
            particles = self.container.n_particles(),
            newly_inactive,
            merged,
            compacted,
            "时间步完成"
        );
        Ok(CycleReport {
            newly_inactive,
            merged,
            compacted,
        })
    }

    /// 取走本步累计的物种贡献并清零累加器
    ///
    /// 返回值交由主进程跨 rank 求和后统一应用。
    pub fn take_contributions(&mut self) -> Vec<f64> {
        let contrib = self.contributions.collect();
        self.contributions.reset();
        contrib
    }

    /// 把归约后的全局贡献显式欧拉地应用到浓度场
    ///
    /// 浓度钳制在零以上：吸收速率超过存量时底物耗尽而非为负。
    pub fn apply_contributions(
        &mut self,
        d_t: f64,
        inverse_volume: &[f64],
        contrib: &[f64],
    ) -> BmcResult<()> {
        validation::check_dimension("贡献向量", self.liquid_concentration.len(), contrib.len())?;
        validation::check_dimension("体积倒数", self.domain.len(), inverse_volume.len())?;
        for c in 0..self.domain.len() {
            for s in 0..M::N_SPECIES {
                let idx = c * M::N_SPECIES + s;
                let next = self.liquid_concentration[idx] + d_t * inverse_volume[c] * contrib[idx];
                self.liquid_concentration[idx] = next.max(0.0);
            }
        }
        Ok(())
    }

    /// 用主进程广播的全局浓度场覆盖本地场
    pub fn set_concentrations(&mut self, values: &[f64]) -> BmcResult<()> {
        validation::check_dimension("浓度场", self.liquid_concentration.len(), values.len())?;
        self.liquid_concentration.copy_from_slice(values);
        Ok(())
    }

    /// 运行结束：压实全部残留失活行
    pub fn finalize(&mut self) -> BmcResult<usize> {
        self.container.flush_inactive()
    }

    /// 存活粒子数与隔室计数是否一致（诊断用）
    pub fn counts_consistent(&self) -> bool {
        let alive = (0..self.container.n_particles())
            .filter(|&i| self.container.status(i) == Status::Idle)
            .count() as u64;
        self.domain.total_cells() == alive
    }
}
