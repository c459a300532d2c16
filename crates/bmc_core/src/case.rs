// crates/bmc_core/src/case.rs

//! 算例装配
//!
//! 把参数与流图快照装配成可运行的主/从部件：粒子份额划分、
//! 模拟单元构建与推进器构建。

use crate::params::SimulationParameters;
use bmc_cma::snapshot::{FlowProvider, FlowSnapshot, InMemoryFlowProvider};
use bmc_cma::transitioner::FlowMapTransitioner;
use bmc_foundation::error::{BmcError, BmcResult};
use bmc_mc::container::ParticlesContainer;
use bmc_mc::domain::ReactorDomain;
use bmc_mc::model::ParticleModel;
use bmc_mc::prng::RngPool;
use bmc_sim::SimulationUnit;

/// 把全局粒子数划分到各 rank
///
/// 均分，余数归 rank 0（主进程）。各份额之和恒等于全局数量。
pub fn partition_particles(total: usize, n_ranks: usize) -> Vec<usize> {
    debug_assert!(n_ranks > 0);
    let base = total / n_ranks;
    let remainder = total % n_ranks;
    let mut counts = vec![base; n_ranks];
    counts[0] += remainder;
    counts
}

/// 构建一个 rank 的模拟单元
///
/// 粒子按隔室轮转放置，浓度场按参数设全隔室一致的初值。
pub fn build_unit<M: ParticleModel>(
    params: &SimulationParameters,
    rank: u64,
    n_local: usize,
    n_compartments: usize,
) -> BmcResult<SimulationUnit<M>> {
    if params.initial_concentrations.len() > M::N_SPECIES {
        return Err(BmcError::config(format!(
            "初始浓度给出 {} 个物种，模型只有 {}",
            params.initial_concentrations.len(),
            M::N_SPECIES
        )));
    }

    let pool = RngPool::new(params.seed, rank);
    let mut rng = pool.master();
    let container = ParticlesContainer::<M>::new(n_local, params.initial_weight, &mut rng);
    let domain = ReactorDomain::new(n_compartments)?;

    let mut unit = SimulationUnit::new(container, domain, pool, params.exit_flows.clone());
    let spread: Vec<usize> = (0..n_compartments).collect();
    unit.scatter_particles(&spread)?;

    for c in 0..n_compartments {
        for (s, &value) in params.initial_concentrations.iter().enumerate() {
            unit.set_concentration(c, s, value);
        }
    }
    Ok(unit)
}

/// 构建主进程的流图推进器
pub fn build_host_transitioner(
    params: &SimulationParameters,
    snapshots: Vec<FlowSnapshot>,
) -> BmcResult<FlowMapTransitioner> {
    let provider = InMemoryFlowProvider::new(snapshots)?;
    let n_flowmap = provider.len();
    FlowMapTransitioner::host(
        n_flowmap,
        params.n_per_flowmap,
        params.n_steps(),
        Box::new(provider),
        params.two_phase_flow,
    )
}

/// 构建工作进程的流图推进器（数据来自线路协议）
pub fn build_worker_transitioner(
    params: &SimulationParameters,
    n_flowmap: usize,
) -> BmcResult<FlowMapTransitioner> {
    FlowMapTransitioner::worker(
        n_flowmap,
        params.n_per_flowmap,
        params.n_steps(),
        params.two_phase_flow,
    )
}
