// crates/bmc_core/src/worker.rs

//! 工作进程运行时
//!
//! 纯反应式：先收一帧启动参数核对两端共享标量，之后阻塞等待
//! 主端信号并执行。`Run` 携带本步水力载荷与全局浓度场，工作端
//! 用它推进自己的推进器副本（计数器与主端逐步一致），扫描后
//! 上报快照与本地贡献和并进入屏障。`Stop` 上报最终快照后退出。

use crate::params::SimulationParameters;
use bmc_cma::snapshot::NeighborTable;
use bmc_cma::transitioner::FlowMapTransitioner;
use bmc_foundation::error::{BmcError, BmcResult};
use bmc_mc::model::ParticleModel;
use bmc_sim::SimulationUnit;
use bmc_sync::{GatherReport, InitPayload, Signal, StepPayload, WorkerLink};
use tracing::{debug, info};

/// 工作进程运行时
pub struct WorkerRuntime<M: ParticleModel> {
    link: WorkerLink,
    unit: SimulationUnit<M>,
    transitioner: FlowMapTransitioner,
    d_t: f64,
    n_steps: u64,
    n_per_flowmap: u64,
    two_phase_flow: bool,
}

impl<M: ParticleModel> WorkerRuntime<M> {
    /// 组装工作端运行时
    pub fn new(
        params: &SimulationParameters,
        link: WorkerLink,
        unit: SimulationUnit<M>,
        transitioner: FlowMapTransitioner,
    ) -> Self {
        Self {
            link,
            unit,
            transitioner,
            d_t: params.d_t,
            n_steps: params.n_steps() as u64,
            n_per_flowmap: params.n_per_flowmap as u64,
            two_phase_flow: params.two_phase_flow,
        }
    }

    /// 信号循环，直到收到 `Stop` 或主端掉线
    pub fn run(mut self) -> BmcResult<()> {
        let rank = self.link.rank();
        self.handshake()?;
        info!(rank, "工作端就绪");
        let mut step = 0u64;

        loop {
            let frame = self.link.recv()?;
            match frame.signal {
                Signal::Stop => {
                    let report = self.report().encode();
                    self.link.send(Signal::Stop, report)?;
                    break;
                }
                Signal::Run => {
                    self.run_step(step, &frame.payload)?;
                    let report = self.report().encode();
                    self.link.send(Signal::Nop, report)?;
                    self.link.barrier_wait();
                    step += 1;
                }
                Signal::Dump => {
                    let report = self.report().encode();
                    self.link.send(Signal::Dump, report)?;
                    self.link.barrier_wait();
                }
                Signal::Nop => {
                    self.link.barrier_wait();
                }
            }
        }

        self.unit.finalize()?;
        info!(rank, steps = step, "工作端退出");
        Ok(())
    }

    /// 核对启动帧里的共享标量与本地配置一致
    fn handshake(&mut self) -> BmcResult<()> {
        let frame = self.link.recv()?;
        if frame.signal != Signal::Nop {
            return Err(BmcError::communication(format!(
                "启动握手收到意外信号 {:?}",
                frame.signal
            )));
        }
        let init = InitPayload::decode(&frame.payload)?;
        let expected = InitPayload {
            n_timestep: self.n_steps,
            n_per_flowmap: self.n_per_flowmap,
            n_flowmap: self.transitioner.n_flowmap() as u64,
            n_compartments: self.unit.domain().len() as u64,
            two_phase_flow: self.two_phase_flow,
        };
        if init != expected {
            return Err(BmcError::communication(format!(
                "启动参数不一致: 主端 {init:?}, 本地 {expected:?}"
            )));
        }
        self.link.barrier_wait();
        Ok(())
    }

    fn run_step(&mut self, step: u64, payload: &[u8]) -> BmcResult<()> {
        let payload = StepPayload::decode(payload)?;
        let n = payload.n_compartments();
        if n != self.unit.domain().len() {
            return Err(BmcError::communication(format!(
                "载荷隔室数 {n} 与本地域 {} 不符",
                self.unit.domain().len()
            )));
        }

        self.unit.set_concentrations(&payload.concentrations)?;

        let data: Vec<usize> = payload.neighbors.iter().map(|&v| v as usize).collect();
        let neighbors = NeighborTable::new(n, payload.n_neighbor_col as usize, data)?;
        self.transitioner.advance_worker(
            &payload.flows,
            &payload.liquid_volumes,
            &payload.gas_volumes,
            &neighbors,
            payload.energy_dissipation,
        )?;

        let state = self.transitioner.iteration_state();
        let report = self.unit.cycle(step, self.d_t, &state)?;
        debug!(
            rank = self.link.rank(),
            step,
            merged = report.merged,
            "工作端完成一步"
        );
        Ok(())
    }

    /// 上报快照并取走本步贡献和（`Run` 轮之外取到的是零）
    fn report(&mut self) -> GatherReport {
        GatherReport {
            rank: self.link.rank() as u64 + 1,
            n_particles: self.unit.container().n_particles() as u64,
            distribution: self.unit.domain().distribution(),
            events: self.unit.events().snapshot().to_vec(),
            contributions: self.unit.take_contributions(),
        }
    }
}
