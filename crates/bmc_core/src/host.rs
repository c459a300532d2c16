// crates/bmc_core/src/host.rs

//! 主进程运行时
//!
//! 驱动锁步主循环。开跑前先广播一帧启动参数做握手校验；之后
//! 每步的次序固定：
//!
//! 1. 步首检查停机旗标（协作式，步内不打断）
//! 2. 推进流图（命中缓存或重算）
//! 3. 向工作端广播 `Run` + 本步水力载荷与全局浓度场
//! 4. 主进程执行自己的本地扫描
//! 5. 收齐工作端上报，归并全局分布、事件与物种贡献，
//!    贡献和由主进程独家落入浓度场
//! 6. 全员屏障；记录间隔命中时广播 `Dump` 收一轮全局记录
//!
//! 循环退出后广播 `Stop` 并收取各端的最终上报。

use crate::control::RunControl;
use crate::params::SimulationParameters;
use crate::results::{SharedResults, StepRecord};
use bmc_cma::transitioner::FlowMapTransitioner;
use bmc_foundation::error::{BmcError, BmcResult};
use bmc_mc::domain::reduce_distributions;
use bmc_mc::events::{EventContainer, N_EVENT_TYPES};
use bmc_mc::model::ParticleModel;
use bmc_sim::SimulationUnit;
use bmc_sync::{GatherReport, HostHub, InitPayload, Signal, StepPayload};
use tracing::{info, warn};

/// 一步归并后的全局可观测量
struct GlobalView {
    total_particles: u64,
    distribution: Vec<u64>,
    events: Vec<u64>,
    contributions: Vec<f64>,
}

/// 主进程运行时
pub struct HostRuntime<M: ParticleModel> {
    params: SimulationParameters,
    unit: SimulationUnit<M>,
    transitioner: FlowMapTransitioner,
    hub: Option<HostHub>,
    control: RunControl,
    results: SharedResults,
}

impl<M: ParticleModel> HostRuntime<M> {
    /// 组装主进程运行时
    ///
    /// `hub` 为 `None` 时退化为单进程运行，协议层完全旁路。
    pub fn new(
        params: SimulationParameters,
        unit: SimulationUnit<M>,
        transitioner: FlowMapTransitioner,
        hub: Option<HostHub>,
        control: RunControl,
        results: SharedResults,
    ) -> Self {
        Self {
            params,
            unit,
            transitioner,
            hub,
            control,
            results,
        }
    }

    /// 运行主循环直到时间耗尽或停机请求
    pub fn run(mut self) -> BmcResult<SharedResults> {
        let n_steps = self.params.n_steps();
        let d_t = self.params.d_t;
        info!(
            n_steps,
            d_t,
            n_workers = self.hub.as_ref().map_or(0, HostHub::n_workers),
            "主循环开始"
        );

        self.handshake()?;

        let progress_every = (n_steps as u64 / 10).max(1);
        let mut steps_run = 0u64;
        for step in 0..n_steps as u64 {
            if self.control.should_stop() {
                warn!(step, "收到停机请求，提前结束");
                break;
            }
            if step % progress_every == 0 {
                info!(step, n_steps, "锁步推进");
            }

            self.transitioner.advance()?;
            self.broadcast_step()?;

            let inverse_volume = {
                let state = self.transitioner.iteration_state();
                self.unit.cycle(step, d_t, &state)?;
                state.liquid.inverse_volume.clone()
            };

            let view = self.sync_step(d_t, &inverse_volume)?;
            steps_run = step + 1;

            let record_due = self.params.dump_interval > 0
                && step as usize % self.params.dump_interval == 0;
            if record_due || self.control.take_dump() {
                let view = self.dump_view(view)?;
                self.record(step, d_t, &view);
            }
        }

        self.shutdown(steps_run, d_t)?;
        Ok(self.results)
    }

    /// 启动握手：广播全体 rank 必须一致的标量参数
    fn handshake(&self) -> BmcResult<()> {
        let Some(hub) = &self.hub else {
            return Ok(());
        };
        let init = InitPayload {
            n_timestep: self.params.n_steps() as u64,
            n_per_flowmap: self.params.n_per_flowmap as u64,
            n_flowmap: self.transitioner.n_flowmap() as u64,
            n_compartments: self.unit.domain().len() as u64,
            two_phase_flow: self.params.two_phase_flow,
        };
        hub.broadcast(Signal::Nop, &init.encode())?;
        hub.barrier_wait();
        Ok(())
    }

    /// 向工作端广播本步信号、水力载荷与当前全局浓度场
    fn broadcast_step(&mut self) -> BmcResult<()> {
        let Some(hub) = &self.hub else {
            return Ok(());
        };
        let snapshot = self.transitioner.current_snapshot()?;
        let payload = StepPayload {
            flows: snapshot.liquid_flow.clone(),
            liquid_volumes: snapshot.liquid_volume.clone(),
            gas_volumes: snapshot.gas_volume.clone(),
            neighbors: snapshot.neighbors.data().iter().map(|&v| v as u64).collect(),
            n_neighbor_col: snapshot.neighbors.n_col() as u64,
            concentrations: self.unit.concentrations().to_vec(),
            energy_dissipation: snapshot.energy_dissipation,
        };
        hub.broadcast(Signal::Run, &payload.encode())
    }

    /// 收齐上报、归并全局视图、独家应用贡献和、进入屏障
    fn sync_step(&mut self, d_t: f64, inverse_volume: &[f64]) -> BmcResult<GlobalView> {
        let contributions = self.unit.take_contributions();
        let local = self.local_report(contributions);
        let view = if let Some(hub) = &self.hub {
            let frames = hub.gather()?;
            let mut reports = Vec::with_capacity(frames.len() + 1);
            reports.push(local);
            for frame in &frames {
                reports.push(GatherReport::decode(&frame.payload)?);
            }
            let view = reduce_reports(&reports, self.unit.domain().len())?;
            hub.barrier_wait();
            view
        } else {
            GlobalView {
                total_particles: local.n_particles,
                distribution: local.distribution,
                events: local.events,
                contributions: local.contributions,
            }
        };

        self.unit
            .apply_contributions(d_t, inverse_volume, &view.contributions)?;
        Ok(view)
    }

    /// 额外发起一轮 `Dump` 收取全局记录用的快照
    ///
    /// 贡献和已在本步 `Run` 轮取走，这一轮收到的都是零。
    fn dump_view(&self, fallback: GlobalView) -> BmcResult<GlobalView> {
        let Some(hub) = &self.hub else {
            return Ok(fallback);
        };
        hub.broadcast(Signal::Dump, &[])?;
        let frames = hub.gather()?;
        let n = self.unit.domain().len();
        let mut reports = vec![self.local_report(vec![0.0; n * M::N_SPECIES])];
        for frame in &frames {
            reports.push(GatherReport::decode(&frame.payload)?);
        }
        let view = reduce_reports(&reports, n)?;
        hub.barrier_wait();
        Ok(view)
    }

    /// 主进程自身的上报
    fn local_report(&self, contributions: Vec<f64>) -> GatherReport {
        GatherReport {
            rank: 0,
            n_particles: self.unit.container().n_particles() as u64,
            distribution: self.unit.domain().distribution(),
            events: self.unit.events().snapshot().to_vec(),
            contributions,
        }
    }

    fn record(&self, step: u64, d_t: f64, view: &GlobalView) {
        self.results.record(StepRecord {
            step,
            time: (step + 1) as f64 * d_t,
            total_particles: view.total_particles,
            distribution: view.distribution.clone(),
            events: view.events.clone(),
            concentrations: self.unit.concentrations().to_vec(),
        });
    }

    /// 广播停机、收取最终上报、落最终记录
    fn shutdown(&mut self, steps_run: u64, d_t: f64) -> BmcResult<()> {
        let zeros = vec![0.0; self.unit.domain().len() * M::N_SPECIES];
        if let Some(hub) = &self.hub {
            hub.broadcast(Signal::Stop, &[])?;
            let frames = hub.gather()?;
            let mut reports = vec![self.local_report(zeros)];
            for frame in &frames {
                reports.push(GatherReport::decode(&frame.payload)?);
            }
            let view = reduce_reports(&reports, self.unit.domain().len())?;
            self.record(steps_run.saturating_sub(1), d_t, &view);
        } else {
            let local = self.local_report(zeros);
            self.record(
                steps_run.saturating_sub(1),
                d_t,
                &GlobalView {
                    total_particles: local.n_particles,
                    distribution: local.distribution,
                    events: local.events,
                    contributions: local.contributions,
                },
            );
        }

        self.unit.finalize()?;
        info!(steps_run, recompute = self.transitioner.n_recompute(), "主循环结束");
        Ok(())
    }
}

/// 逐 rank 归并上报为全局视图
///
/// 分布与贡献做元素级求和，事件计数走判别值序归约。
fn reduce_reports(reports: &[GatherReport], n_compartments: usize) -> BmcResult<GlobalView> {
    let n_rank = reports.len();
    let mut flat_dist = Vec::with_capacity(n_rank * n_compartments);
    let mut flat_events = Vec::with_capacity(n_rank * N_EVENT_TYPES);
    let mut contributions: Vec<f64> = Vec::new();
    let mut total_particles = 0u64;

    for report in reports {
        if report.events.len() != N_EVENT_TYPES {
            return Err(BmcError::communication(format!(
                "rank {} 上报的事件计数长度不符: {}",
                report.rank,
                report.events.len()
            )));
        }
        total_particles += report.n_particles;
        flat_dist.extend_from_slice(&report.distribution);
        flat_events.extend_from_slice(&report.events);

        if contributions.is_empty() {
            contributions = report.contributions.clone();
        } else {
            if report.contributions.len() != contributions.len() {
                return Err(BmcError::communication(format!(
                    "rank {} 上报的贡献向量长度不符: {}",
                    report.rank,
                    report.contributions.len()
                )));
            }
            for (acc, v) in contributions.iter_mut().zip(&report.contributions) {
                *acc += v;
            }
        }
    }

    let distribution = reduce_distributions(&flat_dist, n_compartments, n_rank)?;
    let events = EventContainer::reduce(&flat_events, n_rank).to_vec();
    Ok(GlobalView {
        total_particles,
        distribution,
        events,
        contributions,
    })
}
