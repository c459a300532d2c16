// crates/bmc_core/src/runner.rs

//! 本地运行器
//!
//! 在一个进程内装配并运行完整的一主多从拓扑：工作端各占一个
//! OS 线程，主端占用调用线程。通信错误是致命的，任何一端失败
//! 都让整次运行以错误结束。

use crate::case::{
    build_host_transitioner, build_unit, build_worker_transitioner, partition_particles,
};
use crate::control::RunControl;
use crate::host::HostRuntime;
use crate::params::SimulationParameters;
use crate::results::SharedResults;
use crate::worker::WorkerRuntime;
use bmc_cma::snapshot::FlowSnapshot;
use bmc_foundation::error::{BmcError, BmcResult};
use bmc_mc::model::ParticleModel;
use bmc_sync::comm_group;
use tracing::error;

/// 装配并运行一个完整算例
///
/// 阻塞直到运行结束，返回结果采集句柄。`control` 可由调用方
/// 保留克隆用于中途停机或快照请求。
pub fn run_local<M: ParticleModel>(
    params: &SimulationParameters,
    snapshots: Vec<FlowSnapshot>,
    control: RunControl,
) -> BmcResult<SharedResults> {
    params.validate()?;
    let n_flowmap = snapshots.len();
    if n_flowmap == 0 {
        return Err(BmcError::config("至少需要一张流图快照"));
    }
    let n_compartments = snapshots[0].n_compartments;
    let counts = partition_particles(params.n_particles, params.n_ranks());

    // 工作端线程
    let (hub, links) = if params.n_workers > 0 {
        let (hub, links) = comm_group(params.n_workers);
        (Some(hub), links)
    } else {
        (None, Vec::new())
    };

    let mut handles = Vec::with_capacity(links.len());
    for link in links {
        let rank = link.rank() + 1;
        let unit = build_unit::<M>(params, rank as u64, counts[rank], n_compartments)?;
        let transitioner = build_worker_transitioner(params, n_flowmap)?;
        let runtime = WorkerRuntime::new(params, link, unit, transitioner);
        handles.push(
            std::thread::Builder::new()
                .name(format!("bmc-worker-{rank}"))
                .spawn(move || runtime.run())
                .map_err(|e| BmcError::io("创建工作线程", e))?,
        );
    }

    // 主端
    let host_unit = build_unit::<M>(params, 0, counts[0], n_compartments)?;
    let transitioner = build_host_transitioner(params, snapshots)?;
    let host = HostRuntime::new(
        params.clone(),
        host_unit,
        transitioner,
        hub,
        control,
        SharedResults::new(),
    );
    let host_outcome = host.run();

    // 收线：先让全部工作线程归队再决定整体结果
    let mut worker_failure = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("工作端失败: {e}");
                worker_failure.get_or_insert(e);
            }
            Err(_) => {
                error!("工作线程 panic");
                worker_failure
                    .get_or_insert_with(|| BmcError::communication("工作线程 panic"));
            }
        }
    }

    resolve_outcome(host_outcome, worker_failure)
}

/// 从主端结果与首个工作端失败中选出整体结果
///
/// 一端先失败时另一端只会看到次生的通道断开，根因优先上浮：
/// 主端只报通信错误而工作端报了实质错误时，取工作端的。
fn resolve_outcome<T>(
    host_outcome: BmcResult<T>,
    worker_failure: Option<BmcError>,
) -> BmcResult<T> {
    match (host_outcome, worker_failure) {
        (Ok(results), None) => Ok(results),
        (Ok(_), Some(worker_err)) => Err(worker_err),
        (Err(host_err), None) => Err(host_err),
        (Err(host_err), Some(worker_err)) => {
            let host_is_secondary = matches!(host_err, BmcError::Communication { .. })
                && !matches!(worker_err, BmcError::Communication { .. });
            if host_is_secondary {
                Err(worker_err)
            } else {
                Err(host_err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_root_cause_preferred_over_channel_error() {
        let host: BmcResult<()> = Err(BmcError::communication("等待工作端 0 时通道断开"));
        let worker = Some(BmcError::dimension_mismatch("气相体积", 2, 0));
        let err = resolve_outcome(host, worker).unwrap_err();
        assert!(matches!(err, BmcError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_host_root_cause_kept_when_workers_see_disconnect() {
        let host: BmcResult<()> = Err(BmcError::ZeroVolume { compartment: 1 });
        let worker = Some(BmcError::communication("主端掉线"));
        let err = resolve_outcome(host, worker).unwrap_err();
        assert!(matches!(err, BmcError::ZeroVolume { compartment: 1 }));
    }

    #[test]
    fn test_worker_failure_fails_clean_host() {
        let host: BmcResult<()> = Ok(());
        let worker = Some(BmcError::communication("工作线程 panic"));
        assert!(resolve_outcome(host, worker).is_err());
    }
}
