// apps/bmc_cli/src/commands/run.rs

//! 运行模拟命令
//!
//! 加载参数与流图，装配一主多从拓扑并运行到时间耗尽，结果
//! 导出为 JSON。未给流图文件时退化为单隔室 0-D 反应器。

use anyhow::{Context, Result};
use bmc_cma::snapshot::FlowSnapshot;
use bmc_core::{run_local, RunControl, SimulationParameters};
use bmc_mc::model::PilotCell;
use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// 运行模拟参数
#[derive(Args)]
pub struct RunArgs {
    /// 参数文件路径 (JSON)
    #[arg(short, long)]
    pub params: PathBuf,

    /// 流图快照文件路径 (JSON)，缺省为单隔室反应器
    #[arg(short, long)]
    pub flowmaps: Option<PathBuf>,

    /// 0-D 模式的反应器液相体积 [m³]
    #[arg(long, default_value = "1.0")]
    pub volume: f64,

    /// 结果输出文件
    #[arg(short, long, default_value = "results.json")]
    pub output: PathBuf,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== BioMC 模拟启动 ===");

    let params = SimulationParameters::from_file(&args.params)
        .with_context(|| format!("加载参数 {}", args.params.display()))?;
    info!(
        n_particles = params.n_particles,
        n_steps = params.n_steps(),
        n_workers = params.n_workers,
        "参数就绪"
    );

    let snapshots = match &args.flowmaps {
        Some(path) => super::load_snapshots(path)?,
        None => {
            info!(volume = args.volume, "未给流图，使用单隔室反应器");
            vec![FlowSnapshot::zero_dimensional(args.volume, 0.0)]
        }
    };
    info!(
        n_flowmap = snapshots.len(),
        n_compartments = snapshots[0].n_compartments,
        "流图就绪"
    );

    let start = Instant::now();
    let results =
        run_local::<PilotCell>(&params, snapshots, RunControl::new()).context("模拟运行失败")?;
    let elapsed = start.elapsed();

    let last = results
        .last()
        .context("运行未产生任何记录")?;
    info!(
        elapsed_s = elapsed.as_secs_f64(),
        total_particles = last.total_particles,
        "模拟完成"
    );

    results
        .export_json(&args.output)
        .with_context(|| format!("导出结果到 {}", args.output.display()))?;
    info!("结果已写入 {}", args.output.display());
    Ok(())
}
