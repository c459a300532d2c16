// apps/bmc_cli/src/commands/info.rs

//! 显示流图信息命令

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// 显示信息参数
#[derive(Args)]
pub struct InfoArgs {
    /// 流图快照文件路径 (JSON)
    #[arg(short, long)]
    pub flowmaps: PathBuf,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    let snapshots = super::load_snapshots(&args.flowmaps)?;

    info!("流图快照数量: {}", snapshots.len());
    for (i, snapshot) in snapshots.iter().enumerate() {
        let total_liquid: f64 = snapshot.liquid_volume.iter().sum();
        let total_flow: f64 = snapshot.liquid_flow.iter().sum();
        info!(
            "快照 {i}: {} 隔室, 液相总体积 {:.3e} m³, 液相总流量 {:.3e} m³/s, \
             耗散率 {:.3e}",
            snapshot.n_compartments, total_liquid, total_flow, snapshot.energy_dissipation
        );
    }
    Ok(())
}
