// apps/bmc_cli/src/commands/validate.rs

//! 验证配置命令
//!
//! 只做加载与校验，不运行模拟。参数文件与流图文件都通过才算
//! 成功，方便在提交长算例之前快速把关。

use anyhow::{Context, Result};
use bmc_core::SimulationParameters;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

/// 验证配置参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 参数文件路径 (JSON)
    #[arg(short, long)]
    pub params: PathBuf,

    /// 流图快照文件路径 (JSON)
    #[arg(short, long)]
    pub flowmaps: Option<PathBuf>,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    let params = SimulationParameters::from_file(&args.params)
        .with_context(|| format!("参数文件 {} 未通过校验", args.params.display()))?;
    info!(
        n_particles = params.n_particles,
        d_t = params.d_t,
        n_steps = params.n_steps(),
        "参数文件有效"
    );

    if let Some(path) = &args.flowmaps {
        let snapshots = super::load_snapshots(path)?;
        info!(
            n_flowmap = snapshots.len(),
            n_compartments = snapshots[0].n_compartments,
            "流图文件有效"
        );
    }

    info!("配置验证通过");
    Ok(())
}
