// apps/bmc_cli/src/commands/mod.rs

//! 子命令实现

pub mod info;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use bmc_cma::snapshot::FlowSnapshot;
use std::path::Path;

/// 从 JSON 文件加载流图快照集合并逐张校验
pub fn load_snapshots(path: &Path) -> Result<Vec<FlowSnapshot>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取流图文件 {}", path.display()))?;
    let snapshots: Vec<FlowSnapshot> =
        serde_json::from_str(&text).with_context(|| format!("解析流图文件 {}", path.display()))?;
    anyhow::ensure!(!snapshots.is_empty(), "流图文件 {} 不含任何快照", path.display());
    for (i, snapshot) in snapshots.iter().enumerate() {
        snapshot
            .validate()
            .with_context(|| format!("流图快照 {i} 不一致"))?;
    }
    Ok(snapshots)
}
