// crates/bmc_sim/src/lib.rs

//! BioMC 模拟核层 (Layer 4)
//!
//! 把粒子层与水力层拼成每步循环：单粒子扫描核（迁移、出口、
//! 模型更新、分裂）与 rank 本地的 [`SimulationUnit`] 驱动。
//!
//! # 每步次序
//!
//! 1. 并行扫描全部存活粒子（共享状态全部经原子单元）
//! 2. 合并分裂缓冲区，新生粒子计入隔室
//! 3. 失活计数越过阈值时批量压实
//!
//! 物种贡献留在累加器中，由上层跨 rank 归约后统一落入浓度场。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod kernel;
pub mod unit;

pub use kernel::{
    find_next_compartment, probability_leaving, probability_leaving_fast, ExitFlow, SweepContext,
};
pub use unit::{CycleReport, SimulationUnit};
