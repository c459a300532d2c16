// crates/bmc_core/src/lib.rs

//! BioMC 编排层 (Layer 6)
//!
//! 把下层积木装配成可运行的算例：参数加载与校验、粒子份额
//! 划分、主/从运行时与进程内运行器、运行控制与结果采集。
//!
//! # 拓扑
//!
//! 一主多从。主进程独占流图读取器并在每步广播水力载荷；
//! 工作进程纯反应式，靠线路数据维持与主进程一致的推进器
//! 计数器。`n_workers = 0` 时协议层完全旁路。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod case;
pub mod control;
pub mod host;
pub mod params;
pub mod results;
pub mod runner;
pub mod worker;

pub use case::{build_host_transitioner, build_unit, build_worker_transitioner, partition_particles};
pub use control::RunControl;
pub use host::HostRuntime;
pub use params::SimulationParameters;
pub use results::{SharedResults, StepRecord};
pub use runner::run_local;
pub use worker::WorkerRuntime;
