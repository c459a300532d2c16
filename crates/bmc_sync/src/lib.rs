// crates/bmc_sync/src/lib.rs

//! BioMC 同步协议层 (Layer 5)
//!
//! 一主多从锁步协议的三块积木：控制信号、长度前缀载荷编解码
//! 与进程内通信组。每个时间步的次序固定：
//!
//! 1. 主端广播 `Run` + 本步水力载荷
//! 2. 各端执行本地扫描
//! 3. 工作端上行 [`GatherReport`]，主端归并
//! 4. 全员进入屏障，进入下一步
//!
//! `Stop` 信号的判别值为 0，零化帧安全地解读为停机。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod comm;
pub mod payload;
pub mod signal;

pub use codec::{FrameReader, FrameWriter};
pub use comm::{comm_group, Frame, HostHub, WorkerLink};
pub use payload::{GatherReport, InitPayload, StepPayload};
pub use signal::Signal;
