// crates/bmc_foundation/src/lib.rs

//! BioMC Foundation Layer
//!
//! 零依赖基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `BmcError` / `BmcResult`
//! - [`metrics`]: 无锁原子计数器
//! - [`validation`]: 运行时验证工具
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror
//! 2. **类型安全**: 配置错误在构造点即返回 `Err`
//! 3. **零开销抽象**: release 模式下最小化运行时开销

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metrics;
pub mod validation;

// 重导出常用类型
pub use error::{BmcError, BmcResult};
pub use metrics::Counter;
pub use validation::{check_dimension, check_positive};
