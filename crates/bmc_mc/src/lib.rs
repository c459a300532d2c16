// crates/bmc_mc/src/lib.rs

//! BioMC 蒙特卡洛粒子层 (Layer 3)
//!
//! 粒子种群的所有权核心：SoA 粒子容器（分裂缓冲区 + 原子
//! 压实）、反应器隔室域、事件计数与确定性随机数流。
//!
//! # 模块概览
//!
//! - [`model`]: 生物模型契约（编译期泛型，无虚表）与状态枚举
//! - [`container`]: 粒子容器（主表 + 分裂缓冲区 + 压实）
//! - [`contribution`]: 每隔室每物种的原子散射累加器
//! - [`domain`]: 隔室图（体积、细胞计数、邻接视图）
//! - [`events`]: 蒙特卡洛循环事件计数器
//! - [`prng`]: 按 (步, 粒子) 派生的确定性随机数流
//!
//! # 所有权纪律
//!
//! 主粒子表由容器独占拥有，步边界之外不得别名；分裂缓冲区
//! 只追加、由单个原子游标索引；浓度场每步单写多读。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod contribution;
pub mod domain;
pub mod events;
pub mod model;
pub mod prng;

// 重导出常用类型
pub use container::{DivisionBuffer, ParticleRowsMut, ParticlesContainer};
pub use contribution::ContributionView;
pub use domain::{reduce_distributions, CompartmentState, ReactorDomain};
pub use events::{EventContainer, EventType, N_EVENT_TYPES};
pub use model::{ParticleModel, PilotCell, Status};
pub use prng::RngPool;
