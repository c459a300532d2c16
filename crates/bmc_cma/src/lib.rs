// crates/bmc_cma/src/lib.rs

//! BioMC 隔室模型工具层 (Layer 2)
//!
//! 处理外部提供的离散化流场快照，并将其转换为模拟循环可以
//! 直接使用的水力学派生数据。
//!
//! # 模块概览
//!
//! - [`snapshot`]: 流图快照、邻接表与顺序访问迭代器接口
//! - [`transition`]: 稀疏转移矩阵与累积概率表
//! - [`state`]: 单个流图对应的预计算水力状态
//! - [`transitioner`]: 流图推进器（缓存/重算决策状态机）
//!
//! # 缓存策略
//!
//! 每个不同的流图快照只计算一次派生数据（转移矩阵、累积概率、
//! 逆体积），之后在有限流图集合上循环重放。缓存槽数量由流图
//! 数量决定，与时间步数无关。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod snapshot;
pub mod state;
pub mod transition;
pub mod transitioner;

// 重导出常用类型
pub use snapshot::{FlowProvider, FlowSnapshot, InMemoryFlowProvider, NeighborTable};
pub use state::PreCalculatedHydroState;
pub use transition::{CumulativeProbability, FlowMatrix};
pub use transitioner::{FlowMapTransitioner, IterationState};
