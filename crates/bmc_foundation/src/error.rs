// crates/bmc_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `BmcError` 枚举和 `BmcResult` 类型别名，用于整个项目的错误处理。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义核心错误，模拟相关错误在上层 crate 中扩展
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **失败语义**: 配置错误不可恢复，容量溢出为软错误（计数而非报错）
//!
//! # 示例
//!
//! ```
//! use bmc_foundation::error::{BmcError, BmcResult};
//!
//! fn read_parameters() -> BmcResult<()> {
//!     Err(BmcError::config("参数文件格式错误"))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type BmcResult<T> = Result<T, BmcError>;

/// BioMC 错误类型
///
/// 核心错误类型，用于整个项目。模拟循环相关的错误应在上层扩展。
#[derive(Error, Debug)]
pub enum BmcError {
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 无效配置
    #[error("配置错误: {message}")]
    Config {
        /// 说明无效原因
        message: String,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 维度不匹配
    #[error("维度不匹配: {context} (期望 {expected}, 实际 {actual})")]
    DimensionMismatch {
        /// 出错位置说明
        context: String,
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 隔室体积为零，逆体积矩阵不可求
    #[error("隔室 {compartment} 体积为零, 矩阵不可逆")]
    ZeroVolume {
        /// 隔室索引
        compartment: usize,
    },

    /// 分布式通信错误（通道断开等），协议正确性依赖每次集合通信成功
    #[error("通信错误: {message}")]
    Communication {
        /// 描述性错误信息
        message: String,
    },

    /// 运行时契约违反
    #[error("契约违反: {message}")]
    Contract {
        /// 描述性错误信息
        message: String,
    },
}

impl BmcError {
    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 创建无效输入错误
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 创建维度不匹配错误
    pub fn dimension_mismatch(
        context: impl Into<String>,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// 创建通信错误
    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    /// 创建契约违反错误
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract {
            message: message.into(),
        }
    }

    /// 从 IO 错误创建
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BmcError::dimension_mismatch("体积数组", 4, 3);
        assert!(err.to_string().contains("期望 4"));

        let err = BmcError::ZeroVolume { compartment: 2 };
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_config_helper() {
        let err = BmcError::config("missing field");
        assert!(matches!(err, BmcError::Config { .. }));
    }
}
