// crates/bmc_foundation/src/validation.rs

//! 运行时验证工具
//!
//! 提供配置与输入数据的验证函数。验证失败即返回错误，
//! 调用方不做重试（配置错误在检测点不可恢复）。
//!
//! # 示例
//!
//! ```
//! use bmc_foundation::validation::check_dimension;
//!
//! let volumes = [1.0, 2.0, 3.0];
//! assert!(check_dimension("体积数组", 3, volumes.len()).is_ok());
//! assert!(check_dimension("体积数组", 4, volumes.len()).is_err());
//! ```

use crate::error::{BmcError, BmcResult};

/// 检查数组维度是否匹配
#[inline]
pub fn check_dimension(context: &str, expected: usize, actual: usize) -> BmcResult<()> {
    if expected != actual {
        return Err(BmcError::dimension_mismatch(context, expected, actual));
    }
    Ok(())
}

/// 检查标量为正
#[inline]
pub fn check_positive(context: &str, value: f64) -> BmcResult<()> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(BmcError::invalid_input(format!(
            "{context}: 需要正有限值, 实际 {value}"
        )));
    }
    Ok(())
}

/// 检查体积数组非零（逆体积计算前调用）
pub fn check_volumes(volumes: &[f64]) -> BmcResult<()> {
    for (i, &v) in volumes.iter().enumerate() {
        if v == 0.0 {
            return Err(BmcError::ZeroVolume { compartment: i });
        }
        if !v.is_finite() || v < 0.0 {
            return Err(BmcError::invalid_input(format!(
                "隔室 {i} 体积无效: {v}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension("x", 3, 3).is_ok());
        assert!(check_dimension("x", 3, 4).is_err());
    }

    #[test]
    fn test_check_positive() {
        assert!(check_positive("dt", 0.1).is_ok());
        assert!(check_positive("dt", 0.0).is_err());
        assert!(check_positive("dt", f64::NAN).is_err());
    }

    #[test]
    fn test_check_volumes_zero() {
        let err = check_volumes(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, BmcError::ZeroVolume { compartment: 1 }));
    }
}
