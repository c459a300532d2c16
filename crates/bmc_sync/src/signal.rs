// crates/bmc_sync/src/signal.rs

//! 主从控制信号
//!
//! 判别值即线路字节，属协议的一部分。`Stop = 0` 是有意的：
//! 载荷全零的帧被解读为停机而不是误启动一步。

use bmc_foundation::error::{BmcError, BmcResult};

/// 主进程每步向工作进程广播的控制信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    /// 停机：工作进程退出主循环
    Stop = 0,
    /// 执行一个时间步
    Run = 1,
    /// 空转：本步无事可做，仅保持同步
    Nop = 2,
    /// 即刻上报状态快照
    Dump = 3,
}

impl Signal {
    /// 线路字节
    #[inline]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// 从线路字节解析
    pub fn from_byte(byte: u8) -> BmcResult<Self> {
        match byte {
            0 => Ok(Signal::Stop),
            1 => Ok(Signal::Run),
            2 => Ok(Signal::Nop),
            3 => Ok(Signal::Dump),
            other => Err(BmcError::communication(format!("未知控制信号字节: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_zero() {
        assert_eq!(Signal::Stop.as_byte(), 0);
    }

    #[test]
    fn test_round_trip() {
        for s in [Signal::Stop, Signal::Run, Signal::Nop, Signal::Dump] {
            assert_eq!(Signal::from_byte(s.as_byte()).unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_byte_rejected() {
        assert!(Signal::from_byte(42).is_err());
    }
}
