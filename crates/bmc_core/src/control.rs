// crates/bmc_core/src/control.rs

//! 运行控制旗标
//!
//! 协作式停机与即席快照：旗标由任意线程置位（CLI 信号处理、
//! 监控线程），主循环在每步步首检查。停机在当前步完成后生效，
//! 不打断步内扫描。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 可克隆的运行控制句柄
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stop: Arc<AtomicBool>,
    dump: Arc<AtomicBool>,
}

impl RunControl {
    /// 全清旗标
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求在当前步结束后停机
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// 是否已请求停机
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// 请求一次状态快照
    pub fn request_dump(&self) {
        self.dump.store(true, Ordering::Relaxed);
    }

    /// 取走快照请求（读后清零）
    #[inline]
    pub fn take_dump(&self) -> bool {
        self.dump.swap(false, Ordering::Relaxed)
    }
}
