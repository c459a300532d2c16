// crates/bmc_mc/src/events.rs

//! 模拟事件统计
//!
//! 每步扫描产生的计数事件：分裂、死亡、迁移、流出、缓冲区溢出
//! 等。计数器为原子，供并行扫描直接累加；步末由主进程对各
//! 工作进程的计数做逐类归并。

use bmc_foundation::metrics::Counter;

/// 事件类别总数
pub const N_EVENT_TYPES: usize = 6;

/// 扫描中可计数的事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum EventType {
    /// 权重调整（种群控制）
    ChangeWeight = 0,
    /// 新粒子产生（分裂成功）
    NewParticle = 1,
    /// 粒子死亡
    Death = 2,
    /// 隔室间迁移
    Move = 3,
    /// 经出口离开反应器
    Exit = 4,
    /// 分裂缓冲区耗尽，分裂丢失
    Overflow = 5,
}

impl EventType {
    /// 全部类别，按判别值序
    pub const ALL: [EventType; N_EVENT_TYPES] = [
        EventType::ChangeWeight,
        EventType::NewParticle,
        EventType::Death,
        EventType::Move,
        EventType::Exit,
        EventType::Overflow,
    ];
}

/// 事件计数器组
///
/// 一个固定长度的原子计数数组，判别值即下标。
#[derive(Debug, Default)]
pub struct EventContainer {
    counters: [Counter; N_EVENT_TYPES],
}

impl EventContainer {
    /// 全零计数器组
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次事件
    #[inline]
    pub fn incr(&self, event: EventType) {
        self.counters[event as usize].inc();
    }

    /// 记录 `n` 次事件
    #[inline]
    pub fn add(&self, event: EventType, n: u64) {
        self.counters[event as usize].add(n);
    }

    /// 读取单类计数
    #[inline]
    pub fn get(&self, event: EventType) -> u64 {
        self.counters[event as usize].get()
    }

    /// 导出全部计数（判别值序）
    pub fn snapshot(&self) -> [u64; N_EVENT_TYPES] {
        std::array::from_fn(|i| self.counters[i].get())
    }

    /// 清零
    pub fn reset(&self) {
        for c in &self.counters {
            c.reset();
        }
    }

    /// 归并多个 rank 的级联计数数组
    ///
    /// 输入为 `n_rank` 段首尾相接的计数快照，输出逐类求和。
    pub fn reduce(flat: &[u64], n_rank: usize) -> [u64; N_EVENT_TYPES] {
        debug_assert_eq!(flat.len(), N_EVENT_TYPES * n_rank);
        let mut out = [0u64; N_EVENT_TYPES];
        for rank in 0..n_rank {
            for (i, acc) in out.iter_mut().enumerate() {
                *acc += flat[rank * N_EVENT_TYPES + i];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let events = EventContainer::new();
        events.incr(EventType::NewParticle);
        events.incr(EventType::NewParticle);
        events.add(EventType::Move, 5);
        assert_eq!(events.get(EventType::NewParticle), 2);
        assert_eq!(events.get(EventType::Move), 5);
        assert_eq!(events.get(EventType::Death), 0);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let events = EventContainer::new();
        events.incr(EventType::Exit);
        events.incr(EventType::Overflow);
        let snap = events.snapshot();
        assert_eq!(snap[EventType::Exit as usize], 1);
        assert_eq!(snap[EventType::Overflow as usize], 1);
        events.reset();
        assert_eq!(events.snapshot(), [0; N_EVENT_TYPES]);
    }

    #[test]
    fn test_reduce_across_ranks() {
        let a = [1u64, 0, 2, 3, 0, 0];
        let b = [0u64, 4, 1, 0, 5, 1];
        let flat: Vec<u64> = a.iter().chain(b.iter()).copied().collect();
        let reduced = EventContainer::reduce(&flat, 2);
        assert_eq!(reduced, [1, 4, 3, 3, 5, 1]);
    }

    #[test]
    fn test_concurrent_counting() {
        let events = EventContainer::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        events.incr(EventType::Move);
                    }
                });
            }
        });
        assert_eq!(events.get(EventType::Move), 4000);
    }
}
