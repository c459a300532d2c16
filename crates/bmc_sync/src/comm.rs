// crates/bmc_sync/src/comm.rs

//! 进程内通信组
//!
//! 一主多从的锁步拓扑：主端到每个工作端一对单向通道，外加一个
//! 共享屏障。帧内容是已编码的载荷字节，编解码由
//! [`crate::payload`] 负责。
//!
//! 任何一端掉线（通道断开）都是致命错误：锁步协议里缺员等价
//! 于死锁，立即让运行失败比挂起可诊断。

use crate::signal::Signal;
use bmc_foundation::error::{BmcError, BmcResult};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};
use tracing::trace;

/// 一帧消息：控制信号 + 已编码载荷
#[derive(Debug, Clone)]
pub struct Frame {
    /// 控制信号
    pub signal: Signal,
    /// 载荷字节（可为空）
    pub payload: Vec<u8>,
}

impl Frame {
    /// 无载荷帧
    pub fn bare(signal: Signal) -> Self {
        Self {
            signal,
            payload: Vec::new(),
        }
    }
}

/// 主端：持有到全部工作端的通道
#[derive(Debug)]
pub struct HostHub {
    to_workers: Vec<Sender<Frame>>,
    from_workers: Vec<Receiver<Frame>>,
    barrier: Arc<Barrier>,
}

/// 工作端：到主端的一对通道
#[derive(Debug)]
pub struct WorkerLink {
    rank: usize,
    to_host: Sender<Frame>,
    from_host: Receiver<Frame>,
    barrier: Arc<Barrier>,
}

/// 组建一主 `n_workers` 从的通信组
pub fn comm_group(n_workers: usize) -> (HostHub, Vec<WorkerLink>) {
    let barrier = Arc::new(Barrier::new(n_workers + 1));
    let mut to_workers = Vec::with_capacity(n_workers);
    let mut from_workers = Vec::with_capacity(n_workers);
    let mut links = Vec::with_capacity(n_workers);

    for rank in 0..n_workers {
        let (host_tx, worker_rx) = channel();
        let (worker_tx, host_rx) = channel();
        to_workers.push(host_tx);
        from_workers.push(host_rx);
        links.push(WorkerLink {
            rank,
            to_host: worker_tx,
            from_host: worker_rx,
            barrier: Arc::clone(&barrier),
        });
    }

    (
        HostHub {
            to_workers,
            from_workers,
            barrier,
        },
        links,
    )
}

impl HostHub {
    /// 工作端数量
    #[inline]
    pub fn n_workers(&self) -> usize {
        self.to_workers.len()
    }

    /// 向全部工作端广播同一帧
    pub fn broadcast(&self, signal: Signal, payload: &[u8]) -> BmcResult<()> {
        trace!(?signal, bytes = payload.len(), "广播");
        for (rank, tx) in self.to_workers.iter().enumerate() {
            tx.send(Frame {
                signal,
                payload: payload.to_vec(),
            })
            .map_err(|_| BmcError::communication(format!("工作端 {rank} 已掉线")))?;
        }
        Ok(())
    }

    /// 按 rank 序收齐每个工作端一帧
    pub fn gather(&self) -> BmcResult<Vec<Frame>> {
        self.from_workers
            .iter()
            .enumerate()
            .map(|(rank, rx)| {
                rx.recv()
                    .map_err(|_| BmcError::communication(format!("等待工作端 {rank} 时通道断开")))
            })
            .collect()
    }

    /// 进入锁步屏障
    pub fn barrier_wait(&self) {
        self.barrier.wait();
    }
}

impl WorkerLink {
    /// 本端 rank
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// 阻塞等待主端下一帧
    pub fn recv(&self) -> BmcResult<Frame> {
        self.from_host
            .recv()
            .map_err(|_| BmcError::communication("主端已掉线"))
    }

    /// 向主端上行一帧
    pub fn send(&self, signal: Signal, payload: Vec<u8>) -> BmcResult<()> {
        self.to_host
            .send(Frame { signal, payload })
            .map_err(|_| BmcError::communication("主端已掉线"))
    }

    /// 进入锁步屏障
    pub fn barrier_wait(&self) {
        self.barrier.wait();
    }
}
