// crates/bmc_core/src/results.rs

//! 运行结果采集
//!
//! 主进程按记录间隔把全局状态快照追加进共享缓冲区。句柄可
//! 克隆，监控线程可以在运行中途读取快照，互斥由读写锁保证
//! （写端只有主循环，读端任意）。

use bmc_foundation::error::{BmcError, BmcResult};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// 一次状态记录：某步结束时的全局可观测量
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 时间步编号
    pub step: u64,
    /// 物理时刻 \[s\]
    pub time: f64,
    /// 全局粒子总数
    pub total_particles: u64,
    /// 全局各隔室粒子分布
    pub distribution: Vec<u64>,
    /// 全局事件计数（判别值序）
    pub events: Vec<u64>,
    /// 主进程液相浓度场快照，行主序 `[隔室][物种]`
    pub concentrations: Vec<f64>,
}

/// 可克隆的结果采集句柄
#[derive(Debug, Clone, Default)]
pub struct SharedResults {
    records: Arc<RwLock<Vec<StepRecord>>>,
}

impl SharedResults {
    /// 空缓冲区
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录
    pub fn record(&self, record: StepRecord) {
        self.records.write().push(record);
    }

    /// 当前记录数量
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// 是否尚无记录
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// 全部记录的克隆快照
    pub fn snapshot(&self) -> Vec<StepRecord> {
        self.records.read().clone()
    }

    /// 最后一条记录的克隆
    pub fn last(&self) -> Option<StepRecord> {
        self.records.read().last().cloned()
    }

    /// 把全部记录导出为 JSON 文件
    pub fn export_json(&self, path: impl AsRef<Path>) -> BmcResult<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .map_err(|e| BmcError::io(format!("创建结果文件 {}", path.display()), e))?;
        serde_json::to_writer_pretty(file, &*self.records.read())
            .map_err(|e| BmcError::io(format!("序列化结果到 {}", path.display()), e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(step: u64) -> StepRecord {
        StepRecord {
            step,
            time: step as f64 * 0.1,
            total_particles: 100,
            distribution: vec![60, 40],
            events: vec![0; 6],
            concentrations: vec![5.0, 0.0, 4.0, 0.1],
        }
    }

    #[test]
    fn test_record_and_snapshot() {
        let results = SharedResults::new();
        assert!(results.is_empty());
        results.record(sample(0));
        results.record(sample(10));
        assert_eq!(results.len(), 2);
        assert_eq!(results.last().unwrap().step, 10);

        // 克隆句柄看到同一缓冲区
        let other = results.clone();
        other.record(sample(20));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_export_json() {
        let results = SharedResults::new();
        results.record(sample(0));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        results.export_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("total_particles"));
    }
}
