// crates/bmc_sync/src/payload.rs

//! 同步协议的三种载荷
//!
//! [`InitPayload`] 在运行开始时广播一次：全体 rank 必须一致的
//! 标量参数。[`StepPayload`] 随 `Run` 信号下发：工作进程本步
//! 要用的流量矩阵、两相体积、邻接表、全局浓度场与耗散率。
//! [`GatherReport`] 逆向上行：每步结束时工作进程上报的粒子
//! 分布、事件快照与本地贡献和。

use crate::codec::{FrameReader, FrameWriter};
use bmc_foundation::error::{BmcError, BmcResult};

/// 启动握手时广播的固定标量参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitPayload {
    /// 总时间步数
    pub n_timestep: u64,
    /// 每张流图重复步数
    pub n_per_flowmap: u64,
    /// 流图数量
    pub n_flowmap: u64,
    /// 隔室数量
    pub n_compartments: u64,
    /// 是否两相流
    pub two_phase_flow: bool,
}

impl InitPayload {
    /// 编码为帧字节
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FrameWriter::new();
        w.put_u64(self.n_timestep)
            .put_u64(self.n_per_flowmap)
            .put_u64(self.n_flowmap)
            .put_u64(self.n_compartments)
            .put_u64(u64::from(self.two_phase_flow));
        w.finish()
    }

    /// 从帧字节解码
    pub fn decode(bytes: &[u8]) -> BmcResult<Self> {
        let mut r = FrameReader::new(bytes);
        Ok(Self {
            n_timestep: r.take_u64()?,
            n_per_flowmap: r.take_u64()?,
            n_flowmap: r.take_u64()?,
            n_compartments: r.take_u64()?,
            two_phase_flow: r.take_u64()? != 0,
        })
    }
}

/// 主进程随 `Run` 信号广播的水力数据
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepPayload {
    /// 稠密行主序液相流量矩阵（n × n）
    pub flows: Vec<f64>,
    /// 液相体积
    pub liquid_volumes: Vec<f64>,
    /// 气相体积（单相流时为空）
    pub gas_volumes: Vec<f64>,
    /// 扁平邻接表（`n × n_col`，自环填充）
    pub neighbors: Vec<u64>,
    /// 邻接表列宽
    pub n_neighbor_col: u64,
    /// 归约后的全局液相浓度场（`n × n_species`）
    pub concentrations: Vec<f64>,
    /// 本步湍动能耗散率
    pub energy_dissipation: f64,
}

impl StepPayload {
    /// 编码为帧字节
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FrameWriter::new();
        w.put_slice(&self.flows)
            .put_slice(&self.liquid_volumes)
            .put_slice(&self.gas_volumes)
            .put_slice(&self.neighbors)
            .put_u64(self.n_neighbor_col)
            .put_slice(&self.concentrations)
            .put_f64(self.energy_dissipation);
        w.finish()
    }

    /// 从帧字节解码并做形状校验
    pub fn decode(bytes: &[u8]) -> BmcResult<Self> {
        let mut r = FrameReader::new(bytes);
        let payload = Self {
            flows: r.take_vec()?,
            liquid_volumes: r.take_vec()?,
            gas_volumes: r.take_vec()?,
            neighbors: r.take_vec()?,
            n_neighbor_col: r.take_u64()?,
            concentrations: r.take_vec()?,
            energy_dissipation: r.take_f64()?,
        };
        payload.validate()?;
        Ok(payload)
    }

    /// 隔室数量
    #[inline]
    pub fn n_compartments(&self) -> usize {
        self.liquid_volumes.len()
    }

    fn validate(&self) -> BmcResult<()> {
        let n = self.n_compartments();
        if self.flows.len() != n * n {
            return Err(BmcError::communication(format!(
                "流量矩阵形状不符: {} != {n}²",
                self.flows.len()
            )));
        }
        if !self.gas_volumes.is_empty() && self.gas_volumes.len() != n {
            return Err(BmcError::communication("气相体积长度与隔室数不符"));
        }
        if self.neighbors.len() != n * self.n_neighbor_col as usize {
            return Err(BmcError::communication("邻接表形状与列宽不符"));
        }
        if n > 0 && self.concentrations.len() % n != 0 {
            return Err(BmcError::communication("浓度场长度不是隔室数的整数倍"));
        }
        Ok(())
    }
}

/// 工作进程每步上行的状态快照
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GatherReport {
    /// 上报方 rank
    pub rank: u64,
    /// 本地粒子数量
    pub n_particles: u64,
    /// 各隔室粒子计数
    pub distribution: Vec<u64>,
    /// 事件计数快照（判别值序）
    pub events: Vec<u64>,
    /// 本步本地贡献和（`n × n_species`，待主进程归约）
    pub contributions: Vec<f64>,
}

impl GatherReport {
    /// 编码为帧字节
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FrameWriter::new();
        w.put_u64(self.rank)
            .put_u64(self.n_particles)
            .put_slice(&self.distribution)
            .put_slice(&self.events)
            .put_slice(&self.contributions);
        w.finish()
    }

    /// 从帧字节解码
    pub fn decode(bytes: &[u8]) -> BmcResult<Self> {
        let mut r = FrameReader::new(bytes);
        Ok(Self {
            rank: r.take_u64()?,
            n_particles: r.take_u64()?,
            distribution: r.take_vec()?,
            events: r.take_vec()?,
            contributions: r.take_vec()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> StepPayload {
        StepPayload {
            flows: vec![0.0, 0.5, 0.5, 0.0],
            liquid_volumes: vec![1.0, 2.0],
            gas_volumes: vec![],
            neighbors: vec![1, 0, 0, 1],
            n_neighbor_col: 2,
            concentrations: vec![5.0, 0.0, 4.5, 0.1],
            energy_dissipation: 0.3,
        }
    }

    #[test]
    fn test_init_payload_round_trip() {
        let init = InitPayload {
            n_timestep: 500,
            n_per_flowmap: 5,
            n_flowmap: 3,
            n_compartments: 20,
            two_phase_flow: true,
        };
        assert_eq!(InitPayload::decode(&init.encode()).unwrap(), init);
    }

    #[test]
    fn test_step_payload_round_trip() {
        let payload = sample_payload();
        let decoded = StepPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.n_compartments(), 2);
    }

    #[test]
    fn test_step_payload_bad_shape_rejected() {
        let mut payload = sample_payload();
        payload.flows.pop();
        assert!(StepPayload::decode(&payload.encode()).is_err());
    }

    #[test]
    fn test_gather_report_round_trip() {
        let report = GatherReport {
            rank: 3,
            n_particles: 1000,
            distribution: vec![400, 600],
            events: vec![0, 12, 1, 77, 0, 0],
            contributions: vec![-0.2, 0.05, -0.1, 0.02],
        };
        assert_eq!(GatherReport::decode(&report.encode()).unwrap(), report);
    }
}
