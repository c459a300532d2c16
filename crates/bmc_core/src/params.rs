// crates/bmc_core/src/params.rs

//! 模拟参数
//!
//! 运行一个算例所需的全部用户输入，从 JSON 文件加载。字段缺省
//! 即单进程、单相、封闭反应器的最小配置。参数在装配算例之前
//! 必须通过 [`SimulationParameters::validate`]，配置错误不可恢复。

use bmc_foundation::error::{BmcError, BmcResult};
use bmc_foundation::validation;
use bmc_sim::ExitFlow;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 一个算例的完整用户参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationParameters {
    /// 全局初始粒子数量（各 rank 均分）
    pub n_particles: usize,
    /// 标量粒子权重（一个模拟粒子代表的细胞数）
    #[serde(default = "default_weight")]
    pub initial_weight: f64,
    /// 时间步长 \[s\]
    pub d_t: f64,
    /// 模拟总时长 \[s\]
    pub final_time: f64,
    /// 每张流图重复使用的步数
    #[serde(default = "default_n_per_flowmap")]
    pub n_per_flowmap: usize,
    /// 随机数种子
    #[serde(default)]
    pub seed: u64,
    /// 工作进程数量（0 表示仅主进程）
    #[serde(default)]
    pub n_workers: usize,
    /// 是否两相流
    #[serde(default)]
    pub two_phase_flow: bool,
    /// 状态记录间隔（步，0 表示只记录最终状态）
    #[serde(default)]
    pub dump_interval: usize,
    /// 出口流表
    #[serde(default)]
    pub exit_flows: Vec<ExitFlow>,
    /// 各物种的初始液相浓度（全隔室一致）
    #[serde(default)]
    pub initial_concentrations: Vec<f64>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_n_per_flowmap() -> usize {
    1
}

impl SimulationParameters {
    /// 从 JSON 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> BmcResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BmcError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| BmcError::io(format!("读取参数文件 {}", path.display()), e))?;
        let params: Self = serde_json::from_str(&text)
            .map_err(|e| BmcError::config(format!("参数文件解析失败: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// 参数一致性校验
    pub fn validate(&self) -> BmcResult<()> {
        if self.n_particles == 0 {
            return Err(BmcError::config("n_particles 必须大于 0"));
        }
        validation::check_positive("initial_weight", self.initial_weight)?;
        validation::check_positive("d_t", self.d_t)?;
        validation::check_positive("final_time", self.final_time)?;
        if self.n_per_flowmap == 0 {
            return Err(BmcError::config("n_per_flowmap 必须大于 0"));
        }
        for exit in &self.exit_flows {
            validation::check_positive("出口流量", exit.flow)?;
        }
        for (i, &c) in self.initial_concentrations.iter().enumerate() {
            if c < 0.0 {
                return Err(BmcError::config(format!("物种 {i} 初始浓度为负")));
            }
        }
        Ok(())
    }

    /// 总时间步数（向上取整覆盖 `final_time`）
    #[inline]
    pub fn n_steps(&self) -> usize {
        (self.final_time / self.d_t).ceil() as usize
    }

    /// 参与模拟的 rank 总数（主进程 + 工作进程）
    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.n_workers + 1
    }
}
