// crates/bmc_cma/src/transitioner.rs

//! 流图推进器
//!
//! 在有限流图集合上循环推进的状态机，决定当前时间步使用哪个
//! 缓存槽，以及该槽是否需要（重新）计算。
//!
//! # 计数器语义
//!
//! - `current_flowmap_count`: 当前流图内已执行的步数，上界
//!   `n_per_flowmap`，到达后清零
//! - `repetition_count`: 已开始的流图访问次数，槽选择为
//!   `repetition_count % n_flowmap`
//! - 重算条件: `repetition_count < n_flowmap &&
//!   current_flowmap_count == 0`，即该槽首次被访问；此后整槽重放
//!
//! 总时间步数在构造时由 `final_time / dt` 固定，与流图数量无关，
//! 支持在一段短流场记录上无限循环。

use crate::snapshot::{FlowProvider, FlowSnapshot, NeighborTable};
use crate::state::PreCalculatedHydroState;
use bmc_foundation::error::{BmcError, BmcResult};
use tracing::debug;

/// 一个时间步的只读水力状态视图
///
/// 对当前选中的液相/气相状态与邻接表的借用，生命周期为一个
/// 时间步；不拥有任何被引数据。
#[derive(Debug, Clone, Copy)]
pub struct IterationState<'a> {
    /// 当前液相水力状态
    pub liquid: &'a PreCalculatedHydroState,
    /// 当前气相水力状态（两相流时存在）
    pub gas: Option<&'a PreCalculatedHydroState>,
    /// 当前邻接表视图
    pub neighbors: &'a NeighborTable,
    /// 湍动能耗散率（每步辅助标量）
    pub energy_dissipation: f64,
}

/// 流图推进与缓存引擎
///
/// 持有一组有界的水力状态缓存槽（每个不同流图一个），host 侧
/// 通过 [`FlowProvider`] 读取原始快照，worker 侧通过
/// [`advance_worker`](Self::advance_worker) 从线路缓冲区得到
/// 等价数据，保证所有 rank 在首轮之后无冗余地达到相同的缓存
/// 数值状态。
pub struct FlowMapTransitioner {
    two_phase_flow: bool,
    n_per_flowmap: usize,
    n_flowmap: usize,
    n_timestep: usize,
    repetition_count: usize,
    current_flowmap_count: usize,
    active_index: usize,
    recompute_count: usize,
    provider: Option<Box<dyn FlowProvider>>,
    liquid_cache: Vec<PreCalculatedHydroState>,
    gas_cache: Vec<PreCalculatedHydroState>,
    energy_cache: Vec<f64>,
}

impl FlowMapTransitioner {
    /// host 侧构造：持有快照读取器
    pub fn host(
        n_flowmap: usize,
        n_per_flowmap: usize,
        n_timestep: usize,
        provider: Box<dyn FlowProvider>,
        two_phase_flow: bool,
    ) -> BmcResult<Self> {
        if n_flowmap == 0 || n_flowmap > provider.len() {
            return Err(BmcError::config(format!(
                "流图数量无效: n_flowmap={n_flowmap}, 快照集合大小={}",
                provider.len()
            )));
        }
        Self::build(n_flowmap, n_per_flowmap, n_timestep, Some(provider), two_phase_flow)
    }

    /// worker 侧构造：无读取器，数据来自线路协议
    pub fn worker(
        n_flowmap: usize,
        n_per_flowmap: usize,
        n_timestep: usize,
        two_phase_flow: bool,
    ) -> BmcResult<Self> {
        Self::build(n_flowmap, n_per_flowmap, n_timestep, None, two_phase_flow)
    }

    fn build(
        n_flowmap: usize,
        n_per_flowmap: usize,
        n_timestep: usize,
        provider: Option<Box<dyn FlowProvider>>,
        two_phase_flow: bool,
    ) -> BmcResult<Self> {
        if n_flowmap == 0 {
            return Err(BmcError::config("n_flowmap 必须大于 0"));
        }
        if n_per_flowmap == 0 {
            return Err(BmcError::config("n_per_flowmap 必须大于 0"));
        }
        Ok(Self {
            two_phase_flow,
            n_per_flowmap,
            n_flowmap,
            n_timestep,
            repetition_count: 0,
            current_flowmap_count: 0,
            active_index: 0,
            recompute_count: 0,
            provider,
            liquid_cache: vec![PreCalculatedHydroState::default(); n_flowmap],
            gas_cache: vec![PreCalculatedHydroState::default(); n_flowmap],
            energy_cache: vec![0.0; n_flowmap],
        })
    }

    /// 当前槽是否需要液相状态计算
    ///
    /// 仅在该流图槽首次被访问时为真，此后整槽从缓存重放。
    #[inline]
    pub fn need_liquid_state(&self) -> bool {
        self.repetition_count < self.n_flowmap && self.current_flowmap_count == 0
    }

    /// 当前流图槽索引
    #[inline]
    pub fn flow_index(&self) -> usize {
        self.repetition_count % self.n_flowmap
    }

    /// 固定的总时间步数
    #[inline]
    pub fn n_timestep(&self) -> usize {
        self.n_timestep
    }

    /// 是否两相流
    #[inline]
    pub fn is_two_phase_flow(&self) -> bool {
        self.two_phase_flow
    }

    /// 缓存槽数量
    #[inline]
    pub fn n_flowmap(&self) -> usize {
        self.n_flowmap
    }

    /// 重算发生次数（可观测性，上界为 n_flowmap）
    #[inline]
    pub fn n_recompute(&self) -> usize {
        self.recompute_count
    }

    /// host 侧推进一步
    ///
    /// 需要重算时从读取器取下一个原始快照并填充当前槽，否则
    /// 原样复用缓存，然后推进计数器。
    pub fn advance(&mut self) -> BmcResult<()> {
        let idx = self.flow_index();

        if self.need_liquid_state() {
            let provider = self
                .provider
                .as_mut()
                .ok_or_else(|| BmcError::contract("worker 侧推进器不能调用 advance"))?;
            let snapshot = provider.snapshot_at(idx)?;
            let liquid = PreCalculatedHydroState::compute_liquid(
                &snapshot.liquid_flow,
                &snapshot.liquid_volume,
                &snapshot.neighbors,
            )?;
            let gas = if self.two_phase_flow {
                let gas_flow = snapshot.gas_flow.as_deref().ok_or_else(|| {
                    BmcError::config("两相流配置但快照缺少气相流量矩阵")
                })?;
                Some(PreCalculatedHydroState::compute_gas(
                    gas_flow,
                    &snapshot.gas_volume,
                )?)
            } else {
                None
            };
            let energy = snapshot.energy_dissipation;

            debug!(slot = idx, "重算流图水力状态");
            self.liquid_cache[idx] = liquid;
            if let Some(gas) = gas {
                self.gas_cache[idx] = gas;
            }
            self.energy_cache[idx] = energy;
            self.recompute_count += 1;
        }

        self.active_index = idx;
        self.update_counters();
        Ok(())
    }

    /// worker 侧推进一步
    ///
    /// 与 [`advance`](Self::advance) 执行相同的缓存/重算决策，
    /// 但原始数据来自线路缓冲区而非文件读取器。线路不携带气相
    /// 流量矩阵，两相流时气相槽只填体积与逆体积。
    pub fn advance_worker(
        &mut self,
        flows: &[f64],
        liquid_volumes: &[f64],
        gas_volumes: &[f64],
        neighbors: &NeighborTable,
        energy_dissipation: f64,
    ) -> BmcResult<()> {
        let idx = self.flow_index();

        if self.need_liquid_state() {
            debug!(slot = idx, "worker 重算流图水力状态");
            self.liquid_cache[idx] =
                PreCalculatedHydroState::compute_liquid(flows, liquid_volumes, neighbors)?;
            if self.two_phase_flow {
                if gas_volumes.is_empty() {
                    return Err(BmcError::communication(
                        "两相流配置但载荷缺少气相体积",
                    ));
                }
                self.gas_cache[idx] = PreCalculatedHydroState::from_volumes(gas_volumes)?;
            }
            self.energy_cache[idx] = energy_dissipation;
            self.recompute_count += 1;
        }

        self.active_index = idx;
        self.update_counters();
        Ok(())
    }

    /// 当前时间步的状态视图（调用 advance 之后有效）
    pub fn iteration_state(&self) -> IterationState<'_> {
        let liquid = &self.liquid_cache[self.active_index];
        IterationState {
            liquid,
            gas: self
                .two_phase_flow
                .then(|| &self.gas_cache[self.active_index]),
            neighbors: &liquid.neighbors,
            energy_dissipation: self.energy_cache[self.active_index],
        }
    }

    /// 当前步对应的原始快照（host 侧用于填充线路载荷）
    pub fn current_snapshot(&mut self) -> BmcResult<&FlowSnapshot> {
        let idx = self.active_index;
        let provider = self
            .provider
            .as_mut()
            .ok_or_else(|| BmcError::contract("worker 侧推进器没有快照读取器"))?;
        provider.snapshot_at(idx)
    }

    fn update_counters(&mut self) {
        self.current_flowmap_count += 1;
        if self.current_flowmap_count == self.n_per_flowmap {
            self.repetition_count += 1;
            self.current_flowmap_count = 0;
        }
    }
}
