// crates/bmc_sim/src/kernel.rs

//! 单粒子扫描核
//!
//! 每步对每个存活粒子依次执行：迁移核、出口核、生物模型更新、
//! 贡献散射、分裂处理。核内只通过原子单元写共享状态（隔室
//! 计数、事件计数、贡献视图、分裂缓冲区），粒子主行独占可变。
//!
//! # 随机数纪律
//!
//! 每个粒子每步持有一条独立随机流，核内各阶段按固定次序消费
//! 该流，结果与线程调度无关。

use bmc_cma::snapshot::NeighborTable;
use bmc_cma::state::PreCalculatedHydroState;
use bmc_mc::container::DivisionBuffer;
use bmc_mc::contribution::ContributionView;
use bmc_mc::domain::ReactorDomain;
use bmc_mc::events::{EventContainer, EventType};
use bmc_mc::model::{ParticleModel, Status};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 经某隔室离开反应器的液相出流
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitFlow {
    /// 出口隔室
    pub compartment: usize,
    /// 出流流量 \[m³/s\]
    pub flow: f64,
}

/// 粒子本步是否离开当前隔室
///
/// 驻留时间服从指数分布：当 `dt·flow/volume > -ln(1-u)` 时离开，
/// `u` 为 \[0, 1) 均匀随机数。
#[inline]
pub fn probability_leaving(random: f64, volume: f64, flow: f64, d_t: f64) -> bool {
    d_t * flow / volume > -(1.0 - random).ln()
}

/// [`probability_leaving`] 的免对数近似
///
/// 二阶展开 `1-exp(-a) ≈ a(1-a/2)`，在 `dt·flow/volume ≪ 1` 的
/// 常规步长下与精确式一致。
#[inline]
pub fn probability_leaving_fast(random: f64, volume: f64, flow: f64, d_t: f64) -> bool {
    let a = d_t * flow / volume;
    random < a * (1.0 - 0.5 * a)
}

/// 按累积概率行采样目标隔室
///
/// 缺省为第一个邻居；扫描全部相邻对 `[c(k), c(k+1)]`，随机数
/// 落入闭区间则取邻居 `k+1`。不提前跳出，与填充自环共存。
#[inline]
pub fn find_next_compartment(random: f64, neighbor_row: &[usize], cum_row: &[f64]) -> usize {
    debug_assert_eq!(neighbor_row.len(), cum_row.len());
    let mut next = neighbor_row[0];
    for k in 0..neighbor_row.len().saturating_sub(1) {
        let pi = cum_row[k];
        let pn = cum_row[k + 1];
        if pi <= random && random <= pn {
            next = neighbor_row[k + 1];
        }
    }
    next
}

/// 一次扫描的共享只读上下文
///
/// 所有字段在扫描期间冻结；可变共享状态均为原子。
pub struct SweepContext<'a> {
    /// 时间步长 \[s\]
    pub d_t: f64,
    /// 隔室域（原子粒子计数）
    pub domain: &'a ReactorDomain,
    /// 当前液相水力状态
    pub hydro: &'a PreCalculatedHydroState,
    /// 邻接表
    pub neighbors: &'a NeighborTable,
    /// 液相浓度场，行主序 `[隔室][物种]`
    pub concentrations: &'a [f64],
    /// 每隔室物种数
    pub n_species: usize,
    /// 出口流表
    pub exit_flows: &'a [ExitFlow],
    /// 事件计数
    pub events: &'a EventContainer,
    /// 生物量贡献累加器
    pub contributions: &'a ContributionView,
    /// 标量粒子权重
    pub weight: f64,
}

impl<'a> SweepContext<'a> {
    /// 推进单个粒子一个时间步
    ///
    /// 返回 `true` 表示粒子本步失活（死亡或流出），行待压实。
    pub fn advance_particle<M: ParticleModel>(
        &self,
        rng: &mut ChaCha8Rng,
        status: &mut Status,
        position: &mut usize,
        props: &mut [f64],
        buffer: &DivisionBuffer<'_>,
    ) -> bool {
        if *status != Status::Idle {
            // 已失活的行等待压实，跳过
            return false;
        }

        self.handle_move(rng, position);
        self.handle_exit(rng, status, *position);
        if *status == Status::Exit {
            self.events.incr(EventType::Exit);
            return true;
        }

        let i = *position;
        let local = &self.concentrations[i * self.n_species..(i + 1) * self.n_species];
        *status = M::update(self.d_t, props, local);

        M::contribution(i, self.weight, props, self.contributions);

        match *status {
            Status::Division => {
                if buffer.try_divide::<M>(rng, i, props) {
                    self.events.incr(EventType::NewParticle);
                } else {
                    // 缓冲区耗尽：本步该分裂丢失，母粒子继续存活
                    warn!(compartment = i, "分裂缓冲区溢出，丢弃一次分裂");
                    self.events.incr(EventType::Overflow);
                }
                *status = Status::Idle;
                false
            }
            Status::Dead => {
                self.events.incr(EventType::Death);
                self.domain.compartment(i).decr();
                true
            }
            _ => false,
        }
    }

    /// 迁移核：离开判定 + 目标采样 + 原子计数迁移
    fn handle_move(&self, rng: &mut ChaCha8Rng, position: &mut usize) {
        let i = *position;
        let rng1: f64 = rng.gen();
        if !probability_leaving(rng1, self.hydro.volume[i], self.hydro.outflow_diagonal[i], self.d_t)
        {
            return;
        }

        let rng2: f64 = rng.gen();
        let next = find_next_compartment(
            rng2,
            self.neighbors.row(i),
            self.hydro.cumulative_probability.row(i),
        );

        self.domain.compartment(i).decr();
        self.domain.compartment(next).incr();
        *position = next;
        self.events.incr(EventType::Move);
    }

    /// 出口核：逐出口做离开判定，命中则粒子流出
    fn handle_exit(&self, rng: &mut ChaCha8Rng, status: &mut Status, position: usize) {
        for exit in self.exit_flows {
            let random: f64 = rng.gen();
            if position != exit.compartment || *status != Status::Idle {
                return;
            }
            if probability_leaving(random, self.hydro.volume[exit.compartment], exit.flow, self.d_t)
            {
                self.domain.compartment(exit.compartment).decr();
                *status = Status::Exit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_probability_leaving_monotone_in_flow() {
        // 同一随机数下，流量越大越可能离开
        let u = 0.5;
        assert!(!probability_leaving(u, 1.0, 1e-6, 0.1));
        assert!(probability_leaving(u, 1.0, 1e3, 0.1));
    }

    #[test]
    fn test_probability_leaving_zero_random_stays() {
        // u = 0 时 -ln(1) = 0，任何正流量都会离开
        assert!(probability_leaving(0.0, 1.0, 1.0, 0.1));
        // 流量为零永不离开
        assert!(!probability_leaving(0.5, 1.0, 0.0, 0.1));
    }

    #[test]
    fn test_probability_leaving_fast_matches_exact() {
        // 小离开概率区间内，近似式与精确式判定一致
        let (volume, flow, d_t) = (10.0, 0.5, 0.2);
        for i in 0..100 {
            let u = i as f64 / 100.0;
            assert_eq!(
                probability_leaving_fast(u, volume, flow, d_t),
                probability_leaving(u, volume, flow, d_t),
                "u = {u}"
            );
        }
    }

    #[test]
    fn test_find_next_compartment_two_neighbors() {
        // 隔室 0 的邻居 [1, 2]，累积 [0.3, 1.0]
        let neighbors = [1usize, 2];
        let cum = [0.3, 1.0];
        assert_eq!(find_next_compartment(0.1, &neighbors, &cum), 1);
        assert_eq!(find_next_compartment(0.3 - TOL, &neighbors, &cum), 1);
        assert_eq!(find_next_compartment(0.5, &neighbors, &cum), 2);
        assert_eq!(find_next_compartment(1.0, &neighbors, &cum), 2);
    }

    #[test]
    fn test_find_next_compartment_tail_padding() {
        // 尾部自环填充列为 0，闭区间扫描不会误选
        let neighbors = [1usize, 2, 0, 0];
        let cum = [0.3, 1.0, 0.0, 0.0];
        assert_eq!(find_next_compartment(0.5, &neighbors, &cum), 2);
        assert_eq!(find_next_compartment(0.2, &neighbors, &cum), 1);
    }

    #[test]
    fn test_find_next_compartment_single_neighbor() {
        let neighbors = [1usize];
        let cum = [1.0];
        assert_eq!(find_next_compartment(0.7, &neighbors, &cum), 1);
    }
}
