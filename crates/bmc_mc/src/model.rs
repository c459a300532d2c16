// crates/bmc_mc/src/model.rs

//! 生物模型契约
//!
//! 粒子容器对生物反应动力学模型做编译期泛型，模型集合按构建
//! 固定（闭集），粒子扫描热路径上没有虚表开销。容器对动力学
//! 语义不做任何假设，只依赖本契约。
//!
//! 模型属性为定长 f64 向量（长度 `N_VAR`），以扁平行存储在
//! 容器中；浓度切片为当前隔室的局部物种浓度。

use crate::contribution::ContributionView;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// 粒子状态
///
/// 判别值来自线路协议（按字节传输），勿改动次序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    /// 正在分裂（本步写入分裂缓冲区）
    Division = 0,
    /// 随流离开反应器
    Exit = 1,
    /// 正常存活
    Idle = 2,
    /// 死亡（待压实移除）
    Dead = 3,
}

/// 当前隔室的局部物种浓度切片
pub type LocalConcentration<'a> = &'a [f64];

/// 生物模型契约
///
/// 实现者提供粒子初始化、每步更新、分裂派生和物种贡献四个
/// 核函数。所有函数都以粒子属性行（`&[f64]` / `&mut [f64]`，
/// 长度 `N_VAR`）为单位操作，不得访问其他粒子。
pub trait ParticleModel: Send + Sync + 'static {
    /// 每粒子属性数量（模型定义的常量）
    const N_VAR: usize;

    /// 物种数量（贡献累加器的列数）
    const N_SPECIES: usize;

    /// 初始化一个粒子的属性行
    fn init(rng: &mut ChaCha8Rng, props: &mut [f64]);

    /// 推进一个粒子一个时间步
    ///
    /// 读取局部浓度，更新属性行，返回新状态。
    fn update(dt: f64, props: &mut [f64], concentration: LocalConcentration<'_>) -> Status;

    /// 分裂：由父粒子属性派生子粒子属性
    ///
    /// 可以同时修改父属性（质量对半等）。
    fn division(rng: &mut ChaCha8Rng, parent: &mut [f64], child: &mut [f64]);

    /// 物种贡献：将 `weight × 速率` 散射进累加器
    fn contribution(compartment: usize, weight: f64, props: &[f64], view: &ContributionView);

    /// 参与物种贡献的属性槽位（边界描述符）
    fn uptake_slots() -> &'static [usize];
}

// ============================================================================
// 试点模型
// ============================================================================

/// 两变量试点细胞模型
///
/// 属性布局: `[质量, 年龄]`。物种布局: `[底物, 代谢副产物]`。
/// Monod 生长 + 质量阈值触发分裂，用于测试与 CLI 演示；
/// 不是对任何真实菌株的标定。
#[derive(Debug, Clone, Copy)]
pub struct PilotCell;

impl PilotCell {
    /// 最大比生长速率 [1/s]
    pub const MU_MAX: f64 = 4.0e-4;
    /// 半饱和常数 [kg/m3]
    pub const KS: f64 = 0.05;
    /// 底物得率 [kg 菌体 / kg 底物]
    pub const YIELD: f64 = 0.5;
    /// 分裂质量阈值
    pub const DIVISION_MASS: f64 = 2.0;
    /// 初始质量
    pub const INITIAL_MASS: f64 = 1.0;

    const MASS: usize = 0;
    const AGE: usize = 1;
    const SUBSTRATE: usize = 0;
    const BYPRODUCT: usize = 1;
}

impl ParticleModel for PilotCell {
    const N_VAR: usize = 2;
    const N_SPECIES: usize = 2;

    fn init(rng: &mut ChaCha8Rng, props: &mut [f64]) {
        // 初始质量加 ±10% 扰动，避免全种群同步分裂
        props[Self::MASS] = Self::INITIAL_MASS * rng.gen_range(0.9..1.1);
        props[Self::AGE] = 0.0;
    }

    fn update(dt: f64, props: &mut [f64], concentration: LocalConcentration<'_>) -> Status {
        let s = concentration[Self::SUBSTRATE].max(0.0);
        let mu = Self::MU_MAX * s / (Self::KS + s);
        props[Self::MASS] *= (mu * dt).exp();
        props[Self::AGE] += dt;

        if props[Self::MASS] >= Self::DIVISION_MASS {
            Status::Division
        } else {
            Status::Idle
        }
    }

    fn division(rng: &mut ChaCha8Rng, parent: &mut [f64], child: &mut [f64]) {
        // 轻微不对称分裂
        let ratio = rng.gen_range(0.45..0.55);
        let total = parent[Self::MASS];
        parent[Self::MASS] = total * ratio;
        parent[Self::AGE] = 0.0;
        child[Self::MASS] = total * (1.0 - ratio);
        child[Self::AGE] = 0.0;
    }

    fn contribution(compartment: usize, weight: f64, props: &[f64], view: &ContributionView) {
        // 生长对应的底物消耗与副产物生成速率（近似用 mu_max 上界）
        let uptake = Self::MU_MAX / Self::YIELD * props[Self::MASS];
        view.add(compartment, Self::SUBSTRATE, -weight * uptake);
        view.add(compartment, Self::BYPRODUCT, weight * uptake * 0.1);
    }

    fn uptake_slots() -> &'static [usize] {
        &[Self::MASS]
    }
}
