// crates/bmc_mc/src/container.rs

//! 粒子容器
//!
//! SoA 布局的粒子种群主存储：扁平属性表 (`n_allocated × N_VAR`)
//! 加平行的隔室/状态数组，另带一个分裂缓冲区供并行扫描期间
//! 无竞争地产生新粒子。
//!
//! # 并发纪律
//!
//! - 主表在扫描期间按行切分给各线程，粒子间互不可见
//! - 分裂写入只进入原子单元组成的缓冲区，由单个原子游标预订
//!   槽位，绝不触碰主表
//! - [`merge_buffer`](ParticlesContainer::merge_buffer) 与
//!   [`clean_dead`](ParticlesContainer::clean_dead) 为每步一次的
//!   单线程等价操作，只在扫描之外调用
//!
//! # 容量策略
//!
//! 几何增长（因子 2），步内绝不收缩；仅当步间利用率低于低水位
//! (0.1) 时收缩。缓冲区容量跟踪 `BUFFER_RATIO × capacity`。

use crate::model::{ParticleModel, Status};
use bmc_foundation::error::{BmcError, BmcResult};
use rand_chacha::ChaCha8Rng;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::trace;

/// 缓冲区容量 / 主表容量 之比
///
/// 高分裂率或刚性增长时 0.6 已足够，取 1 保守。
pub const BUFFER_RATIO: f64 = 1.0;

/// 默认几何分配因子
const DEFAULT_ALLOCATION_FACTOR: f64 = 2.0;

/// 收缩低水位：利用率低于此值时在步间收缩主表
const SHRINK_UTILIZATION: f64 = 0.1;

/// 批量压实的最小触发计数（阈值分数的下限）
const MIN_CLEAN_BATCH: usize = 32;

/// 分裂缓冲区的共享视图
///
/// 由原子单元组成，可在并行扫描期间与主表的可变借用共存。
/// 槽位通过 CAS 循环预订，绝不越界。
#[derive(Debug)]
pub struct DivisionBuffer<'a> {
    model: &'a [AtomicU64],
    position: &'a [AtomicUsize],
    cursor: &'a AtomicUsize,
    n_var: usize,
}

impl<'a> DivisionBuffer<'a> {
    /// 缓冲区槽位容量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.position.len()
    }

    /// 已预订槽位数量
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed).min(self.capacity())
    }

    /// 原子预订下一个空闲槽位
    ///
    /// 缓冲区耗尽时返回 `None`（软失败：调用方计 Overflow 事件，
    /// 该次分裂在本步丢失）。
    #[inline]
    pub fn try_reserve(&self) -> Option<usize> {
        let mut current = self.cursor.load(Ordering::Relaxed);
        loop {
            if current >= self.capacity() {
                return None;
            }
            match self.cursor.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current),
                Err(x) => current = x,
            }
        }
    }

    /// 预订槽位并执行模型分裂
    ///
    /// 成功时子粒子的派生属性写入缓冲区、隔室继承父粒子；
    /// 失败返回 `false`，分裂丢失（观察行为，按原样保留）。
    pub fn try_divide<M: ParticleModel>(
        &self,
        rng: &mut ChaCha8Rng,
        parent_compartment: usize,
        parent: &mut [f64],
    ) -> bool {
        let Some(slot) = self.try_reserve() else {
            return false;
        };

        let mut child = vec![0.0; M::N_VAR];
        M::division(rng, parent, &mut child);

        let base = slot * self.n_var;
        for (j, &v) in child.iter().enumerate() {
            self.model[base + j].store(v.to_bits(), Ordering::Relaxed);
        }
        self.position[slot].store(parent_compartment, Ordering::Relaxed);
        true
    }
}

/// 扫描期间的主表可变行视图
///
/// 切片均截断到 `n_used`；扫描核按行 zip 切分。
#[derive(Debug)]
pub struct ParticleRowsMut<'a> {
    /// 状态数组
    pub status: &'a mut [Status],
    /// 隔室数组
    pub position: &'a mut [usize],
    /// 扁平属性表（`n_used × n_var`）
    pub model: &'a mut [f64],
    /// 每粒子属性数量
    pub n_var: usize,
}

/// 蒙特卡洛粒子主容器
///
/// 对模型 `M` 做编译期泛型。粒子无身份：行即粒子，压实可以
/// 自由重排索引。
#[derive(Debug)]
pub struct ParticlesContainer<M: ParticleModel> {
    model: Vec<f64>,
    position: Vec<usize>,
    status: Vec<Status>,
    weight: f64,

    buffer_model: Vec<AtomicU64>,
    buffer_position: Vec<AtomicUsize>,
    buffer_cursor: AtomicUsize,

    allocation_factor: f64,
    n_allocated: usize,
    n_used: usize,
    inactive_counter: usize,

    _marker: PhantomData<M>,
}

impl<M: ParticleModel> ParticlesContainer<M> {
    /// 创建并初始化 `n_particle` 个粒子
    ///
    /// 所有粒子初始为 Idle、位于隔室 0；属性行由模型初始化。
    /// `weight` 为标量权重（一个模拟粒子代表的物理细胞数）。
    pub fn new(n_particle: usize, weight: f64, rng: &mut ChaCha8Rng) -> Self {
        let mut container = Self {
            model: Vec::new(),
            position: Vec::new(),
            status: Vec::new(),
            weight,
            buffer_model: Vec::new(),
            buffer_position: Vec::new(),
            buffer_cursor: AtomicUsize::new(0),
            allocation_factor: DEFAULT_ALLOCATION_FACTOR,
            n_allocated: 0,
            n_used: n_particle,
            inactive_counter: 0,
            _marker: PhantomData,
        };
        container.allocate(n_particle);
        container.allocate_buffer();
        for i in 0..n_particle {
            M::init(rng, container.row_mut(i));
        }
        container
    }

    // ------------------------------------------------------------------
    // 访问器
    // ------------------------------------------------------------------

    /// 当前粒子数量
    #[inline]
    pub fn n_particles(&self) -> usize {
        self.n_used
    }

    /// 已分配容量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.n_allocated
    }

    /// 分裂缓冲区容量
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_position.len()
    }

    /// 缓冲区游标当前值
    #[inline]
    pub fn buffer_cursor(&self) -> usize {
        self.buffer_cursor.load(Ordering::Relaxed).min(self.buffer_capacity())
    }

    /// 标量权重
    #[inline]
    pub fn get_weight(&self, _idx: usize) -> f64 {
        // 恒定权重模型：所有粒子共享一个标量
        self.weight
    }

    /// 粒子状态
    #[inline]
    pub fn status(&self, idx: usize) -> Status {
        self.status[idx]
    }

    /// 粒子所在隔室
    #[inline]
    pub fn position(&self, idx: usize) -> usize {
        self.position[idx]
    }

    /// 粒子属性行
    #[inline]
    pub fn properties(&self, idx: usize) -> &[f64] {
        &self.model[idx * M::N_VAR..(idx + 1) * M::N_VAR]
    }

    /// 把单个粒子的物种贡献散射进累加器（扫描外补算用）
    pub fn get_contributions(&self, idx: usize, view: &crate::contribution::ContributionView) {
        M::contribution(self.position[idx], self.weight, self.properties(idx), view);
    }

    /// 设置粒子所在隔室（初始分布用，扫描期间不得调用）
    pub fn set_position(&mut self, idx: usize, compartment: usize) {
        self.position[idx] = compartment;
    }

    /// 设置粒子状态（测试与初始化用）
    pub fn set_status(&mut self, idx: usize, status: Status) {
        self.status[idx] = status;
    }

    /// 未压实的失活粒子计数
    #[inline]
    pub fn inactive_counter(&self) -> usize {
        self.inactive_counter
    }

    #[inline]
    fn row_mut(&mut self, idx: usize) -> &mut [f64] {
        &mut self.model[idx * M::N_VAR..(idx + 1) * M::N_VAR]
    }

    // ------------------------------------------------------------------
    // 扫描切分
    // ------------------------------------------------------------------

    /// 把容器切分为主表可变视图与分裂缓冲区共享视图
    ///
    /// 两个视图借用不同字段，可在同一次并行扫描中同时使用。
    pub fn split_for_sweep(&mut self) -> (ParticleRowsMut<'_>, DivisionBuffer<'_>) {
        let n = self.n_used;
        let rows = ParticleRowsMut {
            status: &mut self.status[..n],
            position: &mut self.position[..n],
            model: &mut self.model[..n * M::N_VAR],
            n_var: M::N_VAR,
        };
        let buffer = DivisionBuffer {
            model: &self.buffer_model,
            position: &self.buffer_position,
            cursor: &self.buffer_cursor,
            n_var: M::N_VAR,
        };
        (rows, buffer)
    }

    /// 只读缓冲区视图（扫描外使用）
    pub fn division_buffer(&self) -> DivisionBuffer<'_> {
        DivisionBuffer {
            model: &self.buffer_model,
            position: &self.buffer_position,
            cursor: &self.buffer_cursor,
            n_var: M::N_VAR,
        }
    }

    // ------------------------------------------------------------------
    // 分裂
    // ------------------------------------------------------------------

    /// 尝试为粒子 `idx` 执行分裂（单线程契约路径）
    ///
    /// 并行扫描内请使用 [`split_for_sweep`](Self::split_for_sweep)
    /// 返回的 [`DivisionBuffer`]。
    pub fn handle_division(&mut self, rng: &mut ChaCha8Rng, idx: usize) -> bool {
        let compartment = self.position[idx];
        let parent = &mut self.model[idx * M::N_VAR..(idx + 1) * M::N_VAR];
        let buffer = DivisionBuffer {
            model: &self.buffer_model,
            position: &self.buffer_position,
            cursor: &self.buffer_cursor,
            n_var: M::N_VAR,
        };
        buffer.try_divide::<M>(rng, compartment, parent)
    }

    /// 合并分裂缓冲区（每步一次，扫描之后）
    ///
    /// 主表增长到 `n_used + cursor`，缓冲区行复制到尾部，游标
    /// 清零，缓冲区容量重新跟踪 `BUFFER_RATIO × capacity`。
    pub fn merge_buffer(&mut self) {
        let n_add = self.buffer_cursor();
        if n_add == 0 {
            return;
        }
        let original = self.n_used;
        self.allocate(original + n_add);

        for i in 0..n_add {
            let src = i * M::N_VAR;
            let dst = (original + i) * M::N_VAR;
            for j in 0..M::N_VAR {
                self.model[dst + j] =
                    f64::from_bits(self.buffer_model[src + j].load(Ordering::Relaxed));
            }
            self.position[original + i] = self.buffer_position[i].load(Ordering::Relaxed);
            self.status[original + i] = Status::Idle;
        }

        self.buffer_cursor.store(0, Ordering::Relaxed);
        self.n_used = original + n_add;
        self.allocate_buffer();
        trace!(added = n_add, total = self.n_used, "合并分裂缓冲区");
    }

    // ------------------------------------------------------------------
    // 压实
    // ------------------------------------------------------------------

    /// 移除恰好 `to_remove` 个失活（非 Idle）粒子
    ///
    /// 流压实：前段遇到的失活行与尾部仍存活的行对调，种群规模
    /// 精确减少 `to_remove`。`to_remove == n_used` 时清空；
    /// `to_remove > n_used` 为契约违反（所有构建下硬错误）。
    pub fn clean_dead(&mut self, to_remove: usize) -> BmcResult<()> {
        if to_remove == 0 {
            return Ok(());
        }
        if to_remove > self.n_used {
            return Err(BmcError::contract(format!(
                "clean_dead: 不能移除超过现有数量的粒子 ({to_remove} > {})",
                self.n_used
            )));
        }
        if to_remove == self.n_used {
            self.n_used = 0;
            return Ok(());
        }

        let new_used = self.n_used - to_remove;
        let mut tail = self.n_used;

        for left in 0..new_used {
            if self.status[left] == Status::Idle {
                continue;
            }
            // 从尾部找一个存活行换入
            loop {
                tail -= 1;
                debug_assert!(tail >= new_used, "失活计数与状态数组不一致");
                if self.status[tail] == Status::Idle {
                    break;
                }
            }
            let src = tail * M::N_VAR;
            let dst = left * M::N_VAR;
            self.model.copy_within(src..src + M::N_VAR, dst);
            self.position[left] = self.position[tail];
            self.status[left] = Status::Idle;
            self.status[tail] = Status::Dead;
        }

        self.n_used = new_used;

        // 步间低利用率收缩
        if (self.n_used as f64) / (self.n_allocated as f64) <= SHRINK_UTILIZATION {
            self.shrink(self.n_used * 2);
        }
        Ok(())
    }

    /// 批量压实：累计失活计数，越过阈值时触发一次压实
    ///
    /// `threshold` 为种群分数（有 [`MIN_CLEAN_BATCH`] 下限），
    /// 用于摊销压实成本。返回本次实际移除数量。
    pub fn update_and_clean_dead(
        &mut self,
        newly_inactive: usize,
        threshold: f64,
    ) -> BmcResult<usize> {
        self.inactive_counter += newly_inactive;
        let trigger = ((threshold * self.n_used as f64) as usize).max(MIN_CLEAN_BATCH);
        if self.inactive_counter < trigger {
            return Ok(0);
        }
        let removed = self.inactive_counter;
        self.clean_dead(removed)?;
        self.inactive_counter = 0;
        Ok(removed)
    }

    /// 强制压实所有已累计的失活粒子（运行结束时调用）
    pub fn flush_inactive(&mut self) -> BmcResult<usize> {
        let removed = self.inactive_counter;
        if removed > 0 {
            self.clean_dead(removed)?;
            self.inactive_counter = 0;
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // 分配
    // ------------------------------------------------------------------

    /// 按几何因子增长主存储以容纳 `new_size` 个粒子
    ///
    /// 扫描中途绝不调用。
    fn allocate(&mut self, new_size: usize) {
        if new_size == 0 || new_size < self.n_allocated {
            return;
        }
        let new_allocated = (new_size as f64 * self.allocation_factor).ceil() as usize;
        self.n_allocated = new_allocated;
        self.model.resize(new_allocated * M::N_VAR, 0.0);
        self.position.resize(new_allocated, 0);
        self.status.resize(new_allocated, Status::Idle);
        debug_assert!(self.n_used <= self.n_allocated);
    }

    /// 收缩主存储（仅步间低利用率时）
    fn shrink(&mut self, new_size: usize) {
        if new_size == 0 || new_size <= self.n_used {
            return;
        }
        let new_allocated = (new_size as f64 * self.allocation_factor).ceil() as usize;
        if new_allocated >= self.n_allocated {
            return;
        }
        self.n_allocated = new_allocated;
        self.model.truncate(new_allocated * M::N_VAR);
        self.position.truncate(new_allocated);
        self.status.truncate(new_allocated);
    }

    /// 让缓冲区容量跟踪 `BUFFER_RATIO × n_allocated`
    ///
    /// 重建而非保留内容：合并之后缓冲区数据已无用。
    fn allocate_buffer(&mut self) {
        let current = self.buffer_position.len();
        if (current as f64) / (self.n_allocated as f64) < BUFFER_RATIO {
            let buffer_size = (self.n_allocated as f64 * BUFFER_RATIO).ceil() as usize;
            self.buffer_model = (0..buffer_size * M::N_VAR)
                .map(|_| AtomicU64::new(0))
                .collect();
            self.buffer_position = (0..buffer_size).map(|_| AtomicUsize::new(0)).collect();
            self.buffer_cursor.store(0, Ordering::Relaxed);
        }
    }
}
