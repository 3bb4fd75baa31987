//! 描述符管理模块
//!
//! 提供固定容量的描述符槽位堆，用于管理 GPU 资源视图。
//! 每个堆只保存一种描述符，容量在创建时确定，之后不再增长。
//!
//! # 分配策略
//!
//! - 单个槽位：优先从回收队列（FIFO）头部取出，否则推进高水位游标
//! - 连续区间：只从高水位游标处分配（回收队列无法保证连续性）
//! - 释放：立即把槽位放回回收队列。本模块不知道 GPU 是否还在使用该槽位，
//!   需要 GPU 安全时应通过设备的延迟释放（见 `renderer::deferred`）
//!
//! # DirectX 12 描述符类型
//!
//! - **SRV/CBV/UAV**：着色资源视图，着色器可见
//! - **Sampler**：采样器，着色器可见
//! - **RTV** (Render Target View)：渲染目标视图，仅 CPU 可见
//! - **DSV** (Depth Stencil View)：深度模板视图，仅 CPU 可见

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::{DescriptorError, Result};

/// 描述符堆类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// 着色资源视图 (SRV/CBV/UAV)
    ShaderResource,
    /// 采样器
    Sampler,
    /// 渲染目标视图 (RTV)
    RenderTarget,
    /// 深度模板视图 (DSV)
    DepthStencil,
}

impl DescriptorHeapKind {
    /// 所有堆类型，按设备创建顺序排列
    pub const ALL: [DescriptorHeapKind; 4] = [
        DescriptorHeapKind::ShaderResource,
        DescriptorHeapKind::Sampler,
        DescriptorHeapKind::RenderTarget,
        DescriptorHeapKind::DepthStencil,
    ];

    /// 该类型的堆是否需要着色器可见
    pub fn is_shader_visible(&self) -> bool {
        matches!(self, DescriptorHeapKind::ShaderResource | DescriptorHeapKind::Sampler)
    }

    /// 获取描述符类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorHeapKind::ShaderResource => "SRV",
            DescriptorHeapKind::Sampler => "Sampler",
            DescriptorHeapKind::RenderTarget => "RTV",
            DescriptorHeapKind::DepthStencil => "DSV",
        }
    }
}

impl fmt::Display for DescriptorHeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 四种描述符堆的容量配置（对应配置文件的 `[heaps]` 段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapCapacities {
    #[serde(default = "default_srv_capacity")]
    pub shader_resource: u32,
    #[serde(default = "default_sampler_capacity")]
    pub sampler: u32,
    #[serde(default = "default_rtv_capacity")]
    pub render_target: u32,
    #[serde(default = "default_dsv_capacity")]
    pub depth_stencil: u32,
}

fn default_srv_capacity() -> u32 { 16 * 1024 }
fn default_sampler_capacity() -> u32 { 2 * 1024 }
fn default_rtv_capacity() -> u32 { 1024 }
fn default_dsv_capacity() -> u32 { 1024 }

impl Default for HeapCapacities {
    fn default() -> Self {
        Self {
            shader_resource: default_srv_capacity(),
            sampler: default_sampler_capacity(),
            render_target: default_rtv_capacity(),
            depth_stencil: default_dsv_capacity(),
        }
    }
}

impl HeapCapacities {
    /// 获取指定类型的容量
    pub fn get(&self, kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::ShaderResource => self.shader_resource,
            DescriptorHeapKind::Sampler => self.sampler,
            DescriptorHeapKind::RenderTarget => self.render_target,
            DescriptorHeapKind::DepthStencil => self.depth_stencil,
        }
    }

    /// 第一个容量为 0 的堆类型
    pub fn first_empty(&self) -> Option<DescriptorHeapKind> {
        DescriptorHeapKind::ALL.into_iter().find(|kind| self.get(*kind) == 0)
    }
}

/// 原生描述符堆的地址布局
///
/// 由后端在创建原生堆之后返回，堆本身只做地址运算。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapLayout {
    /// CPU 句柄基地址
    pub cpu_start: usize,
    /// GPU 句柄基地址（仅着色器可见的堆）
    pub gpu_start: Option<u64>,
    /// 描述符增量大小
    pub stride: u32,
}

/// 描述符句柄（CPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
    /// 描述符索引
    pub index: u32,
}

impl CpuDescriptorHandle {
    /// 创建新的 CPU 描述符句柄
    pub fn new(ptr: usize, index: u32) -> Self {
        Self { ptr, index }
    }

    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as usize * increment_size as usize,
            index: self.index + count,
        }
    }
}

/// 描述符句柄（GPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: u64,
    /// 描述符索引
    pub index: u32,
}

impl GpuDescriptorHandle {
    /// 创建新的 GPU 描述符句柄
    pub fn new(ptr: u64, index: u32) -> Self {
        Self { ptr, index }
    }

    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as u64 * increment_size as u64,
            index: self.index + count,
        }
    }
}

/// 一段连续的描述符槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    /// 所属堆类型
    pub kind: DescriptorHeapKind,
    /// 起始索引
    pub start: u32,
    /// 槽位数量
    pub count: u32,
}

impl DescriptorRange {
    /// 区间末尾（不含），超出 `u32` 时返回 `None`
    pub fn end(&self) -> Option<u32> {
        self.start.checked_add(self.count)
    }

    /// 区间内的所有索引
    pub fn indices(&self) -> std::ops::Range<u32> {
        self.start..self.start.saturating_add(self.count)
    }
}

/// 描述符堆统计信息
#[derive(Debug, Clone)]
pub struct DescriptorHeapStats {
    /// 堆类型
    pub kind: DescriptorHeapKind,
    /// 总容量
    pub capacity: u32,
    /// 已使用数量
    pub used: u32,
    /// 可用数量
    pub available: u32,
    /// 使用率 (0.0 - 1.0)
    pub usage_ratio: f32,
}

impl DescriptorHeapStats {
    /// 创建新的统计信息
    pub fn new(kind: DescriptorHeapKind, capacity: u32, used: u32) -> Self {
        let available = capacity.saturating_sub(used);
        let usage_ratio = if capacity > 0 {
            used as f32 / capacity as f32
        } else {
            0.0
        };

        Self {
            kind,
            capacity,
            used,
            available,
            usage_ratio,
        }
    }
}

/// 描述符槽位堆
///
/// 固定容量的槽位池。已分配的槽位数永远不超过容量，
/// 同一个槽位在被释放之前不会被第二次分配。
#[derive(Debug)]
pub struct DescriptorSlotHeap {
    kind: DescriptorHeapKind,
    capacity: u32,
    shader_visible: bool,
    layout: DescriptorHeapLayout,
    /// 高水位游标：[0, high_water) 之间的槽位至少被分配过一次
    high_water: u32,
    /// 回收队列，按释放顺序复用
    reclaim: VecDeque<u32>,
    /// 每个已初始化槽位的占用标记
    live: Vec<bool>,
    live_count: u32,
}

impl DescriptorSlotHeap {
    /// 创建新的描述符槽位堆
    ///
    /// # 参数
    ///
    /// * `kind` - 堆类型
    /// * `capacity` - 槽位数量，必须大于 0
    /// * `shader_visible` - 是否着色器可见
    /// * `layout` - 后端创建原生堆后返回的地址布局
    pub fn new(
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
        layout: DescriptorHeapLayout,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(DescriptorError::InvalidCapacity { kind }.into());
        }

        Ok(Self {
            kind,
            capacity,
            shader_visible,
            layout,
            high_water: 0,
            reclaim: VecDeque::new(),
            live: Vec::new(),
            live_count: 0,
        })
    }

    /// 分配一个槽位
    ///
    /// 回收队列非空时返回最早释放的槽位，否则推进高水位游标。
    /// 堆已满时返回 `DescriptorError::OutOfSlots`。
    pub fn allocate(&mut self) -> Result<u32> {
        if let Some(index) = self.reclaim.pop_front() {
            self.live[index as usize] = true;
            self.live_count += 1;
            return Ok(index);
        }

        if self.high_water >= self.capacity {
            return Err(self.out_of_slots());
        }

        let index = self.high_water;
        self.high_water += 1;
        self.live.push(true);
        self.live_count += 1;
        Ok(index)
    }

    /// 分配一段连续的槽位
    ///
    /// 只从高水位游标处分配，不使用回收队列。
    pub fn allocate_range(&mut self, count: u32) -> Result<DescriptorRange> {
        if count == 0 {
            return Err(DescriptorError::InvalidRange {
                kind: self.kind,
                reason: "count must be greater than 0".to_string(),
            }
            .into());
        }

        let end = self.high_water.checked_add(count).filter(|end| *end <= self.capacity);
        let Some(end) = end else {
            return Err(self.out_of_slots());
        };

        let start = self.high_water;
        self.high_water = end;
        self.live.resize(end as usize, true);
        self.live_count += count;

        Ok(DescriptorRange {
            kind: self.kind,
            start,
            count,
        })
    }

    /// 释放一个槽位
    ///
    /// 槽位立即进入回收队列，调用者负责保证 GPU 不再引用它。
    pub fn release(&mut self, index: u32) -> Result<()> {
        self.check_live(index)?;
        self.live[index as usize] = false;
        self.live_count -= 1;
        self.reclaim.push_back(index);
        Ok(())
    }

    /// 释放一段连续的槽位
    ///
    /// 先检查整个区间，任一槽位无效时不释放任何槽位。
    pub fn release_range(&mut self, range: DescriptorRange) -> Result<()> {
        self.check_range(&range)?;
        for index in range.indices() {
            self.release(index)?;
        }
        Ok(())
    }

    /// 检查区间属于本堆、位于高水位以内且每个槽位都已分配
    pub fn check_range(&self, range: &DescriptorRange) -> Result<()> {
        let invalid = |reason: String| -> crate::core::error::DeviceError {
            DescriptorError::InvalidRange { kind: self.kind, reason }.into()
        };

        if range.kind != self.kind {
            return Err(invalid(format!("range belongs to the {} heap", range.kind)));
        }
        if range.count == 0 {
            return Err(invalid("count must be greater than 0".to_string()));
        }
        match range.end() {
            Some(end) if end <= self.high_water => {}
            _ => {
                return Err(invalid(format!(
                    "slots {}+{} exceed high water {}",
                    range.start, range.count, self.high_water
                )))
            }
        }

        for index in range.indices() {
            self.check_live(index)?;
        }
        Ok(())
    }

    /// 计算槽位的 CPU 句柄
    pub fn cpu_handle(&self, index: u32) -> Result<CpuDescriptorHandle> {
        self.check_initialized(index)?;
        Ok(CpuDescriptorHandle::new(self.layout.cpu_start, 0).offset(index, self.layout.stride))
    }

    /// 计算槽位的 GPU 句柄
    ///
    /// 只有着色器可见的堆才有 GPU 句柄。
    pub fn gpu_handle(&self, index: u32) -> Result<GpuDescriptorHandle> {
        let gpu_start = match (self.shader_visible, self.layout.gpu_start) {
            (true, Some(start)) => start,
            _ => return Err(DescriptorError::NotShaderVisible { kind: self.kind }.into()),
        };
        self.check_initialized(index)?;
        Ok(GpuDescriptorHandle::new(gpu_start, 0).offset(index, self.layout.stride))
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    pub fn layout(&self) -> DescriptorHeapLayout {
        self.layout
    }

    /// 当前已分配的槽位数
    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// 回收队列中等待复用的槽位数
    pub fn reclaimable(&self) -> usize {
        self.reclaim.len()
    }

    /// 槽位当前是否已分配
    pub fn is_live(&self, index: u32) -> bool {
        self.live.get(index as usize).copied().unwrap_or(false)
    }

    /// 获取统计信息
    pub fn stats(&self) -> DescriptorHeapStats {
        DescriptorHeapStats::new(self.kind, self.capacity, self.live_count)
    }

    fn check_initialized(&self, index: u32) -> Result<()> {
        if index >= self.high_water {
            return Err(DescriptorError::InvalidSlot {
                kind: self.kind,
                index,
                high_water: self.high_water,
            }
            .into());
        }
        Ok(())
    }

    fn check_live(&self, index: u32) -> Result<()> {
        self.check_initialized(index)?;
        if !self.live[index as usize] {
            return Err(DescriptorError::NotAllocated { kind: self.kind, index }.into());
        }
        Ok(())
    }

    fn out_of_slots(&self) -> crate::core::error::DeviceError {
        DescriptorError::OutOfSlots {
            kind: self.kind,
            capacity: self.capacity,
        }
        .into()
    }
}

/// 描述符堆集合
///
/// 设备拥有的四个槽位堆，按类型访问。
#[derive(Debug)]
pub struct DescriptorHeaps {
    shader_resource: DescriptorSlotHeap,
    sampler: DescriptorSlotHeap,
    render_target: DescriptorSlotHeap,
    depth_stencil: DescriptorSlotHeap,
}

impl DescriptorHeaps {
    /// 由四个已创建的堆组成集合
    ///
    /// 每个堆的类型必须与其位置一致。
    pub fn new(
        shader_resource: DescriptorSlotHeap,
        sampler: DescriptorSlotHeap,
        render_target: DescriptorSlotHeap,
        depth_stencil: DescriptorSlotHeap,
    ) -> Result<Self> {
        let heaps = Self {
            shader_resource,
            sampler,
            render_target,
            depth_stencil,
        };

        for kind in DescriptorHeapKind::ALL {
            let actual = heaps.get(kind).kind();
            if actual != kind {
                return Err(DescriptorError::InvalidRange {
                    kind,
                    reason: format!("expected a {} heap, got a {} heap", kind, actual),
                }
                .into());
            }
        }
        Ok(heaps)
    }

    /// 获取指定类型的堆
    pub fn get(&self, kind: DescriptorHeapKind) -> &DescriptorSlotHeap {
        match kind {
            DescriptorHeapKind::ShaderResource => &self.shader_resource,
            DescriptorHeapKind::Sampler => &self.sampler,
            DescriptorHeapKind::RenderTarget => &self.render_target,
            DescriptorHeapKind::DepthStencil => &self.depth_stencil,
        }
    }

    /// 获取指定类型的堆（可变）
    pub fn get_mut(&mut self, kind: DescriptorHeapKind) -> &mut DescriptorSlotHeap {
        match kind {
            DescriptorHeapKind::ShaderResource => &mut self.shader_resource,
            DescriptorHeapKind::Sampler => &mut self.sampler,
            DescriptorHeapKind::RenderTarget => &mut self.render_target,
            DescriptorHeapKind::DepthStencil => &mut self.depth_stencil,
        }
    }

    /// 同时借用 RTV 和 DSV 堆（帧目标重建时使用）
    pub fn render_target_views_mut(&mut self) -> (&mut DescriptorSlotHeap, &mut DescriptorSlotHeap) {
        (&mut self.render_target, &mut self.depth_stencil)
    }

    /// 着色器可见的堆类型（绑定到命令列表时使用）
    pub fn shader_visible_kinds(&self) -> Vec<DescriptorHeapKind> {
        DescriptorHeapKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_shader_visible())
            .collect()
    }

    /// 获取所有统计信息
    pub fn all_stats(&self) -> Vec<DescriptorHeapStats> {
        DescriptorHeapKind::ALL
            .into_iter()
            .map(|kind| self.get(kind).stats())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DeviceError;

    fn layout() -> DescriptorHeapLayout {
        DescriptorHeapLayout {
            cpu_start: 1000,
            gpu_start: Some(2000),
            stride: 32,
        }
    }

    fn heap(capacity: u32) -> DescriptorSlotHeap {
        DescriptorSlotHeap::new(DescriptorHeapKind::ShaderResource, capacity, true, layout()).unwrap()
    }

    fn is_out_of_slots(result: Result<u32>) -> bool {
        matches!(
            result,
            Err(DeviceError::Descriptor(DescriptorError::OutOfSlots { .. }))
        )
    }

    #[test]
    fn test_heap_kind() {
        assert!(DescriptorHeapKind::ShaderResource.is_shader_visible());
        assert!(!DescriptorHeapKind::RenderTarget.is_shader_visible());
        assert_eq!(DescriptorHeapKind::RenderTarget.to_string(), "RTV");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = DescriptorSlotHeap::new(DescriptorHeapKind::Sampler, 0, true, layout());
        assert!(matches!(
            result,
            Err(DeviceError::Descriptor(DescriptorError::InvalidCapacity { .. }))
        ));
    }

    #[test]
    fn test_capacity_four_scenario() {
        let mut heap = heap(4);
        for expected in 0..4 {
            assert_eq!(heap.allocate().unwrap(), expected);
        }

        heap.release(1).unwrap();
        assert_eq!(heap.allocate().unwrap(), 1);
        assert!(is_out_of_slots(heap.allocate()));
        assert_eq!(heap.live_count(), 4);
    }

    #[test]
    fn test_reclaimed_slots_reused_in_release_order() {
        let mut heap = heap(8);
        for _ in 0..5 {
            heap.allocate().unwrap();
        }

        heap.release(3).unwrap();
        heap.release(0).unwrap();
        heap.release(4).unwrap();

        assert_eq!(heap.allocate().unwrap(), 3);
        assert_eq!(heap.allocate().unwrap(), 0);
        assert_eq!(heap.allocate().unwrap(), 4);
        // 回收队列用完后才推进游标
        assert_eq!(heap.allocate().unwrap(), 5);
    }

    #[test]
    fn test_live_count_never_exceeds_capacity() {
        let mut heap = heap(3);
        let mut failures = 0;
        for round in 0..20u32 {
            if heap.allocate().is_err() {
                failures += 1;
                heap.release(round % 3).unwrap();
            }
            assert!(heap.live_count() <= heap.capacity());
        }
        assert!(failures > 0);
    }

    #[test]
    fn test_release_errors() {
        let mut heap = heap(4);
        let index = heap.allocate().unwrap();

        // 超出高水位
        assert!(matches!(
            heap.release(2),
            Err(DeviceError::Descriptor(DescriptorError::InvalidSlot { index: 2, .. }))
        ));

        heap.release(index).unwrap();
        // 重复释放
        assert!(matches!(
            heap.release(index),
            Err(DeviceError::Descriptor(DescriptorError::NotAllocated { .. }))
        ));
        assert_eq!(heap.reclaimable(), 1);
    }

    #[test]
    fn test_handles() {
        let mut heap = heap(16);
        heap.allocate().unwrap();
        heap.allocate().unwrap();

        let cpu = heap.cpu_handle(1).unwrap();
        assert_eq!(cpu.ptr, 1032);
        assert_eq!(cpu.index, 1);

        let gpu = heap.gpu_handle(1).unwrap();
        assert_eq!(gpu.ptr, 2032);

        // 未初始化的槽位没有句柄
        assert!(heap.cpu_handle(2).is_err());
    }

    #[test]
    fn test_gpu_handle_requires_shader_visible() {
        let cpu_only = DescriptorHeapLayout {
            cpu_start: 64,
            gpu_start: None,
            stride: 8,
        };
        let mut heap =
            DescriptorSlotHeap::new(DescriptorHeapKind::RenderTarget, 4, false, cpu_only).unwrap();
        heap.allocate().unwrap();

        assert_eq!(heap.cpu_handle(0).unwrap().ptr, 64);
        assert!(matches!(
            heap.gpu_handle(0),
            Err(DeviceError::Descriptor(DescriptorError::NotShaderVisible { .. }))
        ));
    }

    #[test]
    fn test_range_allocation() {
        let mut heap = heap(8);
        heap.allocate().unwrap();
        heap.allocate().unwrap();
        heap.release(0).unwrap();

        // 区间不使用回收队列
        let range = heap.allocate_range(4).unwrap();
        assert_eq!(range.start, 2);
        assert_eq!(range.count, 4);
        assert_eq!(heap.high_water(), 6);

        assert!(heap.allocate_range(3).is_err());
        assert!(heap.allocate_range(0).is_err());

        heap.release_range(range).unwrap();
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.allocate().unwrap(), 0);
        assert_eq!(heap.allocate().unwrap(), 2);
    }

    #[test]
    fn test_release_range_is_all_or_nothing() {
        let mut heap = heap(8);
        let range = heap.allocate_range(3).unwrap();
        heap.release(1).unwrap();

        assert!(heap.release_range(range).is_err());
        assert!(heap.is_live(0));
        assert!(heap.is_live(2));
    }

    #[test]
    fn test_release_range_rejects_out_of_bounds() {
        let mut heap = heap(8);
        heap.allocate_range(2).unwrap();

        let wrapping = DescriptorRange {
            kind: DescriptorHeapKind::ShaderResource,
            start: u32::MAX - 1,
            count: 4,
        };
        assert_eq!(wrapping.end(), None);
        assert!(matches!(
            heap.release_range(wrapping),
            Err(DeviceError::Descriptor(DescriptorError::InvalidRange { .. }))
        ));

        let past_high_water = DescriptorRange {
            kind: DescriptorHeapKind::ShaderResource,
            start: 1,
            count: 2,
        };
        assert!(matches!(
            heap.release_range(past_high_water),
            Err(DeviceError::Descriptor(DescriptorError::InvalidRange { .. }))
        ));

        let empty = DescriptorRange {
            kind: DescriptorHeapKind::ShaderResource,
            start: 0,
            count: 0,
        };
        assert!(heap.release_range(empty).is_err());
        assert_eq!(heap.live_count(), 2);
    }

    #[test]
    fn test_stats() {
        let mut heap = heap(4);
        heap.allocate().unwrap();
        heap.allocate().unwrap();
        let stats = heap.stats();
        assert_eq!(stats.used, 2);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.usage_ratio, 0.5);
    }

    #[test]
    fn test_heap_set() {
        let make = |kind: DescriptorHeapKind| {
            DescriptorSlotHeap::new(kind, 4, kind.is_shader_visible(), layout()).unwrap()
        };
        let mut heaps = DescriptorHeaps::new(
            make(DescriptorHeapKind::ShaderResource),
            make(DescriptorHeapKind::Sampler),
            make(DescriptorHeapKind::RenderTarget),
            make(DescriptorHeapKind::DepthStencil),
        )
        .unwrap();

        heaps.get_mut(DescriptorHeapKind::Sampler).allocate().unwrap();
        assert_eq!(heaps.get(DescriptorHeapKind::Sampler).live_count(), 1);
        assert_eq!(heaps.get(DescriptorHeapKind::ShaderResource).live_count(), 0);
        assert_eq!(
            heaps.shader_visible_kinds(),
            vec![DescriptorHeapKind::ShaderResource, DescriptorHeapKind::Sampler]
        );
        assert_eq!(heaps.all_stats().len(), 4);

        // 位置错误的堆被拒绝
        let swapped = DescriptorHeaps::new(
            make(DescriptorHeapKind::Sampler),
            make(DescriptorHeapKind::ShaderResource),
            make(DescriptorHeapKind::RenderTarget),
            make(DescriptorHeapKind::DepthStencil),
        );
        assert!(swapped.is_err());
    }

    #[test]
    fn test_capacities() {
        let caps = HeapCapacities::default();
        assert_eq!(caps.get(DescriptorHeapKind::ShaderResource), 16384);
        assert_eq!(caps.get(DescriptorHeapKind::DepthStencil), 1024);
        assert!(caps.first_empty().is_none());
    }
}
