//! 渲染上下文
//!
//! 应用每帧通过 `RenderContext` 录制命令。它可变借用设备的后端、描述符堆、
//! 临时分配器和延迟释放队列，生命周期不会超过设备本身。

use std::collections::HashMap;

use super::allocator::{ResourceAllocator, TransientAllocation};
use super::command::CommandEncoder;
use super::deferred::DeferredReleaseQueue;
use super::descriptor::{DescriptorHeapKind, DescriptorHeaps, DescriptorRange, DescriptorSlotHeap};
use super::frame::FrameTarget;
use super::resource::{ResourceId, ResourceState};
use crate::core::error::{DeviceError, Result};
use crate::gfx::backend::GraphicsBackend;

/// 资源状态跟踪器
///
/// 记录每个资源在命令列表末尾的状态，用于生成屏障的 before 状态。
/// 同时保留最近一次提交时的状态，命令列表被丢弃时回退到它。
#[derive(Debug, Default)]
pub struct ResourceStateTracker {
    states: HashMap<ResourceId, ResourceState>,
    committed: HashMap<ResourceId, ResourceState>,
}

impl ResourceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记资源的初始状态
    pub fn register(&mut self, id: ResourceId, state: ResourceState) {
        self.states.insert(id, state);
        self.committed.insert(id, state);
    }

    /// 移除资源
    pub fn forget(&mut self, id: ResourceId) {
        self.states.remove(&id);
        self.committed.remove(&id);
    }

    /// 命令列表已提交，当前状态成为 GPU 上的真实状态
    pub fn commit(&mut self) {
        self.committed.clone_from(&self.states);
    }

    /// 命令列表被丢弃，回到最近一次提交时的状态
    pub fn rollback(&mut self) {
        self.states.clone_from(&self.committed);
    }

    /// 当前状态
    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        self.states.get(&id).copied()
    }

    /// 把资源转换到 `after`
    ///
    /// 返回转换前的状态；已经处于 `after` 时返回 `None`，不需要屏障。
    pub fn transition(&mut self, id: ResourceId, after: ResourceState) -> Result<Option<ResourceState>> {
        let current = self
            .states
            .get_mut(&id)
            .ok_or_else(|| DeviceError::InvalidArgument(format!("Resource {} is not tracked", id)))?;

        if *current == after {
            return Ok(None);
        }
        let before = *current;
        *current = after;
        Ok(Some(before))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// 录制资源屏障，已处于目标状态时不录制
pub(crate) fn transition_resource<B: GraphicsBackend>(
    backend: &mut B,
    encoder: &mut CommandEncoder,
    states: &mut ResourceStateTracker,
    id: ResourceId,
    after: ResourceState,
) -> Result<()> {
    encoder.ensure_recording()?;
    if let Some(before) = states.transition(id, after)? {
        backend.resource_barrier(id, before, after)?;
        encoder.record()?;
    }
    Ok(())
}

/// 每帧的渲染上下文
pub struct RenderContext<'a, B: GraphicsBackend> {
    backend: &'a mut B,
    heaps: &'a mut DescriptorHeaps,
    allocator: &'a mut ResourceAllocator,
    deferred: &'a mut DeferredReleaseQueue,
    encoder: &'a mut CommandEncoder,
    states: &'a mut ResourceStateTracker,
    target: &'a FrameTarget,
    frame_fence_value: u64,
}

impl<'a, B: GraphicsBackend> RenderContext<'a, B> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        backend: &'a mut B,
        heaps: &'a mut DescriptorHeaps,
        allocator: &'a mut ResourceAllocator,
        deferred: &'a mut DeferredReleaseQueue,
        encoder: &'a mut CommandEncoder,
        states: &'a mut ResourceStateTracker,
        target: &'a FrameTarget,
        frame_fence_value: u64,
    ) -> Self {
        Self {
            backend,
            heaps,
            allocator,
            deferred,
            encoder,
            states,
            target,
            frame_fence_value,
        }
    }

    /// 当前帧目标
    pub fn target(&self) -> &'a FrameTarget {
        self.target
    }

    /// 本帧提交后将要 signal 的 fence 值
    pub fn frame_fence_value(&self) -> u64 {
        self.frame_fence_value
    }

    /// 把资源转换到指定状态
    pub fn resource_barrier(&mut self, resource: ResourceId, state: ResourceState) -> Result<()> {
        transition_resource(self.backend, self.encoder, self.states, resource, state)
    }

    /// 清除帧目标的颜色缓冲区
    pub fn clear_color(&mut self, target: &FrameTarget, color: [f32; 4]) -> Result<()> {
        let (texture, rtv) = match (target.color(), target.rtv_slot()) {
            (Some(texture), Some(rtv)) => (*texture, rtv),
            _ => return Err(detached(target)),
        };

        self.resource_barrier(texture.id, ResourceState::RenderTarget)?;
        let handle = self.heaps.get(DescriptorHeapKind::RenderTarget).cpu_handle(rtv)?;
        self.backend.clear_render_target_view(handle, color)?;
        self.encoder.record()
    }

    /// 清除帧目标的深度模板缓冲区
    pub fn clear_depth(&mut self, target: &FrameTarget, depth: f32, stencil: u8) -> Result<()> {
        let (texture, dsv) = match (target.depth(), target.dsv_slot()) {
            (Some(texture), Some(dsv)) => (*texture, dsv),
            _ => return Err(detached(target)),
        };

        self.resource_barrier(texture.id, ResourceState::DepthWrite)?;
        let handle = self.heaps.get(DescriptorHeapKind::DepthStencil).cpu_handle(dsv)?;
        self.backend.clear_depth_stencil_view(handle, depth, stencil)?;
        self.encoder.record()
    }

    /// 分配一个描述符槽位
    pub fn allocate_descriptor(&mut self, kind: DescriptorHeapKind) -> Result<u32> {
        self.heaps.get_mut(kind).allocate()
    }

    /// 分配一段连续的描述符槽位
    pub fn allocate_descriptor_range(&mut self, kind: DescriptorHeapKind, count: u32) -> Result<DescriptorRange> {
        self.heaps.get_mut(kind).allocate_range(count)
    }

    /// 释放描述符槽位
    ///
    /// 本帧可能已经引用了该槽位，所以要等本帧在 GPU 上完成后才归还给堆。
    pub fn release_descriptor(&mut self, kind: DescriptorHeapKind, index: u32) -> Result<()> {
        self.deferred.defer_slot(&*self.heaps, self.frame_fence_value, kind, index)
    }

    /// 释放一段连续的描述符槽位（延迟）
    pub fn release_descriptor_range(&mut self, range: DescriptorRange) -> Result<()> {
        self.deferred.defer_range(&*self.heaps, self.frame_fence_value, range)
    }

    /// 分配临时上传内存
    pub fn reserve_transient(&mut self, size: u64, alignment: u64) -> Result<TransientAllocation> {
        self.allocator.reserve(size, alignment)
    }

    /// 获取描述符堆
    pub fn heap(&self, kind: DescriptorHeapKind) -> &DescriptorSlotHeap {
        self.heaps.get(kind)
    }

    /// 后端的只读视图，用于取得原生对象（如 D3D12 命令列表）
    ///
    /// 提交、重置和资源释放只能经由设备进行。
    pub fn backend(&self) -> &B {
        &*self.backend
    }
}

fn detached(target: &FrameTarget) -> DeviceError {
    DeviceError::InvalidArgument(format!("Frame target {} has no attached buffers", target.index()))
}
