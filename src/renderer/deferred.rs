//! 延迟释放队列
//!
//! 应用释放的描述符槽位和原生资源可能仍被 GPU 上未完成的帧引用。
//! 它们先带着 fence 值进入队列，等 fence 完成值追上后才真正归还给堆或后端。

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::descriptor::{DescriptorHeapKind, DescriptorHeaps, DescriptorRange};
use super::resource::ResourceId;
use crate::core::error::{DescriptorError, Result};
use crate::gfx::backend::GraphicsBackend;

/// 等待释放的对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// 单个描述符槽位
    Slot { kind: DescriptorHeapKind, index: u32 },
    /// 一段连续的描述符槽位
    Range(DescriptorRange),
    /// 原生资源
    Resource(ResourceId),
}

impl Pending {
    /// 是否覆盖指定的描述符槽位
    fn covers_slot(&self, slot_kind: DescriptorHeapKind, slot: u32) -> bool {
        match *self {
            Pending::Slot { kind, index } => kind == slot_kind && index == slot,
            Pending::Range(range) => range.kind == slot_kind && range.indices().contains(&slot),
            Pending::Resource(_) => false,
        }
    }
}

/// 延迟释放队列
///
/// fence 值单调递增，所以队列按 fence 值有序，回收时只需检查队首。
#[derive(Debug, Default)]
pub struct DeferredReleaseQueue {
    entries: VecDeque<(u64, Pending)>,
}

impl DeferredReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入队列
    ///
    /// # 参数
    ///
    /// * `fence_value` - 最后一个可能引用该对象的帧的 fence 值
    /// * `pending` - 等待释放的对象
    pub fn push(&mut self, fence_value: u64, pending: Pending) {
        debug_assert!(self.entries.back().map_or(true, |(v, _)| *v <= fence_value));
        self.entries.push_back((fence_value, pending));
    }

    /// 延迟释放一个描述符槽位
    ///
    /// 槽位必须已分配且尚未在队列中，否则返回 `DescriptorError::NotAllocated`。
    pub fn defer_slot(
        &mut self,
        heaps: &DescriptorHeaps,
        fence_value: u64,
        kind: DescriptorHeapKind,
        index: u32,
    ) -> Result<()> {
        if !heaps.get(kind).is_live(index) || self.contains_slot(kind, index) {
            return Err(DescriptorError::NotAllocated { kind, index }.into());
        }
        self.push(fence_value, Pending::Slot { kind, index });
        Ok(())
    }

    /// 延迟释放一段连续的描述符槽位
    pub fn defer_range(
        &mut self,
        heaps: &DescriptorHeaps,
        fence_value: u64,
        range: DescriptorRange,
    ) -> Result<()> {
        heaps.get(range.kind).check_range(&range)?;
        if let Some(index) = range.indices().find(|&index| self.contains_slot(range.kind, index)) {
            return Err(DescriptorError::NotAllocated { kind: range.kind, index }.into());
        }
        self.push(fence_value, Pending::Range(range));
        Ok(())
    }

    /// 描述符槽位是否已经在等待释放
    pub fn contains_slot(&self, kind: DescriptorHeapKind, index: u32) -> bool {
        self.entries.iter().any(|(_, pending)| pending.covers_slot(kind, index))
    }

    /// 原生资源是否已经在等待释放
    pub fn contains_resource(&self, id: ResourceId) -> bool {
        self.entries
            .iter()
            .any(|(_, pending)| *pending == Pending::Resource(id))
    }

    /// 释放所有 fence 值不大于 `completed` 的对象
    ///
    /// 按加入顺序释放，返回释放的数量。
    pub fn collect<B: GraphicsBackend>(
        &mut self,
        completed: u64,
        heaps: &mut DescriptorHeaps,
        backend: &mut B,
    ) -> usize {
        let mut released = 0;
        while let Some(&(fence_value, pending)) = self.entries.front() {
            if fence_value > completed {
                break;
            }
            self.entries.pop_front();

            let result = match pending {
                Pending::Slot { kind, index } => heaps.get_mut(kind).release(index),
                Pending::Range(range) => heaps.get_mut(range.kind).release_range(range),
                Pending::Resource(id) => {
                    backend.release_resource(id);
                    Ok(())
                }
            };

            match result {
                Ok(()) => released += 1,
                Err(e) => warn!(fence_value, ?pending, error = %e, "Deferred release failed"),
            }
        }

        if released > 0 {
            debug!(released, completed, remaining = self.entries.len(), "Deferred releases collected");
        }
        released
    }

    /// 最早的等待项的 fence 值
    pub fn oldest_fence_value(&self) -> Option<u64> {
        self.entries.front().map(|(value, _)| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
