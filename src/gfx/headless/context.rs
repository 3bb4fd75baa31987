//! 模拟 GPU 的共享状态
//!
//! `HeadlessGpu` 是一个可克隆的句柄。后端、fence 和测试代码持有同一份状态：
//! 后端往里面写入执行过的命令和 fence signal，测试代码决定 GPU 什么时候"完成"工作，
//! 并可以注入各种失败。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::core::error::Result;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapKind};
use crate::renderer::resource::{ResourceId, ResourceState};
use crate::renderer::sync::FencePrimitive;

/// 模拟 GPU 执行过的命令
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Barrier {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    ClearRenderTarget {
        handle: CpuDescriptorHandle,
        color: [f32; 4],
    },
    ClearDepthStencil {
        handle: CpuDescriptorHandle,
        depth: f32,
        stencil: u8,
    },
    SetDescriptorHeaps(Vec<DescriptorHeapKind>),
    /// 队列上的一次命令列表执行
    Execute,
    /// 队列上的 fence signal
    Signal(u64),
    Present {
        back_buffer: u32,
        sync_interval: u32,
    },
}

/// 模拟资源的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    BackBuffer,
    Texture,
    UploadBuffer,
}

#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub adapter: bool,
    pub swap_chain: bool,
    pub heap: Option<DescriptorHeapKind>,
    pub next_submit: bool,
}

#[derive(Debug)]
pub(crate) struct GpuState {
    pub completed: u64,
    pub last_signaled: u64,
    pub auto_complete: bool,
    pub occluded: bool,
    pub faults: Faults,
    pub devices_created: u32,
    pub executed: Vec<RecordedCommand>,
    pub test_presents: u32,
    pub resources: HashMap<ResourceId, ResourceKind>,
    pub next_resource: u64,
}

impl GpuState {
    pub fn allocate_resource(&mut self, kind: ResourceKind) -> ResourceId {
        self.next_resource += 1;
        let id = ResourceId(self.next_resource);
        self.resources.insert(id, kind);
        id
    }
}

struct Shared {
    state: Mutex<GpuState>,
    completion: Condvar,
}

/// 模拟 GPU 句柄
#[derive(Clone)]
pub struct HeadlessGpu {
    shared: Arc<Shared>,
}

impl HeadlessGpu {
    /// 创建模拟 GPU，默认每次 signal 立即完成
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GpuState {
                    completed: 0,
                    last_signaled: 0,
                    auto_complete: true,
                    occluded: false,
                    faults: Faults::default(),
                    devices_created: 0,
                    executed: Vec::new(),
                    test_presents: 0,
                    resources: HashMap::new(),
                    next_resource: 0,
                }),
                completion: Condvar::new(),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GpuState> {
        self.shared.state.lock()
    }

    /// signal 时是否立即完成
    pub fn set_auto_complete(&self, enabled: bool) {
        self.lock().auto_complete = enabled;
    }

    /// 完成到 `value` 为止的工作
    ///
    /// 不会超过已经 signal 的最大值。
    pub fn complete(&self, value: u64) {
        let mut state = self.lock();
        let target = value.min(state.last_signaled);
        if target > state.completed {
            state.completed = target;
            self.shared.completion.notify_all();
        }
    }

    /// 完成所有已 signal 的工作
    pub fn complete_all(&self) {
        let last = self.lock().last_signaled;
        self.complete(last);
    }

    pub fn completed_value(&self) -> u64 {
        self.lock().completed
    }

    /// 最近一次 signal 的值
    pub fn last_signaled(&self) -> u64 {
        self.lock().last_signaled
    }

    /// 模拟窗口被遮挡
    pub fn set_occluded(&self, occluded: bool) {
        self.lock().occluded = occluded;
    }

    pub fn fail_adapter_selection(&self, fail: bool) {
        self.lock().faults.adapter = fail;
    }

    pub fn fail_swap_chain_creation(&self, fail: bool) {
        self.lock().faults.swap_chain = fail;
    }

    pub fn fail_heap_creation(&self, kind: Option<DescriptorHeapKind>) {
        self.lock().faults.heap = kind;
    }

    /// 下一次执行命令列表失败
    pub fn fail_next_submit(&self) {
        self.lock().faults.next_submit = true;
    }

    /// 在此 GPU 上成功创建的后端数量
    pub fn devices_created(&self) -> u32 {
        self.lock().devices_created
    }

    /// 按执行顺序排列的命令
    pub fn executed_commands(&self) -> Vec<RecordedCommand> {
        self.lock().executed.clone()
    }

    pub fn test_present_count(&self) -> u32 {
        self.lock().test_presents
    }

    pub fn is_resource_alive(&self, id: ResourceId) -> bool {
        self.lock().resources.contains_key(&id)
    }

    pub fn live_resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    pub(crate) fn record_signal(&self, value: u64) {
        let mut state = self.lock();
        state.last_signaled = state.last_signaled.max(value);
        state.executed.push(RecordedCommand::Signal(value));
        if state.auto_complete && value > state.completed {
            state.completed = value;
            self.shared.completion.notify_all();
        }
    }
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new()
    }
}

/// 模拟 GPU 的 fence
pub struct HeadlessFence {
    gpu: HeadlessGpu,
}

impl HeadlessFence {
    pub(crate) fn new(gpu: HeadlessGpu) -> Self {
        Self { gpu }
    }
}

impl FencePrimitive for HeadlessFence {
    fn completed_value(&self) -> u64 {
        self.gpu.completed_value()
    }

    fn wait_until_at_least(&self, value: u64) -> Result<()> {
        let shared = &self.gpu.shared;
        let mut state = shared.state.lock();
        while state.completed < value {
            shared.completion.wait(&mut state);
        }
        Ok(())
    }
}
