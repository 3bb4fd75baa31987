//! 设备模块
//!
//! `Device` 是设备核心的顶层对象，拥有后端、四个描述符堆、帧 fence、
//! 帧目标集合、临时上传内存分配器和延迟释放队列，并驱动呈现与调整大小的协议。
//!
//! # 帧循环
//!
//! ```text
//! render_context() → 录制 → present()
//!                              │ 转换到 Present 状态，关闭命令列表
//!                              │ 提交、呈现、推进环形索引
//!                              │ fence 递增并 signal
//!                              │ 新值超过 N 时等待 (新值 - N)
//!                              └ 回收临时内存和延迟释放，重置命令列表
//! ```
//!
//! # 单实例
//!
//! 同一个 `DeviceRegistry` 上同时只能存在一个设备。`Device::create` 使用进程级的注册表，
//! 测试通过 `Device::create_in` 使用各自的注册表。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info, trace, trace_span, warn};

use super::allocator::ResourceAllocator;
use super::command::CommandEncoder;
use super::context::{transition_resource, RenderContext, ResourceStateTracker};
use super::deferred::{DeferredReleaseQueue, Pending};
use super::descriptor::{DescriptorHeapKind, DescriptorHeaps, DescriptorSlotHeap, HeapCapacities};
use super::format::{FeatureLevel, ResourceFormat};
use super::frame::{FrameTarget, FrameTargetSet};
use super::resource::{ResourceId, ResourceState, Texture, TextureDesc};
use super::sync::FrameFence;
use crate::core::config::{MAX_SAMPLE_COUNT, MAX_SWAP_CHAIN_BUFFERS};
use crate::core::error::{DeviceError, Result, SetupError};
use crate::gfx::backend::{GraphicsBackend, PresentStatus, SurfaceProvider};

/// 设备创建描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDesc {
    /// 颜色缓冲区（渲染目标视图）格式
    pub color_format: ResourceFormat,
    /// 深度缓冲区格式
    pub depth_format: ResourceFormat,
    /// 请求的 API 主版本号
    pub api_major_version: u32,
    /// 请求的 API 次版本号
    pub api_minor_version: u32,
    /// 垂直同步
    pub enable_vsync: bool,
    /// 是否启用调试层
    pub enable_debug_layer: bool,
    /// 交换链缓冲区数量（环深度 N）
    pub swap_chain_buffers: u32,
    /// 帧目标的采样数，调整大小时保持不变
    pub sample_count: u32,
    /// 描述符堆容量
    pub heap_capacities: HeapCapacities,
    /// 临时上传缓冲区大小（字节）
    pub transient_allocator_bytes: u64,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            color_format: ResourceFormat::Rgba8UnormSrgb,
            depth_format: ResourceFormat::D24UnormS8,
            api_major_version: 12,
            api_minor_version: 0,
            enable_vsync: false,
            enable_debug_layer: cfg!(debug_assertions),
            swap_chain_buffers: 3,
            sample_count: 1,
            heap_capacities: HeapCapacities::default(),
            transient_allocator_bytes: 2 * 1024 * 1024,
        }
    }
}

impl DeviceDesc {
    /// 请求的特性级别
    pub fn feature_level(&self) -> Result<FeatureLevel> {
        FeatureLevel::from_version(self.api_major_version, self.api_minor_version).ok_or_else(|| {
            SetupError::UnsupportedApiVersion {
                major: self.api_major_version,
                minor: self.api_minor_version,
            }
            .into()
        })
    }
}

/// 设备注册表
///
/// 保证同一注册表上最多只有一个存活的设备。
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    live: Arc<AtomicBool>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级注册表
    pub fn global() -> &'static DeviceRegistry {
        static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DeviceRegistry::new)
    }

    /// 是否已有存活的设备
    pub fn is_occupied(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// 获取所有权租约
    fn acquire(&self) -> Result<DeviceLease> {
        self.live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SetupError::DeviceAlreadyExists)?;
        Ok(DeviceLease {
            live: Arc::clone(&self.live),
        })
    }
}

/// 设备所有权租约，析构时归还
#[derive(Debug)]
struct DeviceLease {
    live: Arc<AtomicBool>,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
    }
}

/// 设备状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// 可以开始新的一帧
    Ready,
    /// 应用正在通过渲染上下文录制
    Recording,
    /// 命令列表已提交
    Submitted,
    /// 已呈现，等待回收
    Presented,
    /// 提交失败，设备不可再用
    Lost,
    /// 正在销毁
    ShuttingDown,
}

/// 呈现结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// 帧已提交并呈现，`frame` 为该帧 signal 的 fence 值
    Presented { frame: u64 },
    /// 本帧期间调整过交换链大小，命令列表被丢弃
    Skipped,
}

/// 设备
pub struct Device<B: GraphicsBackend> {
    backend: B,
    heaps: DescriptorHeaps,
    fence: FrameFence<B::Fence>,
    targets: FrameTargetSet,
    allocator: ResourceAllocator,
    deferred: DeferredReleaseQueue,
    encoder: CommandEncoder,
    states: ResourceStateTracker,
    desc: DeviceDesc,
    sync_interval: u32,
    resize_occurred: bool,
    occluded: bool,
    frame_count: u64,
    state: DeviceState,
    // 最后析构：设备的其它部分全部释放后才允许创建新设备
    _lease: DeviceLease,
}

impl<B: GraphicsBackend> Device<B> {
    /// 在进程级注册表上创建设备
    ///
    /// # 参数
    ///
    /// * `options` - 后端特有选项
    /// * `surface` - 交换链所依附的窗口
    /// * `desc` - 设备创建描述
    ///
    /// # 返回值
    ///
    /// 已有存活设备时返回 `SetupError::DeviceAlreadyExists`，已有设备不受影响
    pub fn create(options: B::Options, surface: &dyn SurfaceProvider, desc: DeviceDesc) -> Result<Self> {
        Self::create_in(DeviceRegistry::global(), options, surface, desc)
    }

    /// 在指定注册表上创建设备
    pub fn create_in(
        registry: &DeviceRegistry,
        options: B::Options,
        surface: &dyn SurfaceProvider,
        desc: DeviceDesc,
    ) -> Result<Self> {
        let lease = registry.acquire()?;

        if !(2..=MAX_SWAP_CHAIN_BUFFERS).contains(&desc.swap_chain_buffers) {
            return Err(DeviceError::InvalidArgument(format!(
                "Swap chain buffer count {} is outside 2..={}",
                desc.swap_chain_buffers, MAX_SWAP_CHAIN_BUFFERS
            )));
        }
        if !desc.sample_count.is_power_of_two() || desc.sample_count > MAX_SAMPLE_COUNT {
            return Err(DeviceError::InvalidArgument(format!(
                "Sample count {} must be a power of two no greater than {}",
                desc.sample_count, MAX_SAMPLE_COUNT
            )));
        }
        desc.feature_level()?;

        let mut backend = B::create(options, surface, &desc).map_err(|e| {
            error!(error = %e, "Failed to create graphics backend");
            e
        })?;
        info!(
            backend = backend.backend_name(),
            feature_level = %backend.feature_level(),
            buffers = desc.swap_chain_buffers,
            "Graphics backend created"
        );

        let mut heaps = create_heaps(&mut backend, &desc.heap_capacities)?;

        let mut targets = FrameTargetSet::new(desc.swap_chain_buffers, desc.color_format, desc.depth_format)?
            .with_sample_count(desc.sample_count);
        let (width, height) = backend.swap_chain_size();
        {
            let (rtv_heap, dsv_heap) = heaps.render_target_views_mut();
            targets.build(&mut backend, rtv_heap, dsv_heap, width, height)?;
        }
        let mut states = ResourceStateTracker::new();
        register_targets(&mut states, &targets);

        let upload = backend.create_upload_buffer(desc.transient_allocator_bytes)?;
        let allocator = ResourceAllocator::new(upload, desc.transient_allocator_bytes)?;

        let fence = FrameFence::new(backend.create_fence()?);

        let mut encoder = CommandEncoder::new();
        backend.bind_descriptor_heaps(&heaps.shader_visible_kinds())?;
        encoder.record()?;

        info!(width, height, "Device created");

        Ok(Self {
            backend,
            heaps,
            fence,
            targets,
            allocator,
            deferred: DeferredReleaseQueue::new(),
            encoder,
            states,
            sync_interval: u32::from(desc.enable_vsync),
            desc,
            resize_occurred: false,
            occluded: false,
            frame_count: 0,
            state: DeviceState::Ready,
            _lease: lease,
        })
    }

    /// 开始录制当前帧
    pub fn render_context(&mut self) -> Result<RenderContext<'_, B>> {
        self.ensure_usable()?;
        self.encoder.ensure_recording()?;
        self.state = DeviceState::Recording;

        Ok(RenderContext::new(
            &mut self.backend,
            &mut self.heaps,
            &mut self.allocator,
            &mut self.deferred,
            &mut self.encoder,
            &mut self.states,
            self.targets.current(),
            self.fence.cpu_value() + 1,
        ))
    }

    /// 提交当前帧并呈现
    ///
    /// 本帧期间调整过交换链大小时命令列表被丢弃，返回 `PresentOutcome::Skipped`。
    /// 只有在 fence 新值超过环深度 N 时才会阻塞，等待 (新值 - N) 完成。
    pub fn present(&mut self) -> Result<PresentOutcome> {
        self.ensure_usable()?;
        let _span = trace_span!("present", frame = self.frame_count).entered();

        let color = self.current_color()?;
        if let Err(e) = transition_resource(
            &mut self.backend,
            &mut self.encoder,
            &mut self.states,
            color,
            ResourceState::Present,
        ) {
            return Err(self.lose("transition to present", e));
        }

        if let Err(e) = self.encoder.close().and_then(|_| self.backend.close_command_list()) {
            return Err(self.lose("close command list", e));
        }

        let outcome = if self.resize_occurred {
            debug!("Frame dropped after swap chain resize");
            self.states.rollback();
            PresentOutcome::Skipped
        } else {
            if let Err(e) = self.encoder.execute().and_then(|_| self.backend.execute_command_list()) {
                return Err(self.lose("execute command list", e));
            }
            self.states.commit();
            self.state = DeviceState::Submitted;

            let status = match self.backend.present(self.sync_interval) {
                Ok(status) => status,
                Err(e) => return Err(self.lose("present", e)),
            };
            self.occluded = status == PresentStatus::Occluded;
            self.state = DeviceState::Presented;

            let value = self.fence.increment();
            self.targets.current_mut().mark_in_use(value);
            self.targets.advance();
            if let Err(e) = self.fence.signal(&mut self.backend) {
                return Err(self.lose("signal fence", e));
            }
            self.allocator.end_frame(value);
            self.frame_count += 1;

            let depth = u64::from(self.desc.swap_chain_buffers);
            if value > depth {
                self.fence.wait(value - depth)?;
            }

            trace!(frame = value, index = self.targets.current_index(), occluded = self.occluded, "Frame presented");
            PresentOutcome::Presented { frame: value }
        };

        self.resize_occurred = false;
        self.collect_completed();

        if let Err(e) = self
            .backend
            .reset_command_list(self.fence.cpu_value() + 1)
            .and_then(|_| self.encoder.reset())
        {
            return Err(self.lose("reset command list", e));
        }
        if let Err(e) = self
            .backend
            .bind_descriptor_heaps(&self.heaps.shader_visible_kinds())
            .and_then(|_| self.encoder.record())
        {
            return Err(self.lose("bind descriptor heaps", e));
        }

        self.state = DeviceState::Ready;
        Ok(outcome)
    }

    /// 调整交换链大小
    ///
    /// 先等待 GPU 完成所有已提交的工作，再重建全部 N 个帧目标。
    /// 格式和采样数保持不变。本帧接下来的 `present` 会被丢弃。
    pub fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<&FrameTarget> {
        self.ensure_usable()?;
        if width == 0 || height == 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "Swap chain size must be non-zero, got {}x{}",
                width, height
            )));
        }

        self.resize_occurred = true;
        self.fence.flush()?;
        self.collect_completed();

        for target in self.targets.iter() {
            for texture in target.color().into_iter().chain(target.depth()) {
                self.states.forget(texture.id);
            }
        }

        let (rtv_heap, dsv_heap) = self.heaps.render_target_views_mut();
        self.targets.detach_all(&mut self.backend, rtv_heap, dsv_heap)?;

        if let Err(e) = self.backend.resize_buffers(width, height) {
            error!(width, height, error = %e, "Failed to resize swap chain");
            self.state = DeviceState::Lost;
            return Err(e);
        }

        let (rtv_heap, dsv_heap) = self.heaps.render_target_views_mut();
        self.targets.build(&mut self.backend, rtv_heap, dsv_heap, width, height)?;
        register_targets(&mut self.states, &self.targets);

        debug!(width, height, index = self.targets.current_index(), "Swap chain resized");
        Ok(self.targets.current())
    }

    /// 窗口是否被完全遮挡
    ///
    /// 缓存为遮挡状态时，每次查询都会做一次测试呈现来刷新缓存。
    pub fn is_window_occluded(&mut self) -> bool {
        if self.occluded {
            match self.backend.test_present() {
                Ok(status) => self.occluded = status == PresentStatus::Occluded,
                Err(e) => warn!(error = %e, "Test present failed"),
            }
        }
        self.occluded
    }

    /// 当前帧目标
    pub fn swap_chain_target(&self) -> &FrameTarget {
        self.targets.current()
    }

    /// 全部帧目标
    pub fn frame_targets(&self) -> &FrameTargetSet {
        &self.targets
    }

    /// 设置垂直同步
    pub fn set_vsync(&mut self, enable: bool) {
        self.sync_interval = u32::from(enable);
        debug!(enable, "VSync changed");
    }

    pub fn is_vsync_enabled(&self) -> bool {
        self.sync_interval != 0
    }

    /// 获取指定类型的描述符堆
    pub fn heap(&self, kind: DescriptorHeapKind) -> &DescriptorSlotHeap {
        self.heaps.get(kind)
    }

    pub fn srv_heap(&self) -> &DescriptorSlotHeap {
        self.heaps.get(DescriptorHeapKind::ShaderResource)
    }

    pub fn sampler_heap(&self) -> &DescriptorSlotHeap {
        self.heaps.get(DescriptorHeapKind::Sampler)
    }

    pub fn rtv_heap(&self) -> &DescriptorSlotHeap {
        self.heaps.get(DescriptorHeapKind::RenderTarget)
    }

    pub fn dsv_heap(&self) -> &DescriptorSlotHeap {
        self.heaps.get(DescriptorHeapKind::DepthStencil)
    }

    pub fn fence(&self) -> &FrameFence<B::Fence> {
        &self.fence
    }

    pub fn resource_allocator(&self) -> &ResourceAllocator {
        &self.allocator
    }

    /// 创建深度纹理并开始跟踪它的状态（初始为 `DepthWrite`）
    ///
    /// 不再使用时通过 `release_resource` 延迟释放。
    pub fn create_depth_texture(&mut self, desc: &TextureDesc) -> Result<Texture> {
        self.ensure_usable()?;
        if !desc.format.is_depth() {
            return Err(DeviceError::InvalidArgument(format!(
                "{:?} is not a depth format",
                desc.format
            )));
        }
        let texture = self.backend.create_depth_texture(desc)?;
        self.states.register(texture.id, ResourceState::DepthWrite);
        Ok(texture)
    }

    /// 登记应用创建的资源，之后可以通过渲染上下文对它做状态转换
    pub fn track_resource(&mut self, id: ResourceId, initial_state: ResourceState) {
        self.states.register(id, initial_state);
    }

    /// 释放原生资源
    ///
    /// 资源可能仍被在途的帧引用，真正的释放发生在当前帧在 GPU 上完成之后。
    pub fn release_resource(&mut self, id: ResourceId) -> Result<()> {
        let owned_by_device = id == self.allocator.buffer()
            || self
                .targets
                .iter()
                .any(|t| t.color().map(|c| c.id) == Some(id) || t.depth().map(|d| d.id) == Some(id));
        if owned_by_device {
            return Err(DeviceError::InvalidArgument(format!(
                "Resource {} is owned by the device",
                id
            )));
        }
        if self.deferred.contains_resource(id) {
            return Err(DeviceError::InvalidArgument(format!(
                "Resource {} is already pending release",
                id
            )));
        }

        self.states.forget(id);
        self.deferred.push(self.fence.cpu_value() + 1, Pending::Resource(id));
        Ok(())
    }

    /// 释放描述符槽位（延迟到当前帧在 GPU 上完成之后）
    pub fn release_descriptor(&mut self, kind: DescriptorHeapKind, index: u32) -> Result<()> {
        self.deferred
            .defer_slot(&self.heaps, self.fence.cpu_value() + 1, kind, index)
    }

    /// 等待 GPU 空闲并执行所有可以执行的延迟释放
    pub fn flush(&mut self) -> Result<()> {
        self.fence.flush()?;
        self.collect_completed();
        Ok(())
    }

    /// 已呈现的帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn desc(&self) -> &DeviceDesc {
        &self.desc
    }

    /// 后端的只读视图
    ///
    /// 用于取得原生对象。命令列表的提交、重置和资源释放只能经由设备进行。
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn ensure_usable(&self) -> Result<()> {
        match self.state {
            DeviceState::Lost => Err(DeviceError::Submit("Device is lost".to_string())),
            DeviceState::ShuttingDown => Err(DeviceError::Submit("Device is shutting down".to_string())),
            _ => Ok(()),
        }
    }

    fn current_color(&self) -> Result<ResourceId> {
        self.targets.current().color().map(|c| c.id).ok_or_else(|| {
            DeviceError::InvalidArgument("Current frame target has no color buffer".to_string())
        })
    }

    fn collect_completed(&mut self) {
        let completed = self.fence.completed_value();
        self.allocator.retire(completed);
        self.deferred.collect(completed, &mut self.heaps, &mut self.backend);
    }

    /// 致命错误：标记设备丢失
    fn lose(&mut self, stage: &str, cause: DeviceError) -> DeviceError {
        self.encoder.invalidate();
        self.state = DeviceState::Lost;
        error!(stage, error = %cause, "Command submission failed, device lost");
        match cause {
            DeviceError::Submit(msg) => DeviceError::Submit(msg),
            other => DeviceError::Submit(format!("{}: {}", stage, other)),
        }
    }
}

impl<B: GraphicsBackend> Drop for Device<B> {
    fn drop(&mut self) {
        self.state = DeviceState::ShuttingDown;

        match self.fence.flush() {
            Ok(()) => {
                let completed = self.fence.completed_value();
                self.allocator.retire(completed);
                self.deferred.collect(completed, &mut self.heaps, &mut self.backend);
                if !self.deferred.is_empty() {
                    warn!(remaining = self.deferred.len(), "Deferred releases left after drain");
                }
            }
            Err(e) => error!(error = %e, "Failed to drain GPU work during shutdown"),
        }

        info!(frames = self.frame_count, "Device destroyed");
    }
}

fn create_heaps<B: GraphicsBackend>(backend: &mut B, capacities: &HeapCapacities) -> Result<DescriptorHeaps> {
    let mut create = |kind: DescriptorHeapKind| -> Result<DescriptorSlotHeap> {
        let capacity = capacities.get(kind);
        let shader_visible = kind.is_shader_visible();
        let layout = backend.create_descriptor_heap(kind, capacity, shader_visible)?;
        debug!(%kind, capacity, shader_visible, "Descriptor heap created");
        DescriptorSlotHeap::new(kind, capacity, shader_visible, layout)
    };

    DescriptorHeaps::new(
        create(DescriptorHeapKind::ShaderResource)?,
        create(DescriptorHeapKind::Sampler)?,
        create(DescriptorHeapKind::RenderTarget)?,
        create(DescriptorHeapKind::DepthStencil)?,
    )
}

fn register_targets(states: &mut ResourceStateTracker, targets: &FrameTargetSet) {
    for target in targets.iter() {
        if let Some(color) = target.color() {
            states.register(color.id, ResourceState::Present);
        }
        if let Some(depth) = target.depth() {
            states.register(depth.id, ResourceState::DepthWrite);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::core::error::DescriptorError;
    use crate::gfx::headless::{HeadlessBackend, HeadlessGpu, HeadlessSurface, RecordedCommand};

    const BLOCK_TIMEOUT: Duration = Duration::from_millis(150);
    const WAKE_TIMEOUT: Duration = Duration::from_secs(5);

    fn desc(buffers: u32) -> DeviceDesc {
        DeviceDesc {
            swap_chain_buffers: buffers,
            heap_capacities: HeapCapacities {
                shader_resource: 16,
                sampler: 8,
                render_target: 8,
                depth_stencil: 8,
            },
            transient_allocator_bytes: 4096,
            ..DeviceDesc::default()
        }
    }

    fn create(registry: &DeviceRegistry, gpu: &HeadlessGpu, buffers: u32) -> Result<Device<HeadlessBackend>> {
        Device::create_in(registry, gpu.clone(), &HeadlessSurface::new(320, 240), desc(buffers))
    }

    fn target_ids(device: &Device<HeadlessBackend>) -> HashSet<ResourceId> {
        device
            .frame_targets()
            .iter()
            .flat_map(|t| t.color().into_iter().chain(t.depth()).map(|tex| tex.id))
            .collect()
    }

    #[test]
    fn test_create_and_cycle() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 3).unwrap();

        assert_eq!(device.state(), DeviceState::Ready);
        assert_eq!(device.rtv_heap().live_count(), 3);
        assert_eq!(device.dsv_heap().live_count(), 3);
        assert_eq!(device.swap_chain_target().size(), (320, 240));

        for frame in 1..=5 {
            let index = device.swap_chain_target().index();
            assert_eq!(device.present().unwrap(), PresentOutcome::Presented { frame });
            assert_eq!(device.swap_chain_target().index(), (index + 1) % 3);
        }
        assert_eq!(device.frame_count(), 5);
        assert_eq!(device.fence().cpu_value(), 5);
        assert!(device.fence().completed_value() <= device.fence().cpu_value());
    }

    #[test]
    fn test_third_present_blocks_until_first_frame_completes() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 2).unwrap();

        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..3 {
                    let outcome = device.present().unwrap();
                    tx.send(outcome).unwrap();
                }
            });

            assert_eq!(rx.recv_timeout(WAKE_TIMEOUT).unwrap(), PresentOutcome::Presented { frame: 1 });
            assert_eq!(rx.recv_timeout(WAKE_TIMEOUT).unwrap(), PresentOutcome::Presented { frame: 2 });

            // 第三帧需要等待帧 1 完成
            assert!(matches!(
                rx.recv_timeout(BLOCK_TIMEOUT),
                Err(mpsc::RecvTimeoutError::Timeout)
            ));

            gpu.complete(1);
            assert_eq!(rx.recv_timeout(WAKE_TIMEOUT).unwrap(), PresentOutcome::Presented { frame: 3 });
        });

        assert_eq!(device.fence().completed_value(), 1);
    }

    #[test]
    fn test_only_call_after_ring_fills_blocks() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 3).unwrap();

        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..4 {
                    device.present().unwrap();
                    tx.send(()).unwrap();
                }
            });

            for _ in 0..3 {
                assert!(rx.recv_timeout(WAKE_TIMEOUT).is_ok());
            }
            assert!(rx.recv_timeout(BLOCK_TIMEOUT).is_err());
            gpu.complete(1);
            assert!(rx.recv_timeout(WAKE_TIMEOUT).is_ok());
        });
    }

    #[test]
    fn test_resize_drains_in_flight_work() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 3).unwrap();

        device.present().unwrap();
        device.present().unwrap();
        let old_ids = target_ids(&device);

        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(|| {
                let size = device.resize_swap_chain(640, 480).unwrap().size();
                tx.send(size).unwrap();
            });

            assert!(rx.recv_timeout(BLOCK_TIMEOUT).is_err());
            gpu.complete_all();
            assert_eq!(rx.recv_timeout(WAKE_TIMEOUT).unwrap(), (640, 480));
        });

        assert_eq!(device.fence().completed_value(), 2);
        let new_ids = target_ids(&device);
        assert!(old_ids.is_disjoint(&new_ids));
        assert!(old_ids.iter().all(|id| !gpu.is_resource_alive(*id)));
        assert_eq!(device.rtv_heap().live_count(), 3);
        assert_eq!(device.frame_targets().color_format(), ResourceFormat::Rgba8UnormSrgb);

        // 本帧录制于调整大小之前，被丢弃
        let executed_before = gpu.executed_commands().len();
        assert_eq!(device.present().unwrap(), PresentOutcome::Skipped);
        assert_eq!(device.fence().cpu_value(), 2);
        assert_eq!(gpu.executed_commands().len(), executed_before);

        // 下一帧只引用新的帧目标
        {
            let mut ctx = device.render_context().unwrap();
            let target = ctx.target();
            ctx.clear_color(target, [0.0; 4]).unwrap();
        }
        assert_eq!(device.present().unwrap(), PresentOutcome::Presented { frame: 3 });
        let executed = gpu.executed_commands();
        let barriers: Vec<ResourceId> = executed[executed_before..]
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Barrier { resource, .. } => Some(*resource),
                _ => None,
            })
            .collect();
        assert!(!barriers.is_empty());
        assert!(barriers.iter().all(|id| new_ids.contains(id)));
    }

    #[test]
    fn test_resize_preserves_formats_and_sample_count() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let multisampled = DeviceDesc {
            sample_count: 4,
            ..desc(2)
        };
        let mut device =
            Device::<HeadlessBackend>::create_in(&registry, gpu.clone(), &HeadlessSurface::new(320, 240), multisampled)
                .unwrap();

        device.resize_swap_chain(200, 100).unwrap();
        for target in device.frame_targets().iter() {
            let color = target.color().unwrap();
            let depth = target.depth().unwrap();
            assert_eq!(color.sample_count(), 4);
            assert_eq!(depth.sample_count(), 4);
            assert_eq!(color.desc.format, ResourceFormat::Rgba8UnormSrgb);
            assert_eq!(depth.desc.format, ResourceFormat::D24UnormS8);
            assert_eq!(target.size(), (200, 100));
        }
        drop(device);

        let invalid = DeviceDesc {
            sample_count: 3,
            ..desc(2)
        };
        assert!(matches!(
            Device::<HeadlessBackend>::create_in(&registry, gpu, &HeadlessSurface::new(64, 64), invalid),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert!(!registry.is_occupied());
    }

    #[test]
    fn test_resize_rejects_zero_size() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();
        assert!(matches!(
            device.resize_swap_chain(0, 480),
            Err(DeviceError::InvalidArgument(_))
        ));
        assert_eq!(device.present().unwrap(), PresentOutcome::Presented { frame: 1 });
    }

    #[test]
    fn test_second_device_rejected() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut first = create(&registry, &gpu, 2).unwrap();

        let other_gpu = HeadlessGpu::new();
        let second = create(&registry, &other_gpu, 2);
        assert!(matches!(
            second,
            Err(DeviceError::Setup(SetupError::DeviceAlreadyExists))
        ));
        assert_eq!(other_gpu.devices_created(), 0);

        // 第一个设备不受影响
        assert_eq!(first.present().unwrap(), PresentOutcome::Presented { frame: 1 });
        assert!(registry.is_occupied());

        drop(first);
        assert!(!registry.is_occupied());
        assert!(create(&registry, &other_gpu, 2).is_ok());
    }

    #[test]
    fn test_setup_failure_releases_registry() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.fail_swap_chain_creation(true);
        assert!(matches!(
            create(&registry, &gpu, 2),
            Err(DeviceError::Setup(SetupError::PresentationSetupFailed(_)))
        ));
        assert!(!registry.is_occupied());

        let gpu = HeadlessGpu::new();
        gpu.fail_heap_creation(Some(DescriptorHeapKind::Sampler));
        assert!(matches!(
            create(&registry, &gpu, 2),
            Err(DeviceError::Descriptor(DescriptorError::HeapAllocation { .. }))
        ));
        assert!(!registry.is_occupied());

        let gpu = HeadlessGpu::new();
        gpu.fail_adapter_selection(true);
        assert!(matches!(
            create(&registry, &gpu, 2),
            Err(DeviceError::Setup(SetupError::NoCompatibleAdapter { major: 12, minor: 0 }))
        ));

        let unsupported = DeviceDesc {
            api_major_version: 13,
            ..desc(2)
        };
        let result = Device::<HeadlessBackend>::create_in(
            &registry,
            HeadlessGpu::new(),
            &HeadlessSurface::new(64, 64),
            unsupported,
        );
        assert!(matches!(
            result,
            Err(DeviceError::Setup(SetupError::UnsupportedApiVersion { .. }))
        ));
        assert!(!registry.is_occupied());
    }

    #[test]
    fn test_submit_failure_loses_device() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();
        device.present().unwrap();

        gpu.fail_next_submit();
        assert!(matches!(device.present(), Err(DeviceError::Submit(_))));
        assert_eq!(device.state(), DeviceState::Lost);

        assert!(matches!(device.present(), Err(DeviceError::Submit(_))));
        assert!(matches!(device.resize_swap_chain(64, 64), Err(DeviceError::Submit(_))));
        assert!(device.render_context().is_err());
    }

    #[test]
    fn test_deferred_descriptor_release() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 3).unwrap();

        let index = {
            let mut ctx = device.render_context().unwrap();
            ctx.allocate_descriptor(DescriptorHeapKind::ShaderResource).unwrap()
        };
        device.present().unwrap();

        {
            let mut ctx = device.render_context().unwrap();
            assert_eq!(ctx.frame_fence_value(), 2);
            ctx.release_descriptor(DescriptorHeapKind::ShaderResource, index).unwrap();
            // 同一个槽位不能释放两次
            assert!(ctx.release_descriptor(DescriptorHeapKind::ShaderResource, index).is_err());
        }
        device.present().unwrap();
        assert!(device.srv_heap().is_live(index));

        gpu.complete(1);
        device.present().unwrap();
        assert!(device.srv_heap().is_live(index));

        gpu.complete(2);
        device.present().unwrap();
        assert!(!device.srv_heap().is_live(index));
    }

    #[test]
    fn test_deferred_resource_release_and_flush() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 3).unwrap();

        let texture = device
            .create_depth_texture(&TextureDesc::new(16, 16, ResourceFormat::D32Float))
            .unwrap();
        assert!(device
            .create_depth_texture(&TextureDesc::new(16, 16, ResourceFormat::Rgba8Unorm))
            .is_err());
        device.present().unwrap();

        device.release_resource(texture.id).unwrap();
        assert!(device.release_resource(texture.id).is_err());
        let owned = device.swap_chain_target().color().unwrap().id;
        assert!(device.release_resource(owned).is_err());

        device.present().unwrap();
        assert!(gpu.is_resource_alive(texture.id));

        gpu.complete_all();
        device.flush().unwrap();
        assert!(!gpu.is_resource_alive(texture.id));
    }

    #[test]
    fn test_dropped_frame_restores_resource_states() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();

        let texture = device
            .create_depth_texture(&TextureDesc::new(16, 16, ResourceFormat::D32Float))
            .unwrap();
        device.track_resource(texture.id, ResourceState::Common);

        {
            let mut ctx = device.render_context().unwrap();
            ctx.resource_barrier(texture.id, ResourceState::CopyDest).unwrap();
        }
        device.resize_swap_chain(128, 128).unwrap();
        assert_eq!(device.present().unwrap(), PresentOutcome::Skipped);

        {
            let mut ctx = device.render_context().unwrap();
            ctx.resource_barrier(texture.id, ResourceState::ShaderResource).unwrap();
        }
        device.present().unwrap();

        // 被丢弃的帧里的 CopyDest 屏障从未执行
        let barriers: Vec<(ResourceState, ResourceState)> = gpu
            .executed_commands()
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Barrier { resource, before, after } if *resource == texture.id => {
                    Some((*before, *after))
                }
                _ => None,
            })
            .collect();
        assert_eq!(barriers, vec![(ResourceState::Common, ResourceState::ShaderResource)]);
    }

    #[test]
    fn test_release_descriptor_range_rejects_wrapping_range() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();

        let mut ctx = device.render_context().unwrap();
        let range = ctx
            .allocate_descriptor_range(DescriptorHeapKind::ShaderResource, 2)
            .unwrap();
        let wrapping = crate::renderer::descriptor::DescriptorRange {
            kind: DescriptorHeapKind::ShaderResource,
            start: u32::MAX - 1,
            count: 4,
        };
        assert!(matches!(
            ctx.release_descriptor_range(wrapping),
            Err(DeviceError::Descriptor(DescriptorError::InvalidRange { .. }))
        ));
        ctx.release_descriptor_range(range).unwrap();
    }

    #[test]
    fn test_transient_memory_retired_by_fence() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 3).unwrap();

        {
            let mut ctx = device.render_context().unwrap();
            ctx.reserve_transient(3000, 256).unwrap();
            // 4096 字节的缓冲区放不下第二块
            assert!(ctx.reserve_transient(3000, 256).is_err());
        }
        device.present().unwrap();
        assert_eq!(device.resource_allocator().in_flight(), 3000);

        gpu.complete(1);
        device.present().unwrap();
        assert_eq!(device.resource_allocator().in_flight(), 0);
    }

    #[test]
    fn test_render_context_records_into_current_target() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();

        {
            let mut ctx = device.render_context().unwrap();
            let target = ctx.target();
            ctx.clear_color(target, [0.1, 0.2, 0.3, 1.0]).unwrap();
            ctx.clear_depth(target, 1.0, 0).unwrap();
        }
        assert_eq!(device.state(), DeviceState::Recording);
        let color = device.swap_chain_target().color().unwrap().id;
        device.present().unwrap();
        assert_eq!(device.state(), DeviceState::Ready);

        let executed = gpu.executed_commands();
        let transitions: Vec<(ResourceState, ResourceState)> = executed
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Barrier { resource, before, after } if *resource == color => {
                    Some((*before, *after))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (ResourceState::Present, ResourceState::RenderTarget),
                (ResourceState::RenderTarget, ResourceState::Present),
            ]
        );
        assert!(executed
            .iter()
            .any(|cmd| matches!(cmd, RecordedCommand::ClearRenderTarget { .. })));
    }

    #[test]
    fn test_occlusion_cache() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();

        assert!(!device.is_window_occluded());
        assert_eq!(gpu.test_present_count(), 0);

        gpu.set_occluded(true);
        device.present().unwrap();
        assert!(device.is_window_occluded());
        assert!(device.is_window_occluded());
        assert_eq!(gpu.test_present_count(), 2);

        gpu.set_occluded(false);
        assert!(!device.is_window_occluded());
        // 缓存为可见后不再测试呈现
        assert!(!device.is_window_occluded());
        assert_eq!(gpu.test_present_count(), 3);
    }

    #[test]
    fn test_vsync_interval() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        let mut device = create(&registry, &gpu, 2).unwrap();
        assert!(!device.is_vsync_enabled());

        device.present().unwrap();
        device.set_vsync(true);
        device.present().unwrap();

        let intervals: Vec<u32> = gpu
            .executed_commands()
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Present { sync_interval, .. } => Some(*sync_interval),
                _ => None,
            })
            .collect();
        assert_eq!(intervals, vec![0, 1]);
    }

    #[test]
    fn test_drop_drains_queue() {
        let registry = DeviceRegistry::new();
        let gpu = HeadlessGpu::new();
        gpu.set_auto_complete(false);
        let mut device = create(&registry, &gpu, 3).unwrap();
        device.present().unwrap();
        device.present().unwrap();

        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            s.spawn(move || {
                drop(device);
                tx.send(()).unwrap();
            });
            assert!(rx.recv_timeout(BLOCK_TIMEOUT).is_err());
            gpu.complete_all();
            assert!(rx.recv_timeout(WAKE_TIMEOUT).is_ok());
        });
        assert!(!registry.is_occupied());
    }
}
