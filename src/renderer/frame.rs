//! 帧目标管理模块
//!
//! 交换链的每个缓冲区对应一个帧目标：颜色缓冲区、深度缓冲区以及它们的
//! RTV/DSV 槽位。帧目标按环形顺序循环使用，数量 N 在设备生命周期内不变。
//!
//! # 设计说明
//!
//! 使用 N 个帧目标循环使用（N = 3 时）：
//! - 帧 k: CPU 正在录制
//! - 帧 k-1: GPU 正在处理
//! - 帧 k-2: 等待呈现或已完成
//!
//! 调整窗口大小时先 `detach_all` 释放所有缓冲区和槽位，交换链调整后再 `build`。
//! 格式和采样数在重建前后保持不变。

use tracing::debug;

use super::descriptor::DescriptorSlotHeap;
use super::format::ResourceFormat;
use super::resource::{Texture, TextureDesc};
use crate::core::error::{DeviceError, Result};
use crate::gfx::backend::GraphicsBackend;

/// 帧目标
///
/// 一个交换链缓冲区及其配套的深度缓冲区。
#[derive(Debug, Clone)]
pub struct FrameTarget {
    index: u32,
    color: Option<Texture>,
    depth: Option<Texture>,
    rtv: Option<u32>,
    dsv: Option<u32>,
    /// 最近一次使用此目标提交的帧的 fence 值
    fence_value: u64,
}

impl FrameTarget {
    fn new(index: u32) -> Self {
        Self {
            index,
            color: None,
            depth: None,
            rtv: None,
            dsv: None,
            fence_value: 0,
        }
    }

    /// 在交换链中的缓冲区索引
    pub fn index(&self) -> u32 {
        self.index
    }

    /// 颜色缓冲区（交换链缓冲区）
    pub fn color(&self) -> Option<&Texture> {
        self.color.as_ref()
    }

    /// 深度缓冲区
    pub fn depth(&self) -> Option<&Texture> {
        self.depth.as_ref()
    }

    /// RTV 槽位
    pub fn rtv_slot(&self) -> Option<u32> {
        self.rtv
    }

    /// DSV 槽位
    pub fn dsv_slot(&self) -> Option<u32> {
        self.dsv
    }

    /// 颜色和深度缓冲区是否都已附加
    pub fn is_attached(&self) -> bool {
        self.color.is_some() && self.depth.is_some()
    }

    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// 宽高（未附加时为 0）
    pub fn size(&self) -> (u32, u32) {
        self.color
            .map(|texture| (texture.width(), texture.height()))
            .unwrap_or((0, 0))
    }

    /// 标记为 GPU 使用中
    pub(crate) fn mark_in_use(&mut self, fence_value: u64) {
        self.fence_value = fence_value;
    }
}

/// 帧目标集合
///
/// 管理 N 个帧目标的循环使用。
pub struct FrameTargetSet {
    targets: Vec<FrameTarget>,
    current_index: usize,
    color_format: ResourceFormat,
    depth_format: ResourceFormat,
    sample_count: u32,
}

impl FrameTargetSet {
    /// 创建新的帧目标集合（尚未附加任何缓冲区）
    ///
    /// # 参数
    ///
    /// * `count` - 帧目标数量（交换链缓冲区数量，至少为 2）
    /// * `color_format` - 渲染目标视图格式
    /// * `depth_format` - 深度格式
    pub fn new(count: u32, color_format: ResourceFormat, depth_format: ResourceFormat) -> Result<Self> {
        if count < 2 {
            return Err(DeviceError::InvalidArgument(format!(
                "At least 2 frame targets required, got {}",
                count
            )));
        }

        Ok(Self {
            targets: (0..count).map(FrameTarget::new).collect(),
            current_index: 0,
            color_format,
            depth_format,
            sample_count: 1,
        })
    }

    /// 设置帧目标的采样数（默认为 1）
    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// 为每个交换链缓冲区创建颜色/深度目标和视图
    pub fn build<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        rtv_heap: &mut DescriptorSlotHeap,
        dsv_heap: &mut DescriptorSlotHeap,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let color_desc = TextureDesc::new(width, height, self.color_format)
            .with_sample_count(self.sample_count);
        let depth_desc = TextureDesc::new(width, height, self.depth_format)
            .with_sample_count(self.sample_count);

        for target in &mut self.targets {
            let color = backend.acquire_back_buffer(target.index, &color_desc)?;
            target.color = Some(color);
            let rtv = rtv_heap.allocate()?;
            target.rtv = Some(rtv);
            backend.create_render_target_view(&color, rtv_heap.cpu_handle(rtv)?)?;

            let depth = backend.create_depth_texture(&depth_desc)?;
            target.depth = Some(depth);
            let dsv = dsv_heap.allocate()?;
            target.dsv = Some(dsv);
            backend.create_depth_stencil_view(&depth, dsv_heap.cpu_handle(dsv)?)?;
        }

        self.current_index = backend.current_back_buffer_index() as usize % self.targets.len();
        debug!(
            count = self.targets.len(),
            width,
            height,
            color_format = %self.color_format,
            depth_format = %self.depth_format,
            "Frame targets built"
        );
        Ok(())
    }

    /// 分离所有缓冲区并释放它们的视图槽位
    ///
    /// 调用前 GPU 必须已经完成所有引用这些目标的工作。
    pub fn detach_all<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        rtv_heap: &mut DescriptorSlotHeap,
        dsv_heap: &mut DescriptorSlotHeap,
    ) -> Result<()> {
        for target in &mut self.targets {
            if let Some(color) = target.color.take() {
                backend.release_resource(color.id);
            }
            if let Some(depth) = target.depth.take() {
                backend.release_resource(depth.id);
            }
            if let Some(rtv) = target.rtv.take() {
                rtv_heap.release(rtv)?;
            }
            if let Some(dsv) = target.dsv.take() {
                dsv_heap.release(dsv)?;
            }
        }
        Ok(())
    }

    /// 获取当前帧目标
    pub fn current(&self) -> &FrameTarget {
        &self.targets[self.current_index]
    }

    pub(crate) fn current_mut(&mut self) -> &mut FrameTarget {
        &mut self.targets[self.current_index]
    }

    /// 根据索引获取帧目标
    pub fn get(&self, index: usize) -> Option<&FrameTarget> {
        self.targets.get(index)
    }

    /// 获取当前帧索引
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// 移动到下一帧
    pub fn advance(&mut self) -> &FrameTarget {
        self.current_index = (self.current_index + 1) % self.targets.len();
        self.current()
    }

    /// 帧目标数量
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameTarget> {
        self.targets.iter()
    }

    pub fn color_format(&self) -> ResourceFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> ResourceFormat {
        self.depth_format
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}
