//! 图形后端的统一抽象接口
//!
//! 本模块定义了设备层驱动的后端必须实现的接口。设备只按照 D3D12 的资源/帧模型
//! 调用这些方法：创建原生描述符堆、fence、交换链缓冲区和视图，录制屏障与清屏命令，
//! 提交命令列表并呈现。
//!
//! 两个实现：
//! - `gfx::dx12`：Windows 上的 DirectX 12 后端
//! - `gfx::headless`：模拟 GPU，任何平台可用，测试与无窗口演示使用

use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::Window;

use crate::core::error::Result;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapKind, DescriptorHeapLayout};
use crate::renderer::device::DeviceDesc;
use crate::renderer::format::FeatureLevel;
use crate::renderer::resource::{ResourceId, ResourceState, Texture, TextureDesc};
use crate::renderer::sync::FencePrimitive;

/// 窗口提供者
///
/// 设备只需要读取客户区大小和原生窗口句柄，不处理任何窗口事件。
pub trait SurfaceProvider {
    /// 客户区大小（像素）
    fn client_area_size(&self) -> (u32, u32);

    /// 原生窗口句柄，无窗口时返回 `None`
    fn window_handle(&self) -> Option<RawWindowHandle>;
}

impl SurfaceProvider for Window {
    fn client_area_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }

    fn window_handle(&self) -> Option<RawWindowHandle> {
        HasWindowHandle::window_handle(self).ok().map(|handle| handle.as_raw())
    }
}

/// 呈现结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// 正常呈现
    Ok,
    /// 窗口被完全遮挡，画面不可见
    Occluded,
}

/// 命令队列
///
/// 队列按提交顺序执行；fence 完成值达到 `v` 意味着 signal `v` 之前的所有工作都已完成。
pub trait CommandQueue {
    /// 该队列可以 signal 的原生 fence 类型
    type Fence: FencePrimitive;

    /// 在队列末尾写入 fence 值（异步）
    fn signal(&mut self, fence: &Self::Fence, value: u64) -> Result<()>;
}

/// 图形后端的统一接口
///
/// 后端拥有物理设备、命令队列、交换链和单个直接命令列表。
/// 所有方法都在设备所在的单个线程上调用。
pub trait GraphicsBackend: CommandQueue + Send + Sized {
    /// 后端特有的创建选项
    type Options;

    /// 创建图形后端实例
    ///
    /// 依次创建适配器/设备、命令队列、交换链和命令列表。
    ///
    /// # 参数
    ///
    /// * `options` - 后端特有选项
    /// * `surface` - 交换链所依附的窗口
    /// * `desc` - 设备创建描述
    ///
    /// # 返回值
    ///
    /// 初始化完成的后端，命令列表处于录制状态
    fn create(options: Self::Options, surface: &dyn SurfaceProvider, desc: &DeviceDesc) -> Result<Self>;

    /// 获取后端的名称
    fn backend_name(&self) -> &str;

    /// 实际创建设备时使用的特性级别
    fn feature_level(&self) -> FeatureLevel;

    /// 创建原生 fence，初始值为 0
    fn create_fence(&mut self) -> Result<Self::Fence>;

    /// 创建原生描述符堆并返回其地址布局
    fn create_descriptor_heap(
        &mut self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeapLayout>;

    /// 交换链当前大小
    fn swap_chain_size(&self) -> (u32, u32);

    /// 交换链当前的后台缓冲区索引
    fn current_back_buffer_index(&self) -> u32;

    /// 获取交换链的第 `index` 个缓冲区
    ///
    /// `desc` 描述渲染目标视图使用的格式，可以是交换链线性格式对应的 sRGB 格式。
    fn acquire_back_buffer(&mut self, index: u32, desc: &TextureDesc) -> Result<Texture>;

    /// 创建深度纹理（初始状态为 `DepthWrite`）
    fn create_depth_texture(&mut self, desc: &TextureDesc) -> Result<Texture>;

    /// 在 `handle` 处写入渲染目标视图
    fn create_render_target_view(&mut self, texture: &Texture, handle: CpuDescriptorHandle) -> Result<()>;

    /// 在 `handle` 处写入深度模板视图
    fn create_depth_stencil_view(&mut self, texture: &Texture, handle: CpuDescriptorHandle) -> Result<()>;

    /// 调整交换链缓冲区大小
    ///
    /// 调用前所有后台缓冲区都必须已经通过 `release_resource` 释放。
    fn resize_buffers(&mut self, width: u32, height: u32) -> Result<()>;

    /// 创建 CPU 可写的上传缓冲区
    fn create_upload_buffer(&mut self, size: u64) -> Result<ResourceId>;

    /// 释放原生资源
    fn release_resource(&mut self, id: ResourceId);

    /// 录制资源屏障
    fn resource_barrier(&mut self, resource: ResourceId, before: ResourceState, after: ResourceState) -> Result<()>;

    /// 录制渲染目标清除
    fn clear_render_target_view(&mut self, handle: CpuDescriptorHandle, color: [f32; 4]) -> Result<()>;

    /// 录制深度模板清除
    fn clear_depth_stencil_view(&mut self, handle: CpuDescriptorHandle, depth: f32, stencil: u8) -> Result<()>;

    /// 录制着色器可见描述符堆的绑定
    fn bind_descriptor_heaps(&mut self, kinds: &[DescriptorHeapKind]) -> Result<()>;

    /// 关闭命令列表
    fn close_command_list(&mut self) -> Result<()>;

    /// 在队列上执行已关闭的命令列表
    fn execute_command_list(&mut self) -> Result<()>;

    /// 重置命令列表，开始录制下一帧
    ///
    /// `frame_fence_value` 是这一帧提交后将要 signal 的值，后端据此选择命令分配器。
    fn reset_command_list(&mut self, frame_fence_value: u64) -> Result<()>;

    /// 呈现当前后台缓冲区
    fn present(&mut self, sync_interval: u32) -> Result<PresentStatus>;

    /// 测试呈现：不显示任何内容，只查询窗口是否被遮挡
    fn test_present(&mut self) -> Result<PresentStatus>;
}
