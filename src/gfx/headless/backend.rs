//! 模拟 GPU 后端
//!
//! 按 D3D12 的规则模拟交换链、描述符堆和命令列表，但不做任何实际渲染。
//! 关闭的命令列表只有在执行之后才会进入 `HeadlessGpu` 的命令日志。

use std::mem;

use tracing::{debug, info};

use super::context::{HeadlessFence, HeadlessGpu, RecordedCommand, ResourceKind};
use crate::core::error::{DescriptorError, DeviceError, Result, SetupError};
use crate::gfx::backend::{CommandQueue, GraphicsBackend, PresentStatus, SurfaceProvider};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapKind, DescriptorHeapLayout};
use crate::renderer::device::DeviceDesc;
use crate::renderer::format::FeatureLevel;
use crate::renderer::resource::{ResourceId, ResourceState, Texture, TextureDesc};

/// 着色器可见的采样器堆容量上限（与 D3D12 相同）
const MAX_SHADER_VISIBLE_SAMPLERS: u32 = 2048;
/// 描述符增量大小
const DESCRIPTOR_STRIDE: u32 = 32;

/// 模拟 GPU 后端
pub struct HeadlessBackend {
    gpu: HeadlessGpu,
    feature_level: FeatureLevel,
    width: u32,
    height: u32,
    buffer_count: u32,
    back_buffer_index: u32,
    /// 已获取、尚未释放的交换链缓冲区
    back_buffers: Vec<Option<ResourceId>>,
    recording: Vec<RecordedCommand>,
    closed: Option<Vec<RecordedCommand>>,
    next_heap_base: usize,
}

impl HeadlessBackend {
    /// 模拟 GPU 句柄
    pub fn gpu(&self) -> &HeadlessGpu {
        &self.gpu
    }
}

impl CommandQueue for HeadlessBackend {
    type Fence = HeadlessFence;

    fn signal(&mut self, _fence: &HeadlessFence, value: u64) -> Result<()> {
        self.gpu.record_signal(value);
        Ok(())
    }
}

impl GraphicsBackend for HeadlessBackend {
    type Options = HeadlessGpu;

    fn create(gpu: HeadlessGpu, surface: &dyn SurfaceProvider, desc: &DeviceDesc) -> Result<Self> {
        let feature_level = desc.feature_level()?;

        let mut state = gpu.lock();
        if state.faults.adapter {
            return Err(SetupError::NoCompatibleAdapter {
                major: desc.api_major_version,
                minor: desc.api_minor_version,
            }
            .into());
        }
        if state.faults.swap_chain {
            return Err(SetupError::PresentationSetupFailed("Simulated swap chain failure".to_string()).into());
        }

        let (width, height) = surface.client_area_size();
        state.devices_created += 1;
        state.completed = 0;
        state.last_signaled = 0;
        drop(state);

        info!(width, height, buffers = desc.swap_chain_buffers, "Headless GPU initialized");

        Ok(Self {
            gpu,
            feature_level,
            width: width.max(1),
            height: height.max(1),
            buffer_count: desc.swap_chain_buffers,
            back_buffer_index: 0,
            back_buffers: vec![None; desc.swap_chain_buffers as usize],
            recording: Vec::new(),
            closed: None,
            next_heap_base: 0x1000_0000,
        })
    }

    fn backend_name(&self) -> &str {
        "Headless"
    }

    fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    fn create_fence(&mut self) -> Result<HeadlessFence> {
        Ok(HeadlessFence::new(self.gpu.clone()))
    }

    fn create_descriptor_heap(
        &mut self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeapLayout> {
        let rejection = if self.gpu.lock().faults.heap == Some(kind) {
            Some("simulated heap failure".to_string())
        } else if shader_visible
            && kind == DescriptorHeapKind::Sampler
            && capacity > MAX_SHADER_VISIBLE_SAMPLERS
        {
            Some(format!(
                "shader visible sampler heaps are limited to {} descriptors",
                MAX_SHADER_VISIBLE_SAMPLERS
            ))
        } else {
            None
        };
        if let Some(reason) = rejection {
            return Err(DescriptorError::HeapAllocation { kind, capacity, reason }.into());
        }

        let cpu_start = self.next_heap_base;
        let size = capacity as usize * DESCRIPTOR_STRIDE as usize;
        // 每个堆之间留出一页间隔
        self.next_heap_base += (size + 0xFFFF) & !0xFFFF;

        Ok(DescriptorHeapLayout {
            cpu_start,
            gpu_start: shader_visible.then(|| 0x8000_0000_0000 + cpu_start as u64),
            stride: DESCRIPTOR_STRIDE,
        })
    }

    fn swap_chain_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.back_buffer_index
    }

    fn acquire_back_buffer(&mut self, index: u32, desc: &TextureDesc) -> Result<Texture> {
        let slot = self.back_buffers.get_mut(index as usize).ok_or_else(|| {
            DeviceError::InvalidArgument(format!("Swap chain has no buffer {}", index))
        })?;
        if slot.is_some() {
            return Err(DeviceError::InvalidArgument(format!(
                "Swap chain buffer {} is already acquired",
                index
            )));
        }

        let id = self.gpu.lock().allocate_resource(ResourceKind::BackBuffer);
        *slot = Some(id);
        let desc = TextureDesc {
            width: self.width,
            height: self.height,
            ..*desc
        };
        Ok(Texture::new(id, desc))
    }

    fn create_depth_texture(&mut self, desc: &TextureDesc) -> Result<Texture> {
        let id = self.gpu.lock().allocate_resource(ResourceKind::Texture);
        Ok(Texture::new(id, *desc))
    }

    fn create_render_target_view(&mut self, texture: &Texture, _handle: CpuDescriptorHandle) -> Result<()> {
        self.ensure_alive(texture.id)
    }

    fn create_depth_stencil_view(&mut self, texture: &Texture, _handle: CpuDescriptorHandle) -> Result<()> {
        self.ensure_alive(texture.id)
    }

    fn resize_buffers(&mut self, width: u32, height: u32) -> Result<()> {
        if self.back_buffers.iter().any(Option::is_some) {
            return Err(SetupError::PresentationSetupFailed(
                "Swap chain buffers are still referenced".to_string(),
            )
            .into());
        }

        self.width = width;
        self.height = height;
        self.back_buffer_index = 0;
        debug!(width, height, "Headless swap chain resized");
        Ok(())
    }

    fn create_upload_buffer(&mut self, _size: u64) -> Result<ResourceId> {
        Ok(self.gpu.lock().allocate_resource(ResourceKind::UploadBuffer))
    }

    fn release_resource(&mut self, id: ResourceId) {
        for slot in &mut self.back_buffers {
            if *slot == Some(id) {
                *slot = None;
            }
        }
        self.gpu.lock().resources.remove(&id);
    }

    fn resource_barrier(&mut self, resource: ResourceId, before: ResourceState, after: ResourceState) -> Result<()> {
        self.recording.push(RecordedCommand::Barrier { resource, before, after });
        Ok(())
    }

    fn clear_render_target_view(&mut self, handle: CpuDescriptorHandle, color: [f32; 4]) -> Result<()> {
        self.recording.push(RecordedCommand::ClearRenderTarget { handle, color });
        Ok(())
    }

    fn clear_depth_stencil_view(&mut self, handle: CpuDescriptorHandle, depth: f32, stencil: u8) -> Result<()> {
        self.recording.push(RecordedCommand::ClearDepthStencil { handle, depth, stencil });
        Ok(())
    }

    fn bind_descriptor_heaps(&mut self, kinds: &[DescriptorHeapKind]) -> Result<()> {
        self.recording.push(RecordedCommand::SetDescriptorHeaps(kinds.to_vec()));
        Ok(())
    }

    fn close_command_list(&mut self) -> Result<()> {
        if self.closed.is_some() {
            return Err(DeviceError::Submit("Command list is already closed".to_string()));
        }
        self.closed = Some(mem::take(&mut self.recording));
        Ok(())
    }

    fn execute_command_list(&mut self) -> Result<()> {
        let commands = self
            .closed
            .take()
            .ok_or_else(|| DeviceError::Submit("Command list is not closed".to_string()))?;

        let mut state = self.gpu.lock();
        if mem::take(&mut state.faults.next_submit) {
            return Err(DeviceError::Submit("Simulated GPU submission failure".to_string()));
        }
        state.executed.extend(commands);
        state.executed.push(RecordedCommand::Execute);
        Ok(())
    }

    fn reset_command_list(&mut self, _frame_fence_value: u64) -> Result<()> {
        // 关闭但未执行的命令被丢弃
        self.closed = None;
        self.recording.clear();
        Ok(())
    }

    fn present(&mut self, sync_interval: u32) -> Result<PresentStatus> {
        let mut state = self.gpu.lock();
        state.executed.push(RecordedCommand::Present {
            back_buffer: self.back_buffer_index,
            sync_interval,
        });
        self.back_buffer_index = (self.back_buffer_index + 1) % self.buffer_count;

        Ok(if state.occluded {
            PresentStatus::Occluded
        } else {
            PresentStatus::Ok
        })
    }

    fn test_present(&mut self) -> Result<PresentStatus> {
        let mut state = self.gpu.lock();
        state.test_presents += 1;
        Ok(if state.occluded {
            PresentStatus::Occluded
        } else {
            PresentStatus::Ok
        })
    }
}

impl HeadlessBackend {
    fn ensure_alive(&self, id: ResourceId) -> Result<()> {
        if !self.gpu.is_resource_alive(id) {
            return Err(DeviceError::InvalidArgument(format!("Resource {} has been released", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessSurface;
    use crate::renderer::format::ResourceFormat;

    fn backend(gpu: &HeadlessGpu) -> HeadlessBackend {
        let desc = DeviceDesc {
            swap_chain_buffers: 2,
            ..DeviceDesc::default()
        };
        HeadlessBackend::create(gpu.clone(), &HeadlessSurface::new(100, 50), &desc).unwrap()
    }

    #[test]
    fn test_unexecuted_list_is_discarded() {
        let gpu = HeadlessGpu::new();
        let mut backend = backend(&gpu);

        backend.clear_render_target_view(CpuDescriptorHandle::new(0, 0), [0.0; 4]).unwrap();
        backend.close_command_list().unwrap();
        backend.reset_command_list(1).unwrap();
        assert!(gpu.executed_commands().is_empty());

        backend.bind_descriptor_heaps(&[DescriptorHeapKind::Sampler]).unwrap();
        backend.close_command_list().unwrap();
        backend.execute_command_list().unwrap();
        assert_eq!(
            gpu.executed_commands(),
            vec![
                RecordedCommand::SetDescriptorHeaps(vec![DescriptorHeapKind::Sampler]),
                RecordedCommand::Execute,
            ]
        );
    }

    #[test]
    fn test_resize_requires_released_back_buffers() {
        let gpu = HeadlessGpu::new();
        let mut backend = backend(&gpu);
        let desc = TextureDesc::new(1, 1, ResourceFormat::Rgba8Unorm);

        let buffer = backend.acquire_back_buffer(0, &desc).unwrap();
        assert_eq!(buffer.width(), 100);
        assert!(backend.acquire_back_buffer(0, &desc).is_err());
        assert!(backend.resize_buffers(200, 100).is_err());

        backend.release_resource(buffer.id);
        backend.resize_buffers(200, 100).unwrap();
        assert_eq!(backend.swap_chain_size(), (200, 100));
    }

    #[test]
    fn test_shader_visible_sampler_limit() {
        let gpu = HeadlessGpu::new();
        let mut backend = backend(&gpu);
        assert!(backend
            .create_descriptor_heap(DescriptorHeapKind::Sampler, 4096, true)
            .is_err());

        let srv = backend
            .create_descriptor_heap(DescriptorHeapKind::ShaderResource, 64, true)
            .unwrap();
        let rtv = backend
            .create_descriptor_heap(DescriptorHeapKind::RenderTarget, 64, false)
            .unwrap();
        assert!(srv.gpu_start.is_some());
        assert!(rtv.gpu_start.is_none());
        assert!(rtv.cpu_start >= srv.cpu_start + 64 * DESCRIPTOR_STRIDE as usize);
    }

    #[test]
    fn test_present_cycles_back_buffers() {
        let gpu = HeadlessGpu::new();
        let mut backend = backend(&gpu);
        assert_eq!(backend.present(0).unwrap(), PresentStatus::Ok);
        assert_eq!(backend.current_back_buffer_index(), 1);
        gpu.set_occluded(true);
        assert_eq!(backend.present(1).unwrap(), PresentStatus::Occluded);
        assert_eq!(backend.current_back_buffer_index(), 0);
    }
}
