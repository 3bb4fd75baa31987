//! DirectX 12 图形后端实现
//!
//! 在 `Dx12Context` 之上实现 `GraphicsBackend`：单个直接命令列表，
//! N+1 个命令分配器按帧 fence 值轮换，原生资源以 `ResourceId` 为键保存。

use std::collections::{HashMap, HashSet};
use std::mem::ManuallyDrop;

use tracing::{debug, info};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;

use super::context::{Dx12Context, Dx12Fence, Dx12Options};
use super::descriptor::Dx12DescriptorHeap;
use super::format::{dxgi_format, resource_state};
use crate::core::error::{DeviceError, Result, SetupError};
use crate::gfx::backend::{CommandQueue, GraphicsBackend, PresentStatus, SurfaceProvider};
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapKind, DescriptorHeapLayout};
use crate::renderer::device::DeviceDesc;
use crate::renderer::format::FeatureLevel;
use crate::renderer::resource::{ResourceId, ResourceState, Texture, TextureDesc};

/// DirectX 12 图形后端
pub struct Dx12Backend {
    context: Dx12Context,
    /// 命令分配器，数量为交换链缓冲区数 + 1
    command_allocators: Vec<ID3D12CommandAllocator>,
    command_list: ID3D12GraphicsCommandList,
    heaps: HashMap<DescriptorHeapKind, Dx12DescriptorHeap>,
    resources: HashMap<ResourceId, ID3D12Resource>,
    next_resource: u64,
    /// 带模板分量的深度模板视图
    stencil_views: HashSet<usize>,
    buffer_count: u32,
    swap_chain_format: DXGI_FORMAT,
}

// D3D12 设备、队列和命令列表只在设备所在线程上使用
unsafe impl Send for Dx12Backend {}

impl Dx12Backend {
    /// 获取底层设备上下文
    pub fn context(&self) -> &Dx12Context {
        &self.context
    }

    /// 获取命令列表，用于录制设备层未覆盖的命令
    pub fn command_list(&self) -> &ID3D12GraphicsCommandList {
        &self.command_list
    }

    /// 根据标识获取原生资源
    pub fn resource(&self, id: ResourceId) -> Option<&ID3D12Resource> {
        self.resources.get(&id)
    }

    fn insert_resource(&mut self, resource: ID3D12Resource) -> ResourceId {
        self.next_resource += 1;
        let id = ResourceId(self.next_resource);
        self.resources.insert(id, resource);
        id
    }

    fn lookup(&self, id: ResourceId) -> Result<&ID3D12Resource> {
        self.resources
            .get(&id)
            .ok_or_else(|| DeviceError::InvalidArgument(format!("Unknown resource {}", id)))
    }

    fn create_committed(
        &self,
        heap_type: D3D12_HEAP_TYPE,
        desc: &D3D12_RESOURCE_DESC,
        initial_state: D3D12_RESOURCE_STATES,
        clear_value: Option<&D3D12_CLEAR_VALUE>,
    ) -> Result<ID3D12Resource> {
        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: heap_type,
            ..Default::default()
        };
        let mut resource: Option<ID3D12Resource> = None;
        unsafe {
            self.context
                .device
                .CreateCommittedResource(
                    &heap_props,
                    D3D12_HEAP_FLAG_NONE,
                    desc,
                    initial_state,
                    clear_value.map(|v| v as *const _),
                    &mut resource,
                )
                .map_err(|e| SetupError::DeviceCreation(format!("CreateCommittedResource failed: {}", e)))?;
        }
        resource.ok_or_else(|| SetupError::DeviceCreation("CreateCommittedResource returned nothing".to_string()).into())
    }
}

impl CommandQueue for Dx12Backend {
    type Fence = Dx12Fence;

    fn signal(&mut self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe {
            self.context
                .command_queue
                .Signal(fence.fence(), value)
                .map_err(|e| DeviceError::Submit(format!("Failed to signal fence: {}", e)))
        }
    }
}

impl GraphicsBackend for Dx12Backend {
    type Options = Dx12Options;

    fn create(options: Dx12Options, surface: &dyn SurfaceProvider, desc: &DeviceDesc) -> Result<Self> {
        if desc.sample_count != 1 {
            return Err(SetupError::PresentationSetupFailed(format!(
                "Flip-model swap chains cannot be multisampled (sample count {})",
                desc.sample_count
            ))
            .into());
        }
        let context = Dx12Context::new(&options, surface, desc)?;

        unsafe {
            let mut command_allocators = Vec::with_capacity(desc.swap_chain_buffers as usize + 1);
            for _ in 0..=desc.swap_chain_buffers {
                let allocator: ID3D12CommandAllocator = context
                    .device
                    .CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)
                    .map_err(|e| SetupError::DeviceCreation(format!("Failed to create command allocator: {}", e)))?;
                command_allocators.push(allocator);
            }

            // 第一帧的 fence 值为 1
            let first = &command_allocators[1 % command_allocators.len()];
            let command_list: ID3D12GraphicsCommandList = context
                .device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, first, None)
                .map_err(|e| SetupError::DeviceCreation(format!("Failed to create command list: {}", e)))?;

            info!(allocators = command_allocators.len(), "DX12 Backend initialization complete");

            Ok(Self {
                swap_chain_format: dxgi_format(desc.color_format.srgb_to_linear()),
                buffer_count: desc.swap_chain_buffers,
                context,
                command_allocators,
                command_list,
                heaps: HashMap::new(),
                resources: HashMap::new(),
                next_resource: 0,
                stencil_views: HashSet::new(),
            })
        }
    }

    fn backend_name(&self) -> &str {
        "DirectX 12"
    }

    fn feature_level(&self) -> FeatureLevel {
        self.context.feature_level
    }

    fn create_fence(&mut self) -> Result<Dx12Fence> {
        Dx12Fence::new(&self.context.device)
    }

    fn create_descriptor_heap(
        &mut self,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<DescriptorHeapLayout> {
        let heap = Dx12DescriptorHeap::new(&self.context.device, kind, capacity, shader_visible)?;
        let layout = heap.layout();
        self.heaps.insert(kind, heap);
        Ok(layout)
    }

    fn swap_chain_size(&self) -> (u32, u32) {
        (self.context.width, self.context.height)
    }

    fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.context.swap_chain.GetCurrentBackBufferIndex() }
    }

    fn acquire_back_buffer(&mut self, index: u32, desc: &TextureDesc) -> Result<Texture> {
        let buffer: ID3D12Resource = unsafe { self.context.swap_chain.GetBuffer(index) }
            .map_err(|e| SetupError::PresentationSetupFailed(format!("Failed to get swap chain buffer {}: {}", index, e)))?;
        let id = self.insert_resource(buffer);
        let desc = TextureDesc {
            width: self.context.width,
            height: self.context.height,
            ..*desc
        };
        Ok(Texture::new(id, desc))
    }

    fn create_depth_texture(&mut self, desc: &TextureDesc) -> Result<Texture> {
        let format = dxgi_format(desc.format);
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Width: desc.width as u64,
            Height: desc.height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_count,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
            Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
            ..Default::default()
        };
        let clear_value = D3D12_CLEAR_VALUE {
            Format: format,
            Anonymous: D3D12_CLEAR_VALUE_0 {
                DepthStencil: D3D12_DEPTH_STENCIL_VALUE { Depth: 1.0, Stencil: 0 },
            },
        };

        let resource = self.create_committed(
            D3D12_HEAP_TYPE_DEFAULT,
            &resource_desc,
            D3D12_RESOURCE_STATE_DEPTH_WRITE,
            Some(&clear_value),
        )?;
        Ok(Texture::new(self.insert_resource(resource), *desc))
    }

    fn create_render_target_view(&mut self, texture: &Texture, handle: CpuDescriptorHandle) -> Result<()> {
        let resource = self.lookup(texture.id)?;
        let view_desc = D3D12_RENDER_TARGET_VIEW_DESC {
            Format: dxgi_format(texture.format()),
            ViewDimension: if texture.sample_count() > 1 {
                D3D12_RTV_DIMENSION_TEXTURE2DMS
            } else {
                D3D12_RTV_DIMENSION_TEXTURE2D
            },
            Anonymous: D3D12_RENDER_TARGET_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_RTV { MipSlice: 0, PlaneSlice: 0 },
            },
        };
        unsafe {
            self.context.device.CreateRenderTargetView(
                resource,
                Some(&view_desc),
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr },
            );
        }
        Ok(())
    }

    fn create_depth_stencil_view(&mut self, texture: &Texture, handle: CpuDescriptorHandle) -> Result<()> {
        let resource = self.lookup(texture.id)?;
        unsafe {
            self.context.device.CreateDepthStencilView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr },
            );
        }
        if texture.format().has_stencil() {
            self.stencil_views.insert(handle.ptr);
        } else {
            self.stencil_views.remove(&handle.ptr);
        }
        Ok(())
    }

    fn resize_buffers(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.context
                .swap_chain
                .ResizeBuffers(
                    self.buffer_count,
                    width,
                    height,
                    self.swap_chain_format,
                    DXGI_SWAP_CHAIN_FLAG(0),
                )
                .map_err(|e| SetupError::PresentationSetupFailed(format!("ResizeBuffers failed: {}", e)))?;
        }
        self.context.width = width;
        self.context.height = height;
        debug!(width, height, "Swap chain buffers resized");
        Ok(())
    }

    fn create_upload_buffer(&mut self, size: u64) -> Result<ResourceId> {
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Alignment: 0,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT_UNKNOWN,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: D3D12_RESOURCE_FLAG_NONE,
        };
        let resource = self.create_committed(
            D3D12_HEAP_TYPE_UPLOAD,
            &resource_desc,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            None,
        )?;
        Ok(self.insert_resource(resource))
    }

    fn release_resource(&mut self, id: ResourceId) {
        self.resources.remove(&id);
    }

    fn resource_barrier(&mut self, resource: ResourceId, before: ResourceState, after: ResourceState) -> Result<()> {
        let resource = self.lookup(resource)?;
        unsafe {
            transition_barrier(&self.command_list, resource, resource_state(before), resource_state(after));
        }
        Ok(())
    }

    fn clear_render_target_view(&mut self, handle: CpuDescriptorHandle, color: [f32; 4]) -> Result<()> {
        unsafe {
            self.command_list
                .ClearRenderTargetView(D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr }, &color, None);
        }
        Ok(())
    }

    fn clear_depth_stencil_view(&mut self, handle: CpuDescriptorHandle, depth: f32, stencil: u8) -> Result<()> {
        let flags = if self.stencil_views.contains(&handle.ptr) {
            D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL
        } else {
            D3D12_CLEAR_FLAG_DEPTH
        };
        unsafe {
            self.command_list.ClearDepthStencilView(
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: handle.ptr },
                flags,
                depth,
                stencil,
                None,
            );
        }
        Ok(())
    }

    fn bind_descriptor_heaps(&mut self, kinds: &[DescriptorHeapKind]) -> Result<()> {
        let heaps = kinds
            .iter()
            .map(|kind| {
                self.heaps
                    .get(kind)
                    .map(|heap| Some(heap.heap().clone()))
                    .ok_or_else(|| DeviceError::InvalidArgument(format!("{} heap has not been created", kind)))
            })
            .collect::<Result<Vec<_>>>()?;
        unsafe {
            self.command_list.SetDescriptorHeaps(&heaps);
        }
        Ok(())
    }

    fn close_command_list(&mut self) -> Result<()> {
        unsafe { self.command_list.Close() }
            .map_err(|e| DeviceError::Submit(format!("Failed to close command list: {}", e)))
    }

    fn execute_command_list(&mut self) -> Result<()> {
        let list: ID3D12CommandList = self
            .command_list
            .cast()
            .map_err(|e| DeviceError::Submit(format!("Invalid command list: {}", e)))?;
        unsafe {
            self.context.command_queue.ExecuteCommandLists(&[Some(list)]);
        }
        Ok(())
    }

    fn reset_command_list(&mut self, frame_fence_value: u64) -> Result<()> {
        let index = (frame_fence_value % self.command_allocators.len() as u64) as usize;
        let allocator = &self.command_allocators[index];
        unsafe {
            allocator
                .Reset()
                .map_err(|e| DeviceError::Submit(format!("Failed to reset command allocator: {}", e)))?;
            self.command_list
                .Reset(allocator, None)
                .map_err(|e| DeviceError::Submit(format!("Failed to reset command list: {}", e)))?;
        }
        Ok(())
    }

    fn present(&mut self, sync_interval: u32) -> Result<PresentStatus> {
        let hr = unsafe { self.context.swap_chain.Present(sync_interval, DXGI_PRESENT(0)) };
        if hr == DXGI_STATUS_OCCLUDED {
            return Ok(PresentStatus::Occluded);
        }
        hr.ok()
            .map_err(|e| DeviceError::Submit(format!("Present failed: {}", e)))?;
        Ok(PresentStatus::Ok)
    }

    fn test_present(&mut self) -> Result<PresentStatus> {
        let hr = unsafe { self.context.swap_chain.Present(0, DXGI_PRESENT_TEST) };
        Ok(if hr == DXGI_STATUS_OCCLUDED {
            PresentStatus::Occluded
        } else {
            PresentStatus::Ok
        })
    }
}

/// 录制状态转换屏障，不增加资源的引用计数
unsafe fn transition_barrier(
    command_list: &ID3D12GraphicsCommandList,
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) {
    let barriers = [D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                // 借用的指针，ManuallyDrop 保证不会 Release
                pResource: std::mem::transmute_copy(resource),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }];
    command_list.ResourceBarrier(&barriers);
}
