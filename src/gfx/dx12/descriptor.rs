//! DirectX 12 描述符堆
//!
//! 只负责原生堆对象的创建和地址布局。槽位的分配与回收由
//! `renderer::descriptor::DescriptorSlotHeap` 完成。

use windows::Win32::Graphics::Direct3D12::*;

use super::format::heap_type;
use crate::core::error::{DescriptorError, Result};
use crate::renderer::descriptor::{DescriptorHeapKind, DescriptorHeapLayout};

/// DX12 描述符堆
pub struct Dx12DescriptorHeap {
    /// 底层 DX12 描述符堆
    heap: ID3D12DescriptorHeap,
    kind: DescriptorHeapKind,
    layout: DescriptorHeapLayout,
}

impl Dx12DescriptorHeap {
    /// 创建新的 DX12 描述符堆
    ///
    /// # 参数
    ///
    /// * `device` - DX12 设备
    /// * `kind` - 堆类型
    /// * `capacity` - 描述符数量
    /// * `shader_visible` - 是否着色器可见
    ///
    /// # 返回值
    ///
    /// 设备拒绝创建时返回 `DescriptorError::HeapAllocation`
    pub fn new(
        device: &ID3D12Device,
        kind: DescriptorHeapKind,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<Self> {
        let heap_type = heap_type(kind);
        let heap_desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type,
            NumDescriptors: capacity,
            Flags: if shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };

        unsafe {
            let heap: ID3D12DescriptorHeap = device.CreateDescriptorHeap(&heap_desc).map_err(|e| {
                DescriptorError::HeapAllocation {
                    kind,
                    capacity,
                    reason: e.to_string(),
                }
            })?;

            let wide_name: Vec<u16> = format!("{} heap", kind.name())
                .encode_utf16()
                .chain(Some(0))
                .collect();
            let _ = heap.SetName(windows::core::PCWSTR(wide_name.as_ptr()));

            let layout = DescriptorHeapLayout {
                cpu_start: heap.GetCPUDescriptorHandleForHeapStart().ptr,
                gpu_start: shader_visible.then(|| heap.GetGPUDescriptorHandleForHeapStart().ptr),
                stride: device.GetDescriptorHandleIncrementSize(heap_type),
            };

            Ok(Self { heap, kind, layout })
        }
    }

    /// 获取底层 DX12 描述符堆
    pub fn heap(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn layout(&self) -> DescriptorHeapLayout {
        self.layout
    }
}
