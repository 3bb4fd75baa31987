//! 设备层枚举到 D3D12 / DXGI 原生枚举的转换

use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::renderer::descriptor::DescriptorHeapKind;
use crate::renderer::format::{FeatureLevel, ResourceFormat};
use crate::renderer::resource::ResourceState;

pub fn dxgi_format(format: ResourceFormat) -> DXGI_FORMAT {
    match format {
        ResourceFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        ResourceFormat::Rgba8UnormSrgb => DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
        ResourceFormat::Bgra8Unorm => DXGI_FORMAT_B8G8R8A8_UNORM,
        ResourceFormat::Bgra8UnormSrgb => DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
        ResourceFormat::Rgb10a2Unorm => DXGI_FORMAT_R10G10B10A2_UNORM,
        ResourceFormat::Rgba16Float => DXGI_FORMAT_R16G16B16A16_FLOAT,
        ResourceFormat::D16Unorm => DXGI_FORMAT_D16_UNORM,
        ResourceFormat::D24UnormS8 => DXGI_FORMAT_D24_UNORM_S8_UINT,
        ResourceFormat::D32Float => DXGI_FORMAT_D32_FLOAT,
        ResourceFormat::D32FloatS8X24 => DXGI_FORMAT_D32_FLOAT_S8X24_UINT,
    }
}

pub fn feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::Level9_1 => D3D_FEATURE_LEVEL_9_1,
        FeatureLevel::Level9_2 => D3D_FEATURE_LEVEL_9_2,
        FeatureLevel::Level9_3 => D3D_FEATURE_LEVEL_9_3,
        FeatureLevel::Level10_0 => D3D_FEATURE_LEVEL_10_0,
        FeatureLevel::Level10_1 => D3D_FEATURE_LEVEL_10_1,
        FeatureLevel::Level11_0 => D3D_FEATURE_LEVEL_11_0,
        FeatureLevel::Level11_1 => D3D_FEATURE_LEVEL_11_1,
        FeatureLevel::Level12_0 => D3D_FEATURE_LEVEL_12_0,
        FeatureLevel::Level12_1 => D3D_FEATURE_LEVEL_12_1,
    }
}

pub fn heap_type(kind: DescriptorHeapKind) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match kind {
        DescriptorHeapKind::ShaderResource => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        DescriptorHeapKind::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
        DescriptorHeapKind::RenderTarget => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorHeapKind::DepthStencil => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    }
}

pub fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Common => D3D12_RESOURCE_STATE_GENERIC_READ,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
        ResourceState::DepthWrite => D3D12_RESOURCE_STATE_DEPTH_WRITE,
        ResourceState::ShaderResource => {
            D3D12_RESOURCE_STATE_PIXEL_SHADER_RESOURCE | D3D12_RESOURCE_STATE_NON_PIXEL_SHADER_RESOURCE
        }
        ResourceState::CopyDest => D3D12_RESOURCE_STATE_COPY_DEST,
        ResourceState::CopySource => D3D12_RESOURCE_STATE_COPY_SOURCE,
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
    }
}
