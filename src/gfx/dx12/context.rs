//! DirectX 12 设备上下文
//!
//! 负责启动期的原生对象创建：
//!
//! 1. 启用调试层（可选）
//! 2. 创建 DXGI 工厂
//! 3. 选择硬件适配器并创建 D3D12 设备
//! 4. 创建直接命令队列
//! 5. 创建 FLIP_DISCARD 交换链
//!
//! 以及基于事件等待的 `Dx12Fence`。

use std::fmt;

use raw_window_handle::RawWindowHandle;
use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use super::format::{dxgi_format, feature_level};
use crate::core::error::{DeviceError, Result, SetupError};
use crate::gfx::backend::SurfaceProvider;
use crate::renderer::device::DeviceDesc;
use crate::renderer::format::FeatureLevel;
use crate::renderer::sync::FencePrimitive;

/// 自定义设备创建回调
///
/// 对每个候选适配器调用，返回 `None` 表示跳过该适配器。
pub type CreateDeviceFn = dyn Fn(&IDXGIAdapter1, D3D_FEATURE_LEVEL) -> Option<ID3D12Device>;

/// DX12 后端的创建选项
#[derive(Default)]
pub struct Dx12Options {
    /// 没有硬件适配器时允许使用软件适配器（WARP）
    pub allow_software_adapter: bool,
    /// 替代 `D3D12CreateDevice` 的设备创建回调
    pub create_device: Option<Box<CreateDeviceFn>>,
}

impl fmt::Debug for Dx12Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dx12Options")
            .field("allow_software_adapter", &self.allow_software_adapter)
            .field("create_device", &self.create_device.is_some())
            .finish()
    }
}

/// DirectX 12 设备上下文
pub struct Dx12Context {
    pub factory: IDXGIFactory4,
    pub adapter: IDXGIAdapter1,
    pub device: ID3D12Device,
    pub command_queue: ID3D12CommandQueue,
    pub swap_chain: IDXGISwapChain3,
    pub feature_level: FeatureLevel,
    pub width: u32,
    pub height: u32,
}

impl Dx12Context {
    /// 创建设备、命令队列和交换链
    ///
    /// 交换链使用颜色格式对应的线性格式，sRGB 由渲染目标视图负责。
    pub fn new(options: &Dx12Options, surface: &dyn SurfaceProvider, desc: &DeviceDesc) -> Result<Self> {
        let level = desc.feature_level()?;
        let (width, height) = surface.client_area_size();
        let (width, height) = (width.max(1), height.max(1));

        unsafe {
            if desc.enable_debug_layer {
                let mut debug: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug) {
                    Ok(()) => {
                        if let Some(debug) = debug {
                            debug.EnableDebugLayer();
                            debug!("DX12 Debug Layer enabled");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to enable DX12 Debug Layer"),
                }
            }

            let factory_flags = if desc.enable_debug_layer {
                DXGI_CREATE_FACTORY_DEBUG
            } else {
                DXGI_CREATE_FACTORY_FLAGS(0)
            };
            let factory: IDXGIFactory4 = CreateDXGIFactory2(factory_flags)
                .map_err(|e| SetupError::DeviceCreation(format!("Failed to create DXGI factory: {}", e)))?;

            let (adapter, device) = select_adapter(&factory, level, options)
                .ok_or_else(|| {
                    let (major, minor) = level.version();
                    SetupError::NoCompatibleAdapter { major, minor }
                })?;

            let queue_desc = D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                ..Default::default()
            };
            let command_queue: ID3D12CommandQueue = device.CreateCommandQueue(&queue_desc).map_err(|e| {
                SetupError::PresentationSetupFailed(format!("Failed to create command queue: {}", e))
            })?;

            let hwnd = match surface.window_handle() {
                Some(RawWindowHandle::Win32(handle)) => HWND(handle.hwnd.get() as *mut core::ffi::c_void),
                _ => {
                    return Err(SetupError::PresentationSetupFailed(
                        "A Win32 window handle is required".to_string(),
                    )
                    .into())
                }
            };

            let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: width,
                Height: height,
                Format: dxgi_format(desc.color_format.srgb_to_linear()),
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: desc.swap_chain_buffers,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                ..Default::default()
            };
            let swap_chain: IDXGISwapChain1 = factory
                .CreateSwapChainForHwnd(&command_queue, hwnd, &swap_chain_desc, None, None)
                .map_err(|e| SetupError::PresentationSetupFailed(format!("Failed to create swap chain: {}", e)))?;
            let swap_chain: IDXGISwapChain3 = swap_chain
                .cast()
                .map_err(|e| SetupError::PresentationSetupFailed(format!("IDXGISwapChain3 unavailable: {}", e)))?;

            // 全屏切换由应用自己处理
            if let Err(e) = factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) {
                warn!(error = %e, "Failed to disable Alt+Enter");
            }

            info!(width, height, buffers = desc.swap_chain_buffers, "Swap chain created");

            Ok(Self {
                factory,
                adapter,
                device,
                command_queue,
                swap_chain,
                feature_level: level,
                width,
                height,
            })
        }
    }
}

/// 选择第一个能以 `level` 创建设备的适配器
///
/// 软件适配器排在所有硬件适配器之后，且只有 `allow_software_adapter` 时才会使用。
unsafe fn select_adapter(
    factory: &IDXGIFactory4,
    level: FeatureLevel,
    options: &Dx12Options,
) -> Option<(IDXGIAdapter1, ID3D12Device)> {
    let mut software = Vec::new();

    for i in 0.. {
        let adapter = match factory.EnumAdapters1(i) {
            Ok(adapter) => adapter,
            Err(_) => break,
        };
        let Ok(adapter_desc) = adapter.GetDesc1() else {
            continue;
        };

        if (adapter_desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32) != 0 {
            software.push(adapter);
            continue;
        }

        if let Some(device) = create_device(options, &adapter, level) {
            let name = String::from_utf16_lossy(&adapter_desc.Description);
            info!(adapter = name.trim_end_matches('\0'), feature_level = %level, "D3D12 device created");
            return Some((adapter, device));
        }
    }

    if options.allow_software_adapter {
        for adapter in software {
            if let Some(device) = create_device(options, &adapter, level) {
                warn!(feature_level = %level, "Using software adapter");
                return Some((adapter, device));
            }
        }
    }

    None
}

unsafe fn create_device(options: &Dx12Options, adapter: &IDXGIAdapter1, level: FeatureLevel) -> Option<ID3D12Device> {
    if let Some(create) = &options.create_device {
        return create(adapter, feature_level(level));
    }
    let mut device: Option<ID3D12Device> = None;
    D3D12CreateDevice(adapter, feature_level(level), &mut device).ok()?;
    device
}

/// 基于事件等待的 D3D12 fence
pub struct Dx12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

// ID3D12Fence 是自由线程对象，事件句柄只在等待时使用
unsafe impl Send for Dx12Fence {}

impl Dx12Fence {
    pub fn new(device: &ID3D12Device) -> Result<Self> {
        unsafe {
            let fence: ID3D12Fence = device
                .CreateFence(0, D3D12_FENCE_FLAG_NONE)
                .map_err(|e| SetupError::DeviceCreation(format!("Failed to create fence: {}", e)))?;
            let event = CreateEventA(None, false, false, None)
                .map_err(|e| SetupError::DeviceCreation(format!("Failed to create fence event: {}", e)))?;
            Ok(Self { fence, event })
        }
    }

    pub fn fence(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl FencePrimitive for Dx12Fence {
    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn wait_until_at_least(&self, value: u64) -> Result<()> {
        unsafe {
            if self.fence.GetCompletedValue() < value {
                self.fence
                    .SetEventOnCompletion(value, self.event)
                    .map_err(|e| DeviceError::Sync(format!("SetEventOnCompletion failed: {}", e)))?;
                WaitForSingleObject(self.event, INFINITE);
            }
        }
        Ok(())
    }
}

impl Drop for Dx12Fence {
    fn drop(&mut self) {
        unsafe {
            if !self.event.is_invalid() {
                let _ = CloseHandle(self.event);
            }
        }
    }
}
