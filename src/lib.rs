//! render_core - D3D12 风格的设备与资源生命周期核心
//!
//! 本库管理一个图形设备的生命周期：描述符槽位堆、帧 fence、
//! 交换链帧目标环、临时上传内存和延迟释放，以及驱动它们的呈现/调整大小协议。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（配置、日志、错误处理）
//! - `renderer`: 与图形 API 无关的设备层
//! - `gfx`: 图形后端（DirectX 12 和模拟 GPU）
//!
//! # 使用示例
//!
//! ```no_run
//! use render_core::gfx::headless::{HeadlessBackend, HeadlessGpu, HeadlessSurface};
//! use render_core::renderer::{Device, DeviceDesc};
//!
//! let surface = HeadlessSurface::new(1280, 720);
//! let mut device =
//!     Device::<HeadlessBackend>::create(HeadlessGpu::new(), &surface, DeviceDesc::default())?;
//!
//! {
//!     let mut ctx = device.render_context()?;
//!     let target = ctx.target();
//!     ctx.clear_color(target, [0.1, 0.2, 0.3, 1.0])?;
//! }
//! device.present()?;
//! # Ok::<(), render_core::core::DeviceError>(())
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
