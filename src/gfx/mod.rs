//! 图形后端模块
//!
//! 本模块封装了设备层之下的原生实现：
//! - DirectX 12：Windows 平台的图形 API
//! - Headless：模拟 GPU，可在任何平台上运行，带有命令日志和故障注入
//!
//! 所有后端都实现了统一的 `GraphicsBackend` trait，
//! `renderer::Device` 对具体后端是泛型的。

pub mod backend;
#[cfg(target_os = "windows")]
pub mod dx12;
pub mod headless;

pub use backend::{CommandQueue, GraphicsBackend, PresentStatus, SurfaceProvider};
#[cfg(target_os = "windows")]
pub use dx12::{Dx12Backend, Dx12Options};
pub use headless::{HeadlessBackend, HeadlessGpu, HeadlessSurface};
