//! DirectX 12 图形 API 实现模块
//!
//! 本模块包含了所有 DirectX 12 相关的代码，包括：
//! - Context: DX12 设备、命令队列、交换链和 fence
//! - Backend: `GraphicsBackend` 实现
//! - Descriptor: DX12 原生描述符堆
//! - Format: 格式、状态和特性级别的转换

pub mod backend;
pub mod context;
pub mod descriptor;
pub mod format;

// 重新导出常用类型
pub use backend::Dx12Backend;
pub use context::{Dx12Context, Dx12Fence, Dx12Options};
