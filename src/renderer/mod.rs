//! 渲染器模块
//!
//! 本模块提供与具体图形 API 无关的设备与资源生命周期管理：
//! 描述符槽位堆、帧 fence、帧目标环、临时上传内存、延迟释放，
//! 以及把它们组合在一起驱动呈现协议的 `Device`。
//!
//! # 架构设计
//!
//! - `Device`：顶层对象，对外提供 `present` / `resize_swap_chain` 等 API
//! - `RenderContext`：每帧录制命令的借用视图
//! - 底层实现在 `gfx` 模块中，通过 `GraphicsBackend` trait 接入

pub mod allocator;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptor;
pub mod device;
pub mod format;
pub mod frame;
pub mod resource;
pub mod sync;

pub use allocator::{ResourceAllocator, TransientAllocation};
pub use context::RenderContext;
pub use descriptor::{DescriptorHeapKind, DescriptorSlotHeap, HeapCapacities};
pub use device::{Device, DeviceDesc, DeviceRegistry, DeviceState, PresentOutcome};
pub use format::{FeatureLevel, ResourceFormat};
pub use frame::FrameTarget;
pub use resource::{ResourceId, ResourceState, Texture, TextureDesc};
pub use sync::{FencePrimitive, FrameFence};
