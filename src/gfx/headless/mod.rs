//! 模拟 GPU 后端模块
//!
//! 不依赖任何图形 API 的后端实现，用于测试和无窗口运行：
//! - Context: 模拟 GPU 的共享状态（fence 完成值、命令日志、故障注入）
//! - Backend: `GraphicsBackend` 实现

pub mod backend;
pub mod context;

use raw_window_handle::RawWindowHandle;

use crate::gfx::backend::SurfaceProvider;

// 重新导出常用类型
pub use backend::HeadlessBackend;
pub use context::{HeadlessFence, HeadlessGpu, RecordedCommand, ResourceKind};

/// 没有窗口的呈现表面
#[derive(Debug, Clone, Copy)]
pub struct HeadlessSurface {
    width: u32,
    height: u32,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl SurfaceProvider for HeadlessSurface {
    fn client_area_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn window_handle(&self) -> Option<RawWindowHandle> {
        None
    }
}
