//! 资源管理模块
//!
//! 定义后端无关的 GPU 资源标识、资源状态和纹理描述。
//! 原生资源对象由后端持有，设备层只通过 `ResourceId` 引用它们。

use std::fmt;

use super::format::ResourceFormat;

/// GPU 资源标识
///
/// 由后端分配，在资源生命周期内唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 资源状态（用于资源屏障）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// 通用读状态（上传堆资源的初始状态）
    Common,
    /// 渲染目标
    RenderTarget,
    /// 深度写入
    DepthWrite,
    /// 着色器资源
    ShaderResource,
    /// 复制目标
    CopyDest,
    /// 复制源
    CopySource,
    /// 呈现
    Present,
}

/// 纹理描述信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 纹理格式
    pub format: ResourceFormat,
    /// 采样数
    pub sample_count: u32,
}

impl TextureDesc {
    /// 创建单采样纹理描述
    pub fn new(width: u32, height: u32, format: ResourceFormat) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: 1,
        }
    }

    /// 设置采样数
    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// 纹理占用的字节数（不含 mip）
    pub fn byte_size(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.format.bytes_per_pixel() as u64
            * self.sample_count as u64
    }
}

/// 纹理
///
/// 后端资源的句柄加上创建时的描述。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    /// 资源标识
    pub id: ResourceId,
    /// 描述
    pub desc: TextureDesc,
}

impl Texture {
    pub fn new(id: ResourceId, desc: TextureDesc) -> Self {
        Self { id, desc }
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> ResourceFormat {
        self.desc.format
    }

    pub fn sample_count(&self) -> u32 {
        self.desc.sample_count
    }
}
