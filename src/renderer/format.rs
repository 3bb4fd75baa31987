//! 资源格式与特性级别
//!
//! 与图形 API 无关的格式枚举，由各后端映射到原生格式。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 纹理格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFormat {
    /// RGBA 8位无符号归一化
    Rgba8Unorm,
    /// RGBA 8位sRGB
    Rgba8UnormSrgb,
    /// BGRA 8位无符号归一化
    Bgra8Unorm,
    /// BGRA 8位sRGB
    Bgra8UnormSrgb,
    /// RGB 10位 + A 2位
    Rgb10a2Unorm,
    /// RGBA 16位浮点
    Rgba16Float,
    /// 深度 16位
    D16Unorm,
    /// 深度 24位 + 模板 8位
    D24UnormS8,
    /// 深度 32位浮点
    D32Float,
    /// 深度 32位浮点 + 模板 8位
    D32FloatS8X24,
}

impl ResourceFormat {
    /// 是否为深度（模板）格式
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            ResourceFormat::D16Unorm
                | ResourceFormat::D24UnormS8
                | ResourceFormat::D32Float
                | ResourceFormat::D32FloatS8X24
        )
    }

    /// 是否包含模板分量
    pub fn has_stencil(&self) -> bool {
        matches!(self, ResourceFormat::D24UnormS8 | ResourceFormat::D32FloatS8X24)
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self, ResourceFormat::Rgba8UnormSrgb | ResourceFormat::Bgra8UnormSrgb)
    }

    /// 去掉 sRGB 后的线性格式
    ///
    /// flip 模型的交换链不接受 sRGB 格式，交换链缓冲区使用线性格式创建，
    /// 渲染目标视图仍然使用 sRGB 格式。
    pub fn srgb_to_linear(self) -> Self {
        match self {
            ResourceFormat::Rgba8UnormSrgb => ResourceFormat::Rgba8Unorm,
            ResourceFormat::Bgra8UnormSrgb => ResourceFormat::Bgra8Unorm,
            other => other,
        }
    }

    /// 每个像素的字节数
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ResourceFormat::D16Unorm => 2,
            ResourceFormat::Rgba16Float | ResourceFormat::D32FloatS8X24 => 8,
            _ => 4,
        }
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 设备特性级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    Level9_1,
    Level9_2,
    Level9_3,
    Level10_0,
    Level10_1,
    Level11_0,
    Level11_1,
    Level12_0,
    Level12_1,
}

impl FeatureLevel {
    /// 把请求的 API 版本映射到特性级别
    ///
    /// 不认识的版本返回 `None`。
    pub fn from_version(major: u32, minor: u32) -> Option<Self> {
        let level = match (major, minor) {
            (9, 1) => FeatureLevel::Level9_1,
            (9, 2) => FeatureLevel::Level9_2,
            (9, 3) => FeatureLevel::Level9_3,
            (10, 0) => FeatureLevel::Level10_0,
            (10, 1) => FeatureLevel::Level10_1,
            (11, 0) => FeatureLevel::Level11_0,
            (11, 1) => FeatureLevel::Level11_1,
            (12, 0) => FeatureLevel::Level12_0,
            (12, 1) => FeatureLevel::Level12_1,
            _ => return None,
        };
        Some(level)
    }

    /// 对应的 (major, minor) 版本号
    pub fn version(&self) -> (u32, u32) {
        match self {
            FeatureLevel::Level9_1 => (9, 1),
            FeatureLevel::Level9_2 => (9, 2),
            FeatureLevel::Level9_3 => (9, 3),
            FeatureLevel::Level10_0 => (10, 0),
            FeatureLevel::Level10_1 => (10, 1),
            FeatureLevel::Level11_0 => (11, 0),
            FeatureLevel::Level11_1 => (11, 1),
            FeatureLevel::Level12_0 => (12, 0),
            FeatureLevel::Level12_1 => (12, 1),
        }
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor) = self.version();
        write!(f, "{}_{}", major, minor)
    }
}
