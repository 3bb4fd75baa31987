//! 配置管理模块
//!
//! 提供设备配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "render_core"
//!
//! [device]
//! backend = "headless"        # 或 "dx12"
//! color_format = "rgba8_unorm_srgb"
//! depth_format = "d24_unorm_s8"
//! api_major_version = 12
//! api_minor_version = 0
//! vsync = false
//! debug_layer = true
//! swap_chain_buffers = 3
//! sample_count = 1
//!
//! [heaps]
//! shader_resource = 16384
//! sampler = 2048
//! render_target = 1024
//! depth_stencil = 1024
//!
//! [allocator]
//! capacity_bytes = 2097152
//!
//! [headless]
//! frames = 240
//! gpu_latency_ms = 4
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::renderer::descriptor::HeapCapacities;
use crate::renderer::device::DeviceDesc;
use crate::renderer::format::{FeatureLevel, ResourceFormat};

/// 交换链缓冲区数量上限（DXGI 限制）
pub const MAX_SWAP_CHAIN_BUFFERS: u32 = 16;

/// 帧目标采样数上限
pub const MAX_SAMPLE_COUNT: u32 = 32;

/// 引擎配置
///
/// 包含了设备运行所需的所有配置项。缺失的段落和字段使用默认值。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 设备配置
    #[serde(default)]
    pub device: DeviceConfig,

    /// 描述符堆容量
    #[serde(default)]
    pub heaps: HeapCapacities,

    /// 临时上传内存配置
    #[serde(default)]
    pub allocator: AllocatorConfig,

    /// 无窗口模式配置
    #[serde(default)]
    pub headless: HeadlessConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,
}

/// 设备配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// 颜色缓冲区格式
    #[serde(default = "default_color_format")]
    pub color_format: ResourceFormat,

    /// 深度缓冲区格式
    #[serde(default = "default_depth_format")]
    pub depth_format: ResourceFormat,

    /// 请求的 API 主版本号
    #[serde(default = "default_api_major")]
    pub api_major_version: u32,

    /// 请求的 API 次版本号
    #[serde(default = "default_api_minor")]
    pub api_minor_version: u32,

    /// 垂直同步
    #[serde(default)]
    pub vsync: bool,

    /// 是否启用调试层（Debug 构建默认开启）
    #[serde(default = "default_debug_layer")]
    pub debug_layer: bool,

    /// 交换链缓冲区数量（环深度 N）
    #[serde(default = "default_swap_chain_buffers")]
    pub swap_chain_buffers: u32,

    /// 帧目标采样数（D3D12 翻转模型交换链只支持 1）
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 模拟 GPU（任何平台可用）
    Headless,
    /// DirectX 12 后端（仅 Windows）
    Dx12,
}

/// 临时上传内存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// 上传缓冲区大小（字节）
    #[serde(default = "default_allocator_bytes")]
    pub capacity_bytes: u64,
}

/// 无窗口模式配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessConfig {
    /// 运行的帧数
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// 模拟的 GPU 每帧耗时（毫秒）
    #[serde(default = "default_gpu_latency")]
    pub gpu_latency_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "render_core".to_string() }
fn default_backend() -> BackendKind {
    if cfg!(target_os = "windows") { BackendKind::Dx12 } else { BackendKind::Headless }
}
fn default_color_format() -> ResourceFormat { ResourceFormat::Rgba8UnormSrgb }
fn default_depth_format() -> ResourceFormat { ResourceFormat::D24UnormS8 }
fn default_api_major() -> u32 { 12 }
fn default_api_minor() -> u32 { 0 }
fn default_debug_layer() -> bool { cfg!(debug_assertions) }
fn default_swap_chain_buffers() -> u32 { 3 }
fn default_sample_count() -> u32 { 1 }
fn default_allocator_bytes() -> u64 { 2 * 1024 * 1024 }
fn default_frames() -> u64 { 240 }
fn default_gpu_latency() -> u64 { 4 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "render_core.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            color_format: default_color_format(),
            depth_format: default_depth_format(),
            api_major_version: default_api_major(),
            api_minor_version: default_api_minor(),
            vsync: false,
            debug_layer: default_debug_layer(),
            swap_chain_buffers: default_swap_chain_buffers(),
            sample_count: default_sample_count(),
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { capacity_bytes: default_allocator_bytes() }
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            gpu_latency_ms: default_gpu_latency(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use render_core::core::Config;
    ///
    /// let config = Config::from_file("config.toml")?;
    /// # Ok::<(), render_core::core::DeviceError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在或无法解析则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--headless`: 使用模拟 GPU
    /// - `--dx12`: 使用 DirectX 12 后端
    /// - `--vsync`: 开启垂直同步
    /// - `--width <value>` / `--height <value>`: 窗口尺寸
    /// - `--frames <value>`: 无窗口模式运行的帧数
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--headless") {
            self.device.backend = BackendKind::Headless;
        }
        if args.iter().any(|a| a == "--dx12") {
            self.device.backend = BackendKind::Dx12;
        }
        if args.iter().any(|a| a == "--vsync") {
            self.device.vsync = true;
        }

        if let Some(width) = parse_flag(&args, "--width") {
            self.window.width = width;
        }
        if let Some(height) = parse_flag(&args, "--height") {
            self.window.height = height;
        }
        if let Some(frames) = parse_flag(&args, "--frames") {
            self.headless.frames = frames;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid("window.width/height", "Window dimensions must be greater than 0"));
        }

        if !(2..=MAX_SWAP_CHAIN_BUFFERS).contains(&self.device.swap_chain_buffers) {
            return Err(invalid(
                "device.swap_chain_buffers",
                &format!("Swap chain buffer count must be between 2 and {}", MAX_SWAP_CHAIN_BUFFERS),
            ));
        }

        let samples = self.device.sample_count;
        if !samples.is_power_of_two() || samples > MAX_SAMPLE_COUNT {
            return Err(invalid(
                "device.sample_count",
                &format!("Sample count must be a power of two no greater than {}", MAX_SAMPLE_COUNT),
            ));
        }

        if self.device.color_format.is_depth() {
            return Err(invalid("device.color_format", "Color format cannot be a depth format"));
        }
        if !self.device.depth_format.is_depth() {
            return Err(invalid("device.depth_format", "Depth format must be a depth format"));
        }

        if FeatureLevel::from_version(self.device.api_major_version, self.device.api_minor_version).is_none() {
            return Err(invalid(
                "device.api_major_version/api_minor_version",
                &format!(
                    "API version {}.{} has no matching feature level",
                    self.device.api_major_version, self.device.api_minor_version
                ),
            ));
        }

        if let Some(kind) = self.heaps.first_empty() {
            return Err(invalid("heaps", &format!("{} heap capacity must be greater than 0", kind)));
        }

        if self.allocator.capacity_bytes == 0 {
            return Err(invalid("allocator.capacity_bytes", "Allocator capacity must be greater than 0"));
        }

        Ok(())
    }

    /// 生成设备创建描述
    pub fn device_desc(&self) -> DeviceDesc {
        DeviceDesc {
            color_format: self.device.color_format,
            depth_format: self.device.depth_format,
            api_major_version: self.device.api_major_version,
            api_minor_version: self.device.api_minor_version,
            enable_vsync: self.device.vsync,
            enable_debug_layer: self.device.debug_layer,
            swap_chain_buffers: self.device.swap_chain_buffers,
            sample_count: self.device.sample_count,
            heap_capacities: self.heaps.clone(),
            transient_allocator_bytes: self.allocator.capacity_bytes,
        }
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

fn invalid(field: &str, reason: &str) -> super::error::DeviceError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl BackendKind {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Headless => "Headless",
            BackendKind::Dx12 => "DirectX 12",
        }
    }
}
