//! 日志系统模块
//!
//! 基于 `tracing` 提供结构化的日志记录功能。
//! 设备核心内部统一使用 `tracing` 宏：
//!
//! - `info!`：设备创建、交换链重建、关闭等生命周期事件
//! - `debug!`：描述符堆创建、延迟释放回收等
//! - `trace!`：每帧的提交、呈现、fence 信号
//! - `warn!` / `error!`：可恢复异常 / 致命错误
//!
//! # 使用示例
//!
//! ```no_run
//! use render_core::core::config::LogLevel;
//! use render_core::core::log;
//!
//! // 仅控制台输出
//! log::init_logger(LogLevel::Info, false, None);
//! tracing::info!(width = 800, height = 600, "Swap chain created");
//! ```

use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use super::config::LogLevel;

/// 默认日志文件名
const DEFAULT_LOG_FILE: &str = "render_core.log";

/// 初始化日志系统
///
/// 在程序开始时调用。`RUST_LOG` 环境变量存在时优先于 `level`；
/// 重复初始化只会记录一条警告。
///
/// # 参数
///
/// * `level` - 日志级别
/// * `file_output` - 是否同时输出到文件（按天滚动）
/// * `log_file_path` - 日志文件路径（可选，默认为 "render_core.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let file_layer = file_output.then(|| {
        let (directory, filename) = split_log_path(log_file_path.unwrap_or(DEFAULT_LOG_FILE));
        fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(RollingFileAppender::new(Rotation::DAILY, directory, filename))
    });

    // 只写控制台时额外记录 span 关闭事件（每帧的提交耗时）
    let span_events = if file_output { FmtSpan::NONE } else { FmtSpan::CLOSE };
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(span_events)
        .with_ansi(true);

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if result.is_err() {
        tracing::warn!("Logger already initialized, ignoring");
    }
}

/// 把日志路径拆成 (目录, 文件名)
fn split_log_path(log_path: &str) -> (PathBuf, String) {
    let path = Path::new(log_path);
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (directory, filename)
}

impl LogLevel {
    /// `EnvFilter` 使用的过滤字符串
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// 日志级别转换
impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path("logs/device.log");
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, "device.log");

        let (dir, name) = split_log_path("device.log");
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "device.log");
    }
}
