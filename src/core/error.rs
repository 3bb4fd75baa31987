//! 错误处理模块
//!
//! 定义了设备核心中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - `Setup`：适配器、设备、命令队列、交换链创建失败（启动期致命错误）
//! - `Descriptor`：描述符堆错误，其中 `OutOfSlots` 是唯一可恢复的帧内错误
//! - `Submit`：命令列表关闭/提交/呈现失败（致命，GPU 状态未定义）
//! - `Allocation`：临时上传内存分配失败
//!
//! 注意：因窗口调整大小而丢弃的帧不是错误，见 `PresentOutcome::Skipped`。

use thiserror::Error;

use crate::renderer::descriptor::DescriptorHeapKind;

/// 设备核心统一的 Result 类型
pub type Result<T> = std::result::Result<T, DeviceError>;

/// 设备核心的错误类型
#[derive(Debug, Error)]
pub enum DeviceError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 设备创建阶段的错误
    #[error("Device setup failed: {0}")]
    Setup(#[from] SetupError),

    /// 描述符堆错误
    #[error("Descriptor heap error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// 临时内存分配错误
    #[error("Transient allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    /// 命令列表关闭、提交或呈现失败
    ///
    /// 这是致命错误：命令队列处于不可恢复状态，设备会进入 `Lost` 状态。
    #[error("Command submission failed: {0}")]
    Submit(String),

    /// 同步错误（例如等待一个从未入队的 fence 值）
    #[error("Synchronization error: {0}")]
    Sync(String),

    /// 参数无效
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 设备创建相关的错误
#[derive(Debug, Error)]
pub enum SetupError {
    /// 已经存在一个活动的设备
    #[error("Only a single device may be live at a time")]
    DeviceAlreadyExists,

    /// 找不到支持所需特性级别的硬件适配器
    #[error("Could not find a GPU that supports feature level {major}.{minor}")]
    NoCompatibleAdapter { major: u32, minor: u32 },

    /// 请求的 API 版本无法映射到特性级别
    #[error("Unsupported API version {major}.{minor}")]
    UnsupportedApiVersion { major: u32, minor: u32 },

    /// 命令队列或交换链创建失败
    #[error("Presentation setup failed: {0}")]
    PresentationSetupFailed(String),

    /// 其它设备级对象创建失败（fence、命令分配器、上传缓冲区等）
    #[error("Device object creation failed: {0}")]
    DeviceCreation(String),
}

/// 描述符堆相关的错误
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// 堆已耗尽：回收队列为空且高水位游标已达到容量
    #[error("{kind} descriptor heap is out of slots (capacity {capacity})")]
    OutOfSlots { kind: DescriptorHeapKind, capacity: u32 },

    /// 索引超出已初始化的高水位范围
    #[error("{kind} descriptor slot {index} is beyond the high-water mark {high_water}")]
    InvalidSlot { kind: DescriptorHeapKind, index: u32, high_water: u32 },

    /// 释放一个未分配的槽位
    #[error("{kind} descriptor slot {index} is not allocated")]
    NotAllocated { kind: DescriptorHeapKind, index: u32 },

    /// 容量必须大于 0
    #[error("{kind} descriptor heap capacity must be greater than 0")]
    InvalidCapacity { kind: DescriptorHeapKind },

    /// 连续区间请求无效
    #[error("Invalid {kind} descriptor range: {reason}")]
    InvalidRange { kind: DescriptorHeapKind, reason: String },

    /// 对非着色器可见的堆请求 GPU 句柄
    #[error("{kind} descriptor heap is not shader visible")]
    NotShaderVisible { kind: DescriptorHeapKind },

    /// 底层设备无法提供请求的容量
    #[error("Failed to create {kind} descriptor heap with {capacity} descriptors: {reason}")]
    HeapAllocation { kind: DescriptorHeapKind, capacity: u32, reason: String },
}

/// 临时上传内存分配相关的错误
#[derive(Debug, Error)]
pub enum AllocationError {
    /// 容量必须大于 0
    #[error("Resource allocator capacity must be greater than 0")]
    InvalidCapacity,

    /// 对齐必须是 2 的幂
    #[error("Alignment {0} is not a power of two")]
    InvalidAlignment(u64),

    /// 请求超过整个缓冲区大小
    #[error("Request of {requested} bytes exceeds allocator capacity {capacity}")]
    TooLarge { requested: u64, capacity: u64 },

    /// 空间仍被 GPU 上未完成的帧占用
    #[error("Out of transient memory: {requested} bytes requested, {in_flight} bytes still in flight")]
    OutOfMemory { requested: u64, in_flight: u64 },
}

impl DeviceError {
    /// 是否为调用者可以恢复的错误
    ///
    /// 只有描述符耗尽和临时内存耗尽可以通过等待或扩容来恢复。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeviceError::Descriptor(DescriptorError::OutOfSlots { .. })
                | DeviceError::Allocation(AllocationError::OutOfMemory { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err: DeviceError = DescriptorError::OutOfSlots {
            kind: DescriptorHeapKind::ShaderResource,
            capacity: 4,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Descriptor heap error: SRV descriptor heap is out of slots (capacity 4)"
        );

        let err: DeviceError = SetupError::DeviceAlreadyExists.into();
        assert!(err.to_string().contains("single device"));
    }

    #[test]
    fn test_recoverable_classification() {
        let out_of_slots: DeviceError = DescriptorError::OutOfSlots {
            kind: DescriptorHeapKind::Sampler,
            capacity: 1,
        }
        .into();
        assert!(out_of_slots.is_recoverable());

        assert!(!DeviceError::Submit("close failed".to_string()).is_recoverable());
        assert!(!DeviceError::from(SetupError::NoCompatibleAdapter { major: 12, minor: 0 })
            .is_recoverable());
    }
}
