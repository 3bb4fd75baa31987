//! 命令列表状态管理模块
//!
//! 设备只有一个直接命令列表。后端创建它时处于录制状态，
//! 每帧经历 录制 → 关闭 → 执行 → 重置 的循环。
//! `CommandEncoder` 在 CPU 侧跟踪这个状态机，防止错误的关闭或提交顺序。

use crate::core::error::{DeviceError, Result};

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 正在记录
    Recording,
    /// 已关闭，可以执行
    Executable,
    /// 已提交到队列
    Pending,
    /// 无效状态（关闭或提交失败之后）
    Invalid,
}

/// 命令编码器
///
/// 只跟踪状态，实际命令由后端录制。
#[derive(Debug)]
pub struct CommandEncoder {
    /// 当前状态
    state: CommandListState,
    /// 本帧录制的命令数
    recorded: u32,
}

impl CommandEncoder {
    /// 创建新的命令编码器（录制状态）
    pub fn new() -> Self {
        Self {
            state: CommandListState::Recording,
            recorded: 0,
        }
    }

    /// 检查是否可以录制命令
    pub fn ensure_recording(&self) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(DeviceError::Submit(format!(
                "Command list is not recording (state {:?})",
                self.state
            )));
        }
        Ok(())
    }

    /// 记录一条命令
    pub fn record(&mut self) -> Result<()> {
        self.ensure_recording()?;
        self.recorded += 1;
        Ok(())
    }

    /// 结束记录命令
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Recording => {
                self.state = CommandListState::Executable;
                Ok(())
            }
            state => Err(DeviceError::Submit(format!(
                "Cannot close command list in state {:?}",
                state
            ))),
        }
    }

    /// 标记为已提交
    pub fn execute(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Executable => {
                self.state = CommandListState::Pending;
                Ok(())
            }
            state => Err(DeviceError::Submit(format!(
                "Cannot execute command list in state {:?}",
                state
            ))),
        }
    }

    /// 重置，开始下一帧的录制
    ///
    /// 已关闭但未提交的列表（窗口调整大小后丢弃的帧）也可以重置。
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            CommandListState::Executable | CommandListState::Pending => {
                self.state = CommandListState::Recording;
                self.recorded = 0;
                Ok(())
            }
            state => Err(DeviceError::Submit(format!(
                "Cannot reset command list in state {:?}",
                state
            ))),
        }
    }

    /// 标记为无效
    pub fn invalidate(&mut self) {
        self.state = CommandListState::Invalid;
    }

    /// 获取当前状态
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// 本帧录制的命令数
    pub fn recorded(&self) -> u32 {
        self.recorded
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoder_state_machine() {
        let mut encoder = CommandEncoder::new();
        assert_eq!(encoder.state(), CommandListState::Recording);

        encoder.record().unwrap();
        encoder.record().unwrap();
        assert_eq!(encoder.recorded(), 2);

        // 录制中不能执行
        assert!(encoder.execute().is_err());

        encoder.close().unwrap();
        assert_eq!(encoder.state(), CommandListState::Executable);

        // 不能重复关闭，关闭后不能录制
        assert!(encoder.close().is_err());
        assert!(encoder.record().is_err());

        encoder.execute().unwrap();
        assert_eq!(encoder.state(), CommandListState::Pending);

        encoder.reset().unwrap();
        assert_eq!(encoder.state(), CommandListState::Recording);
        assert_eq!(encoder.recorded(), 0);
    }

    #[test]
    fn test_reset_closed_but_not_executed() {
        let mut encoder = CommandEncoder::new();
        encoder.close().unwrap();
        encoder.reset().unwrap();
        assert_eq!(encoder.state(), CommandListState::Recording);
    }

    #[test]
    fn test_invalid_state() {
        let mut encoder = CommandEncoder::new();
        encoder.invalidate();
        assert!(encoder.close().is_err());
        assert!(encoder.reset().is_err());
        assert!(matches!(encoder.record(), Err(DeviceError::Submit(_))));
    }
}
