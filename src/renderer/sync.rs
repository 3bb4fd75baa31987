//! GPU 同步机制模块
//!
//! 提供帧级 fence，用于 CPU-GPU 同步。
//!
//! # 设计原则
//!
//! - **单调递增**：CPU 侧的 fence 值只增不减，每次提交帧时递增
//! - **异步 signal**：`signal` 只是把写入操作放入命令队列，GPU 执行到该位置时才更新完成值
//! - **统一接口**：原生同步对象通过 `FencePrimitive` 抽象，DX12 使用事件等待，
//!   模拟 GPU 使用条件变量，其它情况退化为轮询
//!
//! # 不变量
//!
//! `completed_value() <= cpu_value()`，且两者都不会减小。

use crate::core::error::{DeviceError, Result};
use crate::gfx::backend::CommandQueue;

/// 原生 fence 对象的能力抽象
pub trait FencePrimitive: Send {
    /// GPU 已经完成的最大 fence 值
    fn completed_value(&self) -> u64;

    /// 阻塞直到完成值不小于 `value`
    ///
    /// 默认实现为轮询，平台有原生等待对象时应覆盖此方法。
    fn wait_until_at_least(&self, value: u64) -> Result<()> {
        while self.completed_value() < value {
            std::thread::yield_now();
        }
        Ok(())
    }
}

/// 帧 fence
///
/// 维护 CPU 侧最近一次入队的 fence 值，并通过原生 fence 查询 GPU 进度。
///
/// # 示例
///
/// ```ignore
/// let value = fence.increment();
/// fence.signal(&mut queue)?;
///
/// // 之后某个时刻
/// fence.wait(value)?;
/// ```
pub struct FrameFence<F: FencePrimitive> {
    primitive: F,
    cpu_value: u64,
}

impl<F: FencePrimitive> FrameFence<F> {
    /// 创建新的帧 fence，初始值为 0
    pub fn new(primitive: F) -> Self {
        Self {
            primitive,
            cpu_value: 0,
        }
    }

    /// 递增 CPU 侧的 fence 值并返回新值
    ///
    /// 只改变 CPU 侧计数，不会向队列发出 signal。
    pub fn increment(&mut self) -> u64 {
        self.cpu_value += 1;
        self.cpu_value
    }

    /// 在命令队列上 signal 当前的 CPU 值
    ///
    /// 异步操作：GPU 执行完之前提交的所有工作后才会更新完成值。
    pub fn signal<Q>(&self, queue: &mut Q) -> Result<()>
    where
        Q: CommandQueue<Fence = F> + ?Sized,
    {
        queue.signal(&self.primitive, self.cpu_value)
    }

    /// 等待 GPU 完成 `target` 对应的工作
    ///
    /// 已完成时立即返回。等待一个从未入队的值会永远阻塞，因此直接拒绝。
    pub fn wait(&self, target: u64) -> Result<()> {
        if self.primitive.completed_value() >= target {
            return Ok(());
        }

        if target > self.cpu_value {
            return Err(DeviceError::Sync(format!(
                "Cannot wait for fence value {} (last queued value is {})",
                target, self.cpu_value
            )));
        }

        tracing::trace!(target, completed = self.primitive.completed_value(), "Waiting for GPU");
        self.primitive.wait_until_at_least(target)
    }

    /// 等待所有已入队的工作完成
    pub fn flush(&self) -> Result<()> {
        self.wait(self.cpu_value)
    }

    /// 最近一次入队的 fence 值
    pub fn cpu_value(&self) -> u64 {
        self.cpu_value
    }

    /// GPU 已完成的 fence 值
    pub fn completed_value(&self) -> u64 {
        self.primitive.completed_value()
    }

    /// 检查特定 fence 值是否已完成
    pub fn is_complete(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// 获取原生 fence 对象
    pub fn primitive(&self) -> &F {
        &self.primitive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// 使用默认轮询等待的 fence
    #[derive(Clone, Default)]
    struct PolledFence {
        completed: Arc<AtomicU64>,
    }

    impl FencePrimitive for PolledFence {
        fn completed_value(&self) -> u64 {
            self.completed.load(Ordering::Acquire)
        }
    }

    /// 记录 signal 但不执行的队列
    #[derive(Default)]
    struct RecordingQueue {
        signaled: Vec<u64>,
    }

    impl CommandQueue for RecordingQueue {
        type Fence = PolledFence;

        fn signal(&mut self, _fence: &PolledFence, value: u64) -> Result<()> {
            self.signaled.push(value);
            Ok(())
        }
    }

    #[test]
    fn test_increment_does_not_signal() {
        let mut fence = FrameFence::new(PolledFence::default());
        assert_eq!(fence.cpu_value(), 0);
        assert_eq!(fence.increment(), 1);
        assert_eq!(fence.increment(), 2);
        assert_eq!(fence.completed_value(), 0);
    }

    #[test]
    fn test_signal_uses_cpu_value() {
        let mut fence = FrameFence::new(PolledFence::default());
        let mut queue = RecordingQueue::default();

        fence.increment();
        fence.signal(&mut queue).unwrap();
        fence.increment();
        fence.signal(&mut queue).unwrap();

        assert_eq!(queue.signaled, vec![1, 2]);
    }

    #[test]
    fn test_wait_on_completed_value_returns_immediately() {
        let primitive = PolledFence::default();
        let mut fence = FrameFence::new(primitive.clone());
        fence.increment();
        primitive.completed.store(1, Ordering::Release);

        fence.wait(1).unwrap();
        fence.wait(0).unwrap();
        assert!(fence.is_complete(1));
    }

    #[test]
    fn test_wait_beyond_cpu_value_is_rejected() {
        let mut fence = FrameFence::new(PolledFence::default());
        fence.increment();
        assert!(matches!(fence.wait(5), Err(DeviceError::Sync(_))));
    }

    #[test]
    fn test_polling_wait_blocks_until_completion() {
        let primitive = PolledFence::default();
        let mut fence = FrameFence::new(primitive.clone());
        fence.increment();
        fence.increment();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(|| {
                fence.flush().unwrap();
                tx.send(()).unwrap();
            });

            assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
            primitive.completed.store(2, Ordering::Release);
            assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        });
    }
}
