//! 临时上传内存分配器
//!
//! 在一个上传缓冲区上做环形分配，用于每帧更新的常量、顶点等数据。
//! 每帧结束时用 fence 值标记本帧分配的区域，fence 完成后整段区域被回收。
//!
//! 头尾指针都单调递增，取模后才是缓冲区内偏移：
//!
//! ```text
//! |---- 已回收 ----|==== 在途（GPU 可能在读）====|---- 可用 ----|
//!                 tail                          head
//! ```

use std::collections::VecDeque;

use super::resource::ResourceId;
use crate::core::error::{AllocationError, Result};

/// 一次临时分配
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientAllocation {
    /// 所在的上传缓冲区
    pub buffer: ResourceId,
    /// 缓冲区内偏移
    pub offset: u64,
    /// 大小（字节）
    pub size: u64,
}

/// 环形上传内存分配器
#[derive(Debug)]
pub struct ResourceAllocator {
    buffer: ResourceId,
    capacity: u64,
    head: u64,
    tail: u64,
    /// (fence 值, 该帧结束时的 head)
    frames: VecDeque<(u64, u64)>,
}

impl ResourceAllocator {
    /// 创建分配器
    ///
    /// # 参数
    ///
    /// * `buffer` - 后端创建的上传缓冲区
    /// * `capacity` - 缓冲区大小（字节）
    pub fn new(buffer: ResourceId, capacity: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(AllocationError::InvalidCapacity.into());
        }

        Ok(Self {
            buffer,
            capacity,
            head: 0,
            tail: 0,
            frames: VecDeque::new(),
        })
    }

    /// 分配 `size` 字节，起始偏移按 `alignment` 对齐
    ///
    /// 缓冲区尾部放不下时从偏移 0 重新开始。
    /// 会覆盖尚未回收的区域时返回 `AllocationError::OutOfMemory`。
    pub fn reserve(&mut self, size: u64, alignment: u64) -> Result<TransientAllocation> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(AllocationError::InvalidAlignment(alignment).into());
        }
        if size > self.capacity {
            return Err(AllocationError::TooLarge {
                requested: size,
                capacity: self.capacity,
            }
            .into());
        }

        let ring_offset = self.head % self.capacity;
        let aligned = align_up(ring_offset, alignment);
        let start = if aligned + size > self.capacity {
            // 放弃尾部剩余空间，从下一圈的 0 开始
            self.head + (self.capacity - ring_offset)
        } else {
            self.head + (aligned - ring_offset)
        };

        let end = start + size;
        if end - self.tail > self.capacity {
            return Err(AllocationError::OutOfMemory {
                requested: size,
                in_flight: self.in_flight(),
            }
            .into());
        }

        self.head = end;
        Ok(TransientAllocation {
            buffer: self.buffer,
            offset: start % self.capacity,
            size,
        })
    }

    /// 用 fence 值标记到目前为止的所有分配
    pub fn end_frame(&mut self, fence_value: u64) {
        let last_head = self.frames.back().map_or(self.tail, |(_, head)| *head);
        if self.head > last_head {
            self.frames.push_back((fence_value, self.head));
        }
    }

    /// 回收 fence 值已完成的帧的区域
    pub fn retire(&mut self, completed: u64) {
        while let Some(&(fence_value, head)) = self.frames.front() {
            if fence_value > completed {
                break;
            }
            self.tail = head;
            self.frames.pop_front();
        }
    }

    /// 上传缓冲区
    pub fn buffer(&self) -> ResourceId {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// 尚未回收的字节数（包括对齐和回绕浪费的部分）
    pub fn in_flight(&self) -> u64 {
        self.head - self.tail
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DeviceError;

    fn allocator(capacity: u64) -> ResourceAllocator {
        ResourceAllocator::new(ResourceId(1), capacity).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ResourceAllocator::new(ResourceId(1), 0).is_err());
    }

    #[test]
    fn test_alignment() {
        let mut alloc = allocator(1024);
        assert_eq!(alloc.reserve(10, 1).unwrap().offset, 0);
        assert_eq!(alloc.reserve(16, 256).unwrap().offset, 256);
        assert!(matches!(
            alloc.reserve(16, 3),
            Err(DeviceError::Allocation(AllocationError::InvalidAlignment(3)))
        ));
    }

    #[test]
    fn test_too_large() {
        let mut alloc = allocator(512);
        assert!(matches!(
            alloc.reserve(513, 1),
            Err(DeviceError::Allocation(AllocationError::TooLarge { .. }))
        ));
    }

    #[test]
    fn test_wrap_and_retire() {
        let mut alloc = allocator(1024);

        // 帧 1
        alloc.reserve(600, 1).unwrap();
        alloc.end_frame(1);

        // 帧 2：尾部只剩 424 字节，放不下 500
        assert!(matches!(
            alloc.reserve(500, 1),
            Err(DeviceError::Allocation(AllocationError::OutOfMemory { .. }))
        ));

        alloc.retire(1);
        assert_eq!(alloc.in_flight(), 0);

        let wrapped = alloc.reserve(500, 1).unwrap();
        assert_eq!(wrapped.offset, 0);
        alloc.end_frame(2);
        assert_eq!(alloc.in_flight(), 424 + 500);
    }

    #[test]
    fn test_retire_only_completed_frames() {
        let mut alloc = allocator(1000);
        alloc.reserve(300, 1).unwrap();
        alloc.end_frame(1);
        alloc.reserve(300, 1).unwrap();
        alloc.end_frame(2);
        alloc.reserve(300, 1).unwrap();
        alloc.end_frame(3);

        assert!(alloc.reserve(300, 1).is_err());

        alloc.retire(1);
        assert_eq!(alloc.in_flight(), 600);
        let reused = alloc.reserve(300, 1).unwrap();
        assert_eq!(reused.offset, 0);
    }

    #[test]
    fn test_empty_frame_not_recorded() {
        let mut alloc = allocator(64);
        alloc.end_frame(1);
        alloc.end_frame(2);
        alloc.reserve(64, 1).unwrap();
        alloc.end_frame(3);
        alloc.retire(2);
        assert_eq!(alloc.in_flight(), 64);
        alloc.retire(3);
        assert_eq!(alloc.in_flight(), 0);
    }
}
