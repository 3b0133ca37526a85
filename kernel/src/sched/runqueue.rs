//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 运行队列
//!
//! 固定容量的 FIFO 环形缓冲区，保存就绪任务的句柄。容量是任务表容量
//! 的上限 `MAX_TASKS`，同一个任务不会重复入队，所以正常情况下不会溢出；
//! 入队和出队都不分配内存，可以在时钟中断中使用。

use crate::config::MAX_TASKS;
use crate::process::TaskId;

/// 就绪任务队列
pub struct RunQueue {
    slots: [Option<TaskId>; MAX_TASKS],
    head: usize,
    len: usize,
}

impl RunQueue {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_TASKS],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 追加到队尾
    ///
    /// 队列满说明有任务被重复入队，属于内核 bug
    pub fn push_back(&mut self, id: TaskId) {
        assert!(self.len < MAX_TASKS, "run queue overflow while queueing {}", id);
        let tail = (self.head + self.len) % MAX_TASKS;
        self.slots[tail] = Some(id);
        self.len += 1;
    }

    /// 取出队头
    pub fn pop_front(&mut self) -> Option<TaskId> {
        if self.len == 0 {
            return None;
        }
        let id = self.slots[self.head].take();
        self.head = (self.head + 1) % MAX_TASKS;
        self.len -= 1;
        id
    }

    /// 查看队头但不取出
    pub fn front(&self) -> Option<TaskId> {
        if self.len == 0 {
            None
        } else {
            self.slots[self.head]
        }
    }

    /// 是否包含 `id`
    pub fn contains(&self, id: TaskId) -> bool {
        self.iter().any(|queued| queued == id)
    }

    /// 从队头到队尾遍历
    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % MAX_TASKS])
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}
