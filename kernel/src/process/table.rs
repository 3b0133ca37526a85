//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 任务表
//!
//! 固定容量的槽位数组，每个槽位持有一个 `Box<Task>`，寄存器帧的地址
//! 在任务的整个生命周期内不变。运行队列、等待队列通过 `TaskId`
//! 引用任务，不持有指针。
//!
//! 锁顺序：等待队列锁 → 运行队列锁 → 任务表锁。持有任务表锁时
//! 不能再获取其他锁。

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::info;

use crate::config::MAX_TASKS;
use crate::errno::Errno;
use crate::sync::IrqSpinLock;

use super::task::{KernelEntry, Task, TaskId};

struct Slot {
    generation: u32,
    task: Option<Box<Task>>,
}

struct Slab {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl Slab {
    fn get(&self, id: TaskId) -> Option<&Task> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.task.as_deref()
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.task.as_deref_mut()
    }
}

/// 任务表
pub struct TaskTable {
    inner: IrqSpinLock<Slab>,
    capacity: usize,
}

impl TaskTable {
    /// 容量为 `MAX_TASKS` 的任务表
    pub const fn new() -> Self {
        Self::with_capacity(MAX_TASKS)
    }

    /// 指定容量的任务表
    ///
    /// 运行队列按 `MAX_TASKS` 定长分配，容量超过 `MAX_TASKS` 直接 panic
    pub const fn with_capacity(capacity: usize) -> Self {
        assert!(capacity <= MAX_TASKS, "task table capacity exceeds MAX_TASKS");
        Self {
            inner: IrqSpinLock::new(Slab {
                slots: Vec::new(),
                free: Vec::new(),
                len: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前任务数
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 放入一个任务
    ///
    /// # 返回
    /// 表满时返回 `Errno::TryAgain`
    pub fn insert(&self, task: Task) -> Result<TaskId, Errno> {
        let task = Box::new(task);
        let mut slab = self.inner.lock();
        let id = if let Some(index) = slab.free.pop() {
            let slot = &mut slab.slots[index as usize];
            slot.task = Some(task);
            TaskId { index, generation: slot.generation }
        } else if slab.slots.len() < self.capacity {
            let index = slab.slots.len() as u32;
            slab.slots.push(Slot { generation: 0, task: Some(task) });
            TaskId { index, generation: 0 }
        } else {
            drop(slab);
            return Err(Errno::TryAgain);
        };
        slab.len += 1;
        Ok(id)
    }

    /// 取出一个任务，槽位代数加一
    ///
    /// 句柄已经失效说明同一个任务被释放了两次，属于内核 bug
    pub fn remove(&self, id: TaskId) -> Box<Task> {
        let mut slab = self.inner.lock();
        let task = match slab.slots.get_mut(id.index()) {
            Some(slot) if slot.generation == id.generation && slot.task.is_some() => {
                slot.generation = slot.generation.wrapping_add(1);
                slot.task.take()
            }
            _ => None,
        };
        match task {
            Some(task) => {
                slab.free.push(id.index);
                slab.len -= 1;
                task
            }
            None => {
                drop(slab);
                panic!("task table: double free of {}", id);
            }
        }
    }

    /// 句柄是否仍然有效
    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.lock().get(id).is_some()
    }

    /// 只读访问一个任务，句柄失效时返回 `None`
    pub fn with<R>(&self, id: TaskId, f: impl FnOnce(&Task) -> R) -> Option<R> {
        let slab = self.inner.lock();
        slab.get(id).map(f)
    }

    /// 可变访问一个任务，句柄失效时返回 `None`
    pub fn with_mut<R>(&self, id: TaskId, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let mut slab = self.inner.lock();
        slab.get_mut(id).map(f)
    }

    /// 同时可变访问两个不同的任务
    pub(crate) fn with_pair_mut<R>(
        &self,
        a: TaskId,
        b: TaskId,
        f: impl FnOnce(&mut Task, &mut Task) -> R,
    ) -> Option<R> {
        assert_ne!(a, b, "task table: aliasing access to {}", a);
        let mut slab = self.inner.lock();
        // 两个句柄都要有效
        slab.get(a)?;
        slab.get(b)?;
        let (lo, hi) = if a.index < b.index { (a, b) } else { (b, a) };
        let (head, tail) = slab.slots.split_at_mut(hi.index());
        let lo_task = head[lo.index()].task.as_deref_mut()?;
        let hi_task = tail[0].task.as_deref_mut()?;
        if a.index < b.index {
            Some(f(lo_task, hi_task))
        } else {
            Some(f(hi_task, lo_task))
        }
    }

    /// 创建内核任务并放入任务表，任务处于 `Ready`，尚未入队
    ///
    /// # 参数
    /// * `name` - 任务名
    /// * `entry` - 入口函数，返回即退出
    pub fn create_kernel_task(&self, name: &str, entry: KernelEntry) -> Result<TaskId, Errno> {
        let task = Task::new_kernel(name, entry)?;
        let pid = task.pid();
        let id = self.insert(task)?;
        info!("task: created kernel task {} pid={} as {}", name, pid, id);
        Ok(id)
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
