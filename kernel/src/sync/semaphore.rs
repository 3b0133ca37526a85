//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号量 (Semaphore) 机制
//!
//! 对应 Linux 内核：
//! - `include/linux/semaphore.h` - 信号量定义
//! - `kernel/locking/semaphore.c` - 信号量操作
//!
//! 核心概念：
//! - P 操作 (down): 获取信号量，计数为 0 时在等待队列上睡眠
//! - V 操作 (up): 释放信号量，唤醒最早的等待者
//!
//! 获取与释放都在等待队列锁下修改计数，释放时的唤醒不会丢失。

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicI32, Ordering};

use crate::errno::Errno;

use super::wait_queue::WaitQueue;

/// 计数信号量
pub struct Semaphore {
    /// 可用资源数，不会小于 0
    count: AtomicI32,
    /// 计数为 0 时等待的任务
    wait: WaitQueue,
}

impl Semaphore {
    /// 创建新信号量
    ///
    /// # 参数
    /// * `value` - 初始值
    pub const fn new(value: i32) -> Self {
        Self {
            count: AtomicI32::new(value),
            wait: WaitQueue::new(),
        }
    }

    /// 计数大于 0 时减一
    fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |count| {
                if count > 0 {
                    Some(count - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// P 操作
    ///
    /// 计数为 0 时阻塞，直到某个 `up` 让出资源
    pub fn down(&self) {
        // 无超时的等待只会在条件成立后返回
        let _ = self.wait.wait(|| self.try_acquire());
    }

    /// 带超时的 P 操作
    ///
    /// # 返回
    /// - `Ok(())` - 成功获取信号量
    /// - `Err(Errno::TimedOut)` - `ticks` 个滴答内没有获取到
    pub fn down_timeout(&self, ticks: u64) -> Result<(), Errno> {
        self.wait.wait_timeout(|| self.try_acquire(), ticks)
    }

    /// 尝试 P 操作（非阻塞）
    ///
    /// # 返回
    /// - `Ok(())` - 成功获取信号量
    /// - `Err(Errno::TryAgain)` - 信号量不足
    pub fn try_down(&self) -> Result<(), Errno> {
        if self.try_acquire() {
            Ok(())
        } else {
            Err(Errno::TryAgain)
        }
    }

    /// V 操作
    ///
    /// 计数加一，唤醒一个等待者（如果有）
    pub fn up(&self) {
        self.wait.notify_one(|| {
            self.count.fetch_add(1, Ordering::Release);
        });
    }

    /// 当前计数
    pub fn count(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// 等待者数量
    pub fn waiters(&self) -> usize {
        self.wait.len()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("count", &self.count())
            .field("waiters", &self.waiters())
            .finish()
    }
}

/// 睡眠互斥锁
///
/// 二值信号量加上被保护的数据。与 `spin::Mutex` 不同，拿不到锁的任务
/// 睡眠而不是自旋，所以临界区内允许阻塞；不能在中断上下文中使用。
pub struct Mutex<T> {
    sem: Semaphore,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            sem: Semaphore::new(1),
            data: UnsafeCell::new(value),
        }
    }

    /// 获取锁，必要时睡眠
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.sem.down();
        MutexGuard { mutex: self }
    }

    /// 尝试获取锁
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.sem.try_down().ok()?;
        Some(MutexGuard { mutex: self })
    }

    /// 锁是否被持有
    pub fn is_locked(&self) -> bool {
        self.sem.count() == 0
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

/// `Mutex` 的守卫，析构时释放锁
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.sem.up();
    }
}
