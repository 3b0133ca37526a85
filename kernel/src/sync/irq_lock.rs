//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 关中断自旋锁
//!
//! 对应 Linux 的 spin_lock_irqsave()/spin_unlock_irqrestore()
//! (include/linux/spinlock.h)
//!
//! 中断处理程序也会访问调度器和等待队列，所以这些数据结构上的锁必须在
//! 关中断的状态下持有，否则同一 CPU 上的中断会在锁上自旋到死。
//! `IrqSpinLock` 的守卫由两部分组成：先关中断，再取 `spin::Mutex`；
//! 释放时先放锁，再恢复中断。

use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use crate::arch::cpu;

/// 中断保护 RAII 守卫
///
/// 在作用域内禁用中断，离开时恢复进入前的状态
///
/// 对应 Linux 的 local_irq_save()/local_irq_restore()
pub struct InterruptGuard {
    was_enabled: bool,
    // 中断状态属于当前 CPU，守卫不能跨线程移动
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// 禁用中断并创建守卫
    #[inline]
    pub fn new() -> Self {
        Self {
            was_enabled: cpu::local_irq_save(),
            _not_send: PhantomData,
        }
    }

    /// 证明当前处于关中断状态的令牌
    #[inline]
    pub fn token(&self) -> IrqToken<'_> {
        IrqToken { _guard: PhantomData }
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    #[inline]
    fn drop(&mut self) {
        cpu::local_irq_restore(self.was_enabled);
    }
}

/// 关中断令牌
///
/// 只能从 `InterruptGuard` 或 `IrqSpinLockGuard` 借出，生命周期不超过
/// 对应的守卫。需要“当前任务在此期间不会被换下”的接口以它作为参数。
#[derive(Clone, Copy)]
pub struct IrqToken<'a> {
    _guard: PhantomData<&'a InterruptGuard>,
}

/// 关中断自旋锁
pub struct IrqSpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSpinLock<T> {
    /// 创建新锁
    pub const fn new(value: T) -> Self {
        Self { inner: spin::Mutex::new(value) }
    }

    /// 关中断并加锁
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let irq = InterruptGuard::new();
        let locked = self.inner.lock();
        IrqSpinLockGuard { locked, irq }
    }

    /// 尝试加锁，失败时恢复中断状态
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let irq = InterruptGuard::new();
        let locked = self.inner.try_lock()?;
        Some(IrqSpinLockGuard { locked, irq })
    }

    /// 独占访问时无需加锁
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

/// `IrqSpinLock` 的守卫
///
/// 字段按声明顺序析构：先释放自旋锁，再恢复中断
pub struct IrqSpinLockGuard<'a, T> {
    locked: spin::MutexGuard<'a, T>,
    irq: InterruptGuard,
}

impl<'a, T> IrqSpinLockGuard<'a, T> {
    /// 关中断令牌
    pub fn token(&self) -> IrqToken<'_> {
        self.irq.token()
    }

    /// 拆成自旋锁守卫和中断守卫
    ///
    /// 阻塞路径需要在切换之前释放锁，但直到任务被换下都保持关中断
    pub fn into_parts(self) -> (spin::MutexGuard<'a, T>, InterruptGuard) {
        let Self { locked, irq } = self;
        (locked, irq)
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.locked
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.locked
    }
}
