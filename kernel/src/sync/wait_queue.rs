//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 等待队列 (Wait Queue) 机制
//!
//! 对应 Linux 内核的等待队列：
//! - `include/linux/wait.h` - wait_event() / wake_up()
//! - `kernel/sched/wait.c` - prepare_to_wait() / finish_wait()
//!
//! 核心约束是不丢失唤醒：条件检查、入队、阻塞三步都在同一把关中断
//! 自旋锁的保护下完成，而通知方改变条件、出队、唤醒也在这把锁下进行。
//! 等待方只在调度器把它移出 current 之后才释放自旋锁，并且直到被换下
//! 都保持关中断。
//!
//! 每次入队都会领取一个票据，写进任务的 `TaskLink::Waiting`。通知方
//! 只唤醒票据仍然匹配的任务，超时离开的等待者留下的旧表项会被跳过。

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::errno::Errno;
use crate::process::TaskId;
use crate::sched::{self, Scheduler};

use super::irq_lock::IrqSpinLock;

static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

/// 等待队列项
///
/// 对应 Linux 的 struct wait_queue_entry：等待的任务、它所在 CPU 的
/// 调度器，以及这一次等待的票据
#[derive(Clone, Copy)]
pub struct Waiter {
    task: TaskId,
    sched: &'static Scheduler,
    ticket: u64,
}

impl Waiter {
    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// 唤醒时把任务放回这个调度器
    pub fn scheduler(&self) -> &'static Scheduler {
        self.sched
    }
}

/// 等待队列
pub struct WaitQueue {
    waiters: IrqSpinLock<VecDeque<Waiter>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: IrqSpinLock::new(VecDeque::new()),
        }
    }

    /// 阻塞当前任务直到 `condition` 返回 `true`
    ///
    /// `condition` 在队列锁下求值，可能被多次调用；它也可以顺带占有
    /// 资源（如信号量计数），返回 `true` 即表示占有成功。条件已经成立时
    /// 不入队也不切换。
    pub fn wait(&self, mut condition: impl FnMut() -> bool) -> Result<(), Errno> {
        self.wait_until(&mut condition, None)
    }

    /// 与 `wait` 相同，但最多等待 `ticks` 个滴答
    ///
    /// # 返回
    /// 超时时最后再检查一次条件，仍不成立返回 `Errno::TimedOut`
    pub fn wait_timeout(&self, mut condition: impl FnMut() -> bool, ticks: u64) -> Result<(), Errno> {
        self.wait_until(&mut condition, Some(ticks))
    }

    fn wait_until(&self, condition: &mut dyn FnMut() -> bool, timeout: Option<u64>) -> Result<(), Errno> {
        let sched = sched::this_cpu();
        let deadline = timeout.map(|ticks| sched.clock().saturating_add(ticks));

        loop {
            let mut waiters = self.waiters.lock();
            if condition() {
                return Ok(());
            }

            let task = sched.current_task(&waiters.token());
            let ticket = NEXT_TICKET.fetch_add(1, Ordering::Relaxed);
            sched.prepare_wait(task, ticket);
            waiters.push_back(Waiter { task, sched, ticket });

            let (locked, irq) = waiters.into_parts();
            let result = sched.block_current_task_until(deadline, move || drop(locked));
            drop(irq);

            if let Err(err) = result {
                let mut waiters = self.waiters.lock();
                waiters.retain(|waiter| waiter.ticket != ticket);
                if condition() {
                    return Ok(());
                }
                debug!("wait: {} gave up: {}", task, err);
                return Err(err);
            }
        }
    }

    /// 在队列锁下执行 `action`，然后唤醒最早入队的一个等待者
    ///
    /// # 返回
    /// 是否有任务被唤醒
    pub fn notify_one(&self, action: impl FnOnce()) -> bool {
        let mut waiters = self.waiters.lock();
        action();
        while let Some(waiter) = waiters.pop_front() {
            if waiter.scheduler().wake(&waiter) {
                return true;
            }
        }
        false
    }

    /// 在队列锁下执行 `action`，然后唤醒当前所有等待者
    ///
    /// 持锁期间新的等待者无法入队，所以只唤醒调用时已经在队列中的任务
    ///
    /// # 返回
    /// 被唤醒的任务数
    pub fn notify_all(&self, action: impl FnOnce()) -> usize {
        let mut waiters = self.waiters.lock();
        action();
        let mut woken = 0;
        while let Some(waiter) = waiters.pop_front() {
            if waiter.scheduler().wake(&waiter) {
                woken += 1;
            }
        }
        woken
    }

    /// 队列中的表项数（包括尚未清理的过期表项）
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
