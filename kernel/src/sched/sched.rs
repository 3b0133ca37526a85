//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器实现
//!
//! 遵循 Linux 内核的调度器结构 (kernel/sched/core.c)：
//! - 每个 CPU 一个 `Scheduler`，对应 struct rq
//! - 就绪任务按 FIFO 轮转，时间片用完时被抢占
//! - 没有就绪任务时运行该 CPU 的 idle 任务
//! - 调度入口：`block_current_task` / `yield_now` / `exit_current` / `tick`
//!
//! 运行队列锁是关中断自旋锁。所有切换路径都在持锁期间选出下一个任务、
//! 更新任务状态、取出两端的寄存器帧，然后释放锁再调用切换原语。
//!
//! 退出的任务先放进 zombie 槽位，等同一个 CPU 上下一次非中断的调度
//! 操作再回收，回收时不持有任何锁。

use alloc::vec::Vec;

use log::{debug, error, info, trace};

use crate::arch::context;
use crate::arch::cpu;
use crate::config::TIME_SLICE_TICKS;
use crate::errno::Errno;
use crate::process::{KernelEntry, Task, TaskId, TaskLink, TaskState, TaskTable};
use crate::sync::irq_lock::{IrqSpinLockGuard, IrqToken};
use crate::sync::wait_queue::Waiter;
use crate::sync::{InterruptGuard, IrqSpinLock};

use super::runqueue::RunQueue;

/// 一个带截止时间的阻塞任务
#[derive(Debug, Clone, Copy)]
struct Sleeper {
    task: TaskId,
    deadline: u64,
}

/// 运行队列锁保护的全部状态
struct RqState {
    ready: RunQueue,
    current: Option<TaskId>,
    idle: Option<TaskId>,
    /// 已退出、等待回收的任务
    zombie: Option<TaskId>,
    sleepers: Vec<Sleeper>,
    /// 本 CPU 的滴答计数
    clock: u64,
    nr_switches: u64,
}

/// 每 CPU 调度器
pub struct Scheduler {
    cpu: usize,
    tasks: &'static TaskTable,
    rq: IrqSpinLock<RqState>,
    time_slice: u32,
}

impl Scheduler {
    /// 创建 CPU `cpu` 的调度器，任务存放在 `tasks` 中
    pub const fn new(cpu: usize, tasks: &'static TaskTable) -> Self {
        Self::with_time_slice(cpu, tasks, TIME_SLICE_TICKS)
    }

    /// 指定时间片（滴答数）
    pub const fn with_time_slice(cpu: usize, tasks: &'static TaskTable, time_slice: u32) -> Self {
        Self {
            cpu,
            tasks,
            rq: IrqSpinLock::new(RqState {
                ready: RunQueue::new(),
                current: None,
                idle: None,
                zombie: None,
                sleepers: Vec::new(),
                clock: 0,
                nr_switches: 0,
            }),
            time_slice: if time_slice == 0 { 1 } else { time_slice },
        }
    }

    /// 接管当前上下文并启动调度
    ///
    /// 当前执行流成为本 CPU 的引导任务（`Running`），另外创建 idle 任务，
    /// 并把本调度器登记为当前 CPU 的每 CPU 数据
    ///
    /// # 返回
    /// idle 任务的内核栈分配失败返回 `Errno::OutOfMemory`，任务表满返回
    /// `Errno::TryAgain`
    pub fn bootstrap(&'static self) -> Result<(), Errno> {
        let idle = Task::new_idle(self.cpu, idle_entry)?;
        let idle = self.tasks.insert(idle)?;
        let boot = match self.tasks.insert(Task::adopt_current(self.cpu, "boot")) {
            Ok(boot) => boot,
            Err(err) => {
                drop(self.tasks.remove(idle));
                return Err(err);
            }
        };

        {
            let mut rq = self.rq.lock();
            assert!(rq.current.is_none(), "cpu{}: scheduler bootstrapped twice", self.cpu);
            rq.current = Some(boot);
            rq.idle = Some(idle);
        }
        cpu::set_cpu_local(self as *const Scheduler as usize);

        info!("sched: cpu{} online, boot={} idle={} slice={} ticks", self.cpu, boot, idle, self.time_slice);
        Ok(())
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn tasks(&self) -> &'static TaskTable {
        self.tasks
    }

    pub fn time_slice(&self) -> u32 {
        self.time_slice
    }

    /// 当前任务
    ///
    /// 令牌保证调用者在关中断期间读取，结果在令牌有效期内不会过时
    pub fn current_task(&self, _token: &IrqToken<'_>) -> TaskId {
        let rq = self.rq.lock();
        match rq.current {
            Some(current) => current,
            None => panic!("cpu{}: scheduler has no current task", self.cpu),
        }
    }

    /// 当前任务（诊断用，结果可能立即过时）
    pub fn current_task_opt(&self) -> Option<TaskId> {
        self.rq.lock().current
    }

    /// idle 任务
    pub fn idle_task(&self) -> Option<TaskId> {
        self.rq.lock().idle
    }

    /// 就绪任务数
    pub fn nr_ready(&self) -> usize {
        self.rq.lock().ready.len()
    }

    /// 上下文切换次数
    pub fn nr_switches(&self) -> u64 {
        self.rq.lock().nr_switches
    }

    /// 本 CPU 的滴答计数
    pub fn clock(&self) -> u64 {
        self.rq.lock().clock
    }

    /// 就绪队列快照（从队头到队尾）
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        let rq = self.rq.lock();
        let mut ids = Vec::with_capacity(rq.ready.len());
        ids.extend(rq.ready.iter());
        ids
    }

    /// 创建内核任务并放入本 CPU 的运行队列
    pub fn spawn(&self, name: &str, entry: KernelEntry) -> Result<TaskId, Errno> {
        let id = self.tasks.create_kernel_task(name, entry)?;
        self.schedule_task(id);
        Ok(id)
    }

    /// 把任务放到运行队列队尾
    ///
    /// 任务必须是新建的 `Ready` 任务或 `Blocked` 任务。对运行中、
    /// 已退出或已经在运行队列中的任务调用属于内核 bug，直接 panic
    pub fn schedule_task(&self, task: TaskId) {
        let mut rq = self.rq.lock();
        self.enqueue(&mut rq, task, false);
    }

    fn enqueue(&self, rq: &mut RqState, id: TaskId, timed_out: bool) {
        let cpu = self.cpu;
        let queued = self.tasks.with_mut(id, |task| {
            if task.is_idle() {
                panic!("cpu{}: idle task {} cannot be queued", cpu, id);
            }
            match task.state {
                TaskState::Running | TaskState::Exiting => {
                    panic!("cpu{}: cannot schedule {} ({}) in state {:?}", cpu, id, task.name(), task.state);
                }
                TaskState::Ready | TaskState::Blocked => {}
            }
            if let TaskLink::Ready { cpu: other } = task.link {
                panic!("{} ({}) is already on the run queue of cpu{}", id, task.name(), other);
            }
            if let Some(home) = task.cpu {
                assert!(home == cpu, "{} ({}) is bound to cpu{}, not cpu{}", id, task.name(), home, cpu);
            }
            task.cpu = Some(cpu);
            task.state = TaskState::Ready;
            task.link = TaskLink::Ready { cpu };
            task.timed_out = timed_out;
        });
        if queued.is_none() {
            panic!("cpu{}: cannot schedule stale {}", cpu, id);
        }
        rq.sleepers.retain(|sleeper| sleeper.task != id);
        rq.ready.push_back(id);
        trace!("sched: cpu{} queued {} (ready={})", cpu, id, rq.ready.len());
    }

    /// 唤醒一个等待项对应的任务
    ///
    /// 只有任务仍然阻塞在这一次等待上（票据一致）才会入队；任务已经
    /// 超时、已被唤醒或已回收时返回 `false`
    pub fn wake(&self, waiter: &Waiter) -> bool {
        let mut rq = self.rq.lock();
        let expected = TaskLink::Waiting { ticket: waiter.ticket() };
        let blocked = self
            .tasks
            .with(waiter.task(), |task| task.state == TaskState::Blocked && task.link == expected)
            .unwrap_or(false);
        if !blocked {
            trace!("sched: cpu{} skipped stale waiter {}", self.cpu, waiter.task());
            return false;
        }
        self.enqueue(&mut rq, waiter.task(), false);
        debug!("sched: cpu{} woke {}", self.cpu, waiter.task());
        true
    }

    /// 标记当前任务即将挂到等待队列上
    ///
    /// 调用者持有等待队列锁；任务已经挂在其他队列上属于内核 bug
    pub(crate) fn prepare_wait(&self, task: TaskId, ticket: u64) {
        let marked = self.tasks.with_mut(task, |t| {
            assert!(
                t.link == TaskLink::None && t.state == TaskState::Running,
                "{} ({}) cannot wait while {:?}/{:?}",
                task,
                t.name(),
                t.state,
                t.link
            );
            t.link = TaskLink::Waiting { ticket };
        });
        if marked.is_none() {
            panic!("cpu{}: stale current task {}", self.cpu, task);
        }
    }

    /// 阻塞当前任务，切换到下一个就绪任务（没有则切到 idle）
    ///
    /// `unlock` 在当前任务离开 current 位置之后、切换之前调用，通常用来
    /// 释放等待队列的自旋锁；调用时仍然关中断。任务再次被选中时返回。
    pub fn block_current_task(&self, unlock: impl FnOnce()) -> Result<(), Errno> {
        self.block_current_task_until(None, unlock)
    }

    /// 带截止时间的阻塞
    ///
    /// `deadline` 是本 CPU 的滴答计数。截止时间到达时任务被重新放回
    /// 运行队列，返回 `Errno::TimedOut`；截止时间已经过去时不阻塞，
    /// 调用 `unlock` 后直接返回 `Errno::TimedOut`
    pub fn block_current_task_until(&self, deadline: Option<u64>, unlock: impl FnOnce()) -> Result<(), Errno> {
        let irq = InterruptGuard::new();
        let mut rq = self.rq.lock();
        let prev = self.current_locked(&rq);
        if Some(prev) == rq.idle {
            error!("cpu{}: idle task tried to block", self.cpu);
            panic!("cpu{}: idle task cannot block", self.cpu);
        }

        if let Some(deadline) = deadline {
            if deadline <= rq.clock {
                self.tasks.with_mut(prev, |task| task.link = TaskLink::None);
                drop(rq);
                unlock();
                return Err(Errno::TimedOut);
            }
            rq.sleepers.push(Sleeper { task: prev, deadline });
        }

        self.tasks.with_mut(prev, |task| {
            task.state = TaskState::Blocked;
            task.timed_out = false;
        });
        debug!("sched: cpu{} {} blocks (deadline={:?})", self.cpu, prev, deadline);

        let next = self.pick_next(&mut rq);
        self.switch(rq, prev, next, unlock);

        let timed_out = self
            .tasks
            .with_mut(prev, |task| core::mem::take(&mut task.timed_out))
            .unwrap_or(false);
        drop(irq);
        self.reap_zombie();

        if timed_out {
            Err(Errno::TimedOut)
        } else {
            Ok(())
        }
    }

    /// 睡眠 `ticks` 个滴答
    pub fn sleep_ticks(&self, ticks: u64) {
        let deadline = self.clock().saturating_add(ticks.max(1));
        // 被提前调度回来也算结束睡眠
        let _ = self.block_current_task_until(Some(deadline), || {});
    }

    /// 主动让出 CPU
    ///
    /// 当前任务回到运行队列队尾；没有其他就绪任务时立即返回
    pub fn yield_now(&self) {
        self.reap_zombie();
        let irq = InterruptGuard::new();
        let mut rq = self.rq.lock();
        let Some(next) = rq.ready.pop_front() else {
            return;
        };
        let prev = self.current_locked(&rq);
        self.requeue_prev(&mut rq, prev);
        self.switch(rq, prev, next, || {});
        drop(irq);
        self.reap_zombie();
    }

    /// 结束当前任务
    ///
    /// 任务进入 `Exiting`，切换到下一个任务后不再返回；任务占用的内核栈
    /// 和地址空间引用在本 CPU 下一次非中断调度时释放
    pub fn exit_current(&self) -> ! {
        // 本上下文不会再恢复，中断状态由下一个任务的帧决定。
        // 回收旧 zombie 到登记新 zombie 之间不能被时钟抢占
        cpu::local_irq_disable();
        self.reap_zombie();

        let mut rq = self.rq.lock();
        let prev = self.current_locked(&rq);
        if Some(prev) == rq.idle {
            error!("cpu{}: idle task tried to exit", self.cpu);
            panic!("cpu{}: idle task cannot exit", self.cpu);
        }
        let pid = self.tasks.with_mut(prev, |task| {
            task.state = TaskState::Exiting;
            task.link = TaskLink::None;
            task.pid()
        });
        assert!(rq.zombie.is_none(), "cpu{}: zombie slot still occupied", self.cpu);
        rq.zombie = Some(prev);
        rq.sleepers.retain(|sleeper| sleeper.task != prev);
        debug!("sched: cpu{} {} (pid {:?}) exits", self.cpu, prev, pid);

        let next = self.pick_next(&mut rq);
        rq.current = Some(next);
        rq.nr_switches += 1;
        let cpu = self.cpu;
        let slice = self.time_slice;
        let next_frame = self.tasks.with_mut(next, |task| {
            task.state = TaskState::Running;
            task.link = TaskLink::None;
            task.time_slice = slice;
            task.prepare_switch(cpu)
        });
        let Some(next_frame) = next_frame else {
            panic!("cpu{}: next task {} vanished", cpu, next);
        };
        drop(rq);

        unsafe { context::context_switch_to(&next_frame) }
    }

    /// 回收本 CPU 上已退出的任务
    pub fn reap_zombie(&self) {
        let zombie = self.rq.lock().zombie.take();
        if let Some(id) = zombie {
            let task = self.tasks.remove(id);
            debug!("sched: cpu{} reaped {} ({})", self.cpu, id, task.name());
            drop(task);
        }
    }

    /// 时钟中断处理
    ///
    /// 推进滴答计数，唤醒到期的定时阻塞任务，扣减当前任务的时间片；
    /// 时间片用完且有其他就绪任务时切换。idle 在有就绪任务时立即让出。
    /// 运行在中断上下文：不分配内存，不回收任务。
    pub fn tick(&self) {
        let _irq = InterruptGuard::new();
        let mut rq = self.rq.lock();
        rq.clock += 1;
        let now = rq.clock;

        let mut i = 0;
        while i < rq.sleepers.len() {
            if rq.sleepers[i].deadline <= now {
                let expired = rq.sleepers.remove(i);
                debug!("sched: cpu{} {} timed out", self.cpu, expired.task);
                self.enqueue(&mut rq, expired.task, true);
            } else {
                i += 1;
            }
        }

        let Some(current) = rq.current else {
            return;
        };

        if Some(current) == rq.idle {
            if let Some(next) = rq.ready.pop_front() {
                self.requeue_prev(&mut rq, current);
                self.switch(rq, current, next, || {});
            }
            return;
        }

        let slice = self.time_slice;
        let expired = self
            .tasks
            .with_mut(current, |task| {
                task.time_slice = task.time_slice.saturating_sub(1);
                if task.time_slice == 0 {
                    task.time_slice = slice;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        if expired {
            if let Some(next) = rq.ready.pop_front() {
                trace!("sched: cpu{} preempts {}", self.cpu, current);
                self.requeue_prev(&mut rq, current);
                self.switch(rq, current, next, || {});
            }
        }
    }

    fn current_locked(&self, rq: &RqState) -> TaskId {
        match rq.current {
            Some(current) => current,
            None => panic!("cpu{}: scheduler has no current task", self.cpu),
        }
    }

    /// 取下一个要运行的任务：运行队列队头，否则 idle
    fn pick_next(&self, rq: &mut RqState) -> TaskId {
        if let Some(next) = rq.ready.pop_front() {
            return next;
        }
        match rq.idle {
            Some(idle) => idle,
            None => {
                error!("cpu{}: no runnable task and no idle task", self.cpu);
                panic!("cpu{}: no runnable task", self.cpu);
            }
        }
    }

    /// 被抢占或主动让出的任务回到队尾；idle 不入队
    fn requeue_prev(&self, rq: &mut RqState, prev: TaskId) {
        if Some(prev) == rq.idle {
            self.tasks.with_mut(prev, |task| task.state = TaskState::Ready);
            return;
        }
        let cpu = self.cpu;
        self.tasks.with_mut(prev, |task| {
            task.state = TaskState::Ready;
            task.link = TaskLink::Ready { cpu };
        });
        rq.ready.push_back(prev);
    }

    /// 从 `prev` 切换到 `next`
    ///
    /// 调用前 `prev` 的状态已经更新。持锁期间登记新的 current 并取出
    /// 两端的帧，释放运行队列锁后调用 `unlock`，最后切换。`prev` 再次
    /// 被选中时从这里返回。
    fn switch(&self, mut rq: IrqSpinLockGuard<'_, RqState>, prev: TaskId, next: TaskId, unlock: impl FnOnce()) {
        assert_ne!(prev, next, "cpu{}: switching {} to itself", self.cpu, prev);
        rq.current = Some(next);
        rq.nr_switches += 1;

        let cpu = self.cpu;
        let slice = self.time_slice;
        let frames = self.tasks.with_pair_mut(prev, next, |prev_task, next_task| {
            next_task.state = TaskState::Running;
            next_task.link = TaskLink::None;
            next_task.time_slice = slice;
            (prev_task.switch_frame(cpu), next_task.prepare_switch(cpu))
        });
        let Some((prev_frame, next_frame)) = frames else {
            panic!("cpu{}: cannot switch {} -> {}, stale task", cpu, prev, next);
        };
        drop(rq);
        unlock();

        trace!("sched: cpu{} switch {} -> {}", cpu, prev, next);
        unsafe { context::save_and_switch(&prev_frame, &next_frame) };
    }

    /// idle 循环：有就绪任务就让出，否则等待中断
    fn idle_loop(&self) -> ! {
        loop {
            self.reap_zombie();
            if self.nr_ready() > 0 {
                self.yield_now();
            } else {
                cpu::wait_for_interrupt();
            }
        }
    }
}

extern "C" fn idle_entry() {
    super::this_cpu().idle_loop()
}

#[cfg(test)]
mod tests {
    use crate::tests::boot_cpu;

    #[test]
    #[should_panic(expected = "idle task cannot block")]
    fn idle_cannot_block() {
        let sched = boot_cpu(0);
        {
            let mut rq = sched.rq.lock();
            rq.current = rq.idle;
        }
        let _ = sched.block_current_task(|| {});
    }

    #[test]
    #[should_panic(expected = "idle task cannot exit")]
    fn idle_cannot_exit() {
        let sched = boot_cpu(0);
        {
            let mut rq = sched.rq.lock();
            rq.current = rq.idle;
        }
        sched.exit_current();
    }

    #[test]
    #[should_panic(expected = "no runnable task")]
    fn blocking_without_idle_panics() {
        let sched = boot_cpu(0);
        sched.rq.lock().idle = None;
        let _ = sched.block_current_task(|| {});
    }
}
