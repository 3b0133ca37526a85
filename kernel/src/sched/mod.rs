//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! 遵循 Linux 内核的调度器结构 (kernel/sched/)：
//! - 运行队列 (rq): 每个 CPU 一个 `Scheduler`
//! - 调度入口: `block_current_task` / `yield_now` / `exit_current` / `tick`
//!
//! 当前实现: FIFO 轮转 + 时间片抢占，不做跨 CPU 负载均衡。
//! 唤醒总是回到任务最初所在的 CPU。

pub mod runqueue;
pub mod sched;

pub use runqueue::RunQueue;
pub use sched::Scheduler;

use spin::Once;

use crate::arch::cpu;
use crate::config::MAX_CPUS;
use crate::errno::Errno;
use crate::process::TaskTable;

static SCHEDULERS: [Once<Scheduler>; MAX_CPUS] = [const { Once::new() }; MAX_CPUS];

/// 初始化 CPU `cpu` 的调度器并接管当前执行流
///
/// 在每个 CPU 的启动路径上调用一次
pub fn init_cpu(cpu: usize, tasks: &'static TaskTable) -> Result<&'static Scheduler, Errno> {
    let slot = SCHEDULERS.get(cpu).ok_or(Errno::InvalidArgument)?;
    if slot.is_completed() {
        return Err(Errno::DeviceOrResourceBusy);
    }
    let sched = slot.call_once(|| Scheduler::new(cpu, tasks));
    sched.bootstrap()?;
    Ok(sched)
}

/// 已初始化的 CPU 调度器
pub fn cpu_scheduler(cpu: usize) -> Option<&'static Scheduler> {
    SCHEDULERS.get(cpu)?.get()
}

/// 当前 CPU 的调度器，尚未初始化时返回 `None`
pub fn try_this_cpu() -> Option<&'static Scheduler> {
    let ptr = cpu::cpu_local();
    if ptr == 0 {
        None
    } else {
        // 每 CPU 指针只由 Scheduler::bootstrap 写入，指向 'static 调度器
        Some(unsafe { &*(ptr as *const Scheduler) })
    }
}

/// 当前 CPU 的调度器
pub fn this_cpu() -> &'static Scheduler {
    match try_this_cpu() {
        Some(sched) => sched,
        None => panic!("scheduler is not running on this cpu"),
    }
}

/// 主动让出当前 CPU
pub fn yield_now() {
    this_cpu().yield_now();
}

/// 当前任务睡眠 `ticks` 个滴答
pub fn sleep_ticks(ticks: u64) {
    this_cpu().sleep_ticks(ticks);
}
