//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! hosted 上下文切换
//!
//! 每个任务由一个 `Fiber` 承载。第一次被切换到时才创建宿主线程，线程
//! 从寄存器帧的 rip 开始执行内核入口函数；之后的切换只是在两个 Fiber
//! 之间传递运行令牌：先让 next 可运行，再让 prev 等待自己的令牌。

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::warn;

use crate::arch::cpu;
use crate::arch::frame::{Privilege, RegisterFrame};
use crate::arch::SwitchFrame;

struct FiberState {
    /// 宿主线程是否已创建（或者是被接管的现有线程）
    started: bool,
    /// 运行令牌
    runnable: bool,
}

struct Fiber {
    state: Mutex<FiberState>,
    wakeup: Condvar,
}

impl Fiber {
    fn new(started: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FiberState { started, runnable: false }),
            wakeup: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FiberState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 让 Fiber 继续运行；尚未启动的 Fiber 在这里创建宿主线程
    fn resume(&self, frame: *const RegisterFrame, cpu_local: usize) {
        let mut state = self.lock();
        if state.started {
            state.runnable = true;
            self.wakeup.notify_one();
            return;
        }
        state.started = true;
        drop(state);

        // 帧在任务第一次运行前不会被修改
        let frame = unsafe { *frame };
        let spawned = thread::Builder::new()
            .name("weft-task".into())
            .spawn(move || fiber_main(frame, cpu_local));
        if let Err(err) = spawned {
            panic!("failed to start task thread: {}", err);
        }
    }

    /// 等待运行令牌
    fn park(&self) {
        let mut state = self.lock();
        while !state.runnable {
            state = self.wakeup.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.runnable = false;
    }
}

fn fiber_main(frame: RegisterFrame, cpu_local: usize) {
    cpu::set_cpu_local(cpu_local);
    cpu::local_irq_restore(frame.interrupts_enabled());

    match frame.privilege() {
        Privilege::Kernel => {
            let entry: extern "C" fn() = unsafe { core::mem::transmute(frame.rip as usize) };
            entry();
            crate::process::kernel_task_exit()
        }
        Privilege::User => {
            warn!("hosted backend cannot enter user mode (rip={:#x}), task exits", frame.rip);
            crate::sched::this_cpu().exit_current()
        }
    }
}

/// 任务的体系结构私有状态
#[derive(Clone)]
pub struct ThreadState {
    fiber: Arc<Fiber>,
}

impl ThreadState {
    /// 为新任务创建状态，宿主线程延迟到第一次切换时创建
    pub fn new(_frame: &RegisterFrame, _kernel_stack_top: u64) -> Self {
        Self { fiber: Fiber::new(false) }
    }

    /// 接管当前正在运行的线程（引导任务）
    pub fn current() -> Self {
        Self { fiber: Fiber::new(true) }
    }
}

/// 内核任务入口函数的返回地址
///
/// hosted 后端不经过栈返回，`fiber_main` 在入口返回后直接调用
/// `kernel_task_exit`
pub fn kernel_exit_return_address() -> u64 {
    crate::process::kernel_task_exit as usize as u64
}

/// 保存当前上下文到 `prev`，切换到 `next`
///
/// # Safety
/// 必须关中断调用；`next.frame` 在切换完成前必须有效
pub unsafe fn save_and_switch(prev: &SwitchFrame, next: &SwitchFrame) {
    next.thread.fiber.resume(next.frame, cpu::cpu_local());
    prev.thread.fiber.park();
}

/// 丢弃当前上下文，切换到 `next`
///
/// # Safety
/// 必须关中断调用；当前线程不会再被恢复
pub unsafe fn context_switch_to(next: &SwitchFrame) -> ! {
    next.thread.fiber.resume(next.frame, cpu::cpu_local());
    loop {
        thread::park();
    }
}
