//! 任务管理模块
//!
//! 本模块实现任务的表示和创建：
//! - `task`: 任务控制块 (task_struct)
//! - `table`: 任务表，按 `TaskId` 持有全部任务
//! - `stack`: 内核栈
//! - `pid`: PID 分配
//! - `elf`: ELF 可执行文件解析
//! - `usermod`: 用户态任务加载

pub mod elf;
pub mod pid;
pub mod stack;
pub mod table;
pub mod task;
pub mod usermod;

pub use table::TaskTable;
pub use task::{KernelEntry, Task, TaskFlags, TaskId, TaskLink, TaskState};
pub use usermod::{spawn_user_thread, ImageSource, UserLoader};

use crate::errno::Errno;
use crate::sched;

/// 内核任务的退出跳板
///
/// 入口函数返回后经 `arch::context::kernel_exit_return_address` 指向的
/// 跳板落到这里
pub extern "C" fn kernel_task_exit() -> ! {
    sched::this_cpu().exit_current()
}

/// 在当前 CPU 的任务表中创建内核任务
///
/// 任务处于 `Ready`，需要 `schedule_task` 才会运行
pub fn create_kernel_task(name: &str, entry: KernelEntry) -> Result<TaskId, Errno> {
    sched::this_cpu().tasks().create_kernel_task(name, entry)
}

/// 获取当前任务的 PID
pub fn current_pid() -> u32 {
    let sched = sched::this_cpu();
    let irq = crate::sync::InterruptGuard::new();
    let current = sched.current_task(&irq.token());
    sched.tasks().with(current, Task::pid).unwrap_or(pid::PID_IDLE)
}
