//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关代码
//!
//! 当前支持的后端：
//! - **x86_64 裸机** (`target_os = "none"`) - cli/sti 中断控制，GS base 保存
//!   每 CPU 指针，`iretq` 完成上下文切换
//! - **hosted** (其他目标) - 每个任务由一个宿主线程承载，切换时在线程间
//!   传递运行令牌，同一个模拟 CPU 上任意时刻只有一个线程在运行；用于
//!   在宿主机上运行调度器和等待队列的测试
//!
//! 两个后端导出相同的接口：`cpu` (中断与每 CPU 数据) 和 `context`
//! (`ThreadState`、`save_and_switch`、`context_switch_to`、
//! `kernel_exit_return_address`)。

pub mod frame;

#[cfg(target_os = "none")]
pub mod x86_64;

#[cfg(target_os = "none")]
pub use self::x86_64::{context, cpu};

#[cfg(not(target_os = "none"))]
pub mod hosted;

#[cfg(not(target_os = "none"))]
pub use self::hosted::{context, cpu};

pub use context::ThreadState;
pub use frame::{Privilege, RegisterFrame};

/// 一次上下文切换的一端
///
/// 由调度器在持锁期间从任务中取出，释放所有锁之后交给
/// `context::save_and_switch` / `context::context_switch_to`
pub struct SwitchFrame {
    /// 任务的寄存器帧（任务被回收之前地址不变）
    pub frame: *mut RegisterFrame,
    /// 任务的体系结构私有状态
    pub thread: ThreadState,
    /// 执行切换的 CPU
    pub cpu: usize,
}
