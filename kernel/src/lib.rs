//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Weft 内核调度核心
//!
//! 任务、等待队列、每 CPU 调度器以及时钟中断的衔接。裸机目标
//! (`x86_64-unknown-none`) 使用真正的寄存器帧切换；其他目标上每个任务
//! 由一个宿主线程承载，便于在 `cargo test` 中运行。

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

#[macro_use]
pub mod print;

pub mod arch;
pub mod config;
pub mod console;
pub mod drivers;
pub mod errno;
pub mod logger;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;

#[cfg(test)]
mod tests;
