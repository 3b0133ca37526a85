//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! hosted 后端
//!
//! 在宿主操作系统上模拟一组 CPU：
//! - 中断使能位是线程局部的标志，随任务（线程）保存
//! - 每 CPU 指针保存在线程局部变量中，任务线程启动时继承切换者的值
//! - 每个任务对应一个宿主线程，切换时唤醒 next、挂起 prev

pub mod context;
pub mod cpu;
