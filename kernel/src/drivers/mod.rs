//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 设备驱动模块
//!
//! 调度核心只依赖两类设备：中断控制器和周期时钟。具体的控制器驱动由
//! 平台代码提供，这里定义它们需要实现的接口和时钟中断的处理路径。

pub mod intc;
pub mod timer;
