//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存管理模块
//!
//! 调度核心只需要两样东西：内核堆（裸机目标）和地址空间句柄

pub mod address_space;

#[cfg(target_os = "none")]
pub mod heap;

pub use address_space::{AddressSpace, MapFlags, MemoryManager};

#[cfg(target_os = "none")]
pub use heap::init_heap;
