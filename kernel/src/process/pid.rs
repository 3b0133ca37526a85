//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! PID 管理
//!
//! - PID 0: 每个 CPU 的引导任务和 idle 任务
//! - PID 1+: 普通任务，全局递增分配

use core::sync::atomic::{AtomicU32, Ordering};

use crate::errno::Errno;

pub const PID_MAX_LIMIT: u32 = 4194304; // 4M

pub const PID_IDLE: u32 = 0;
pub const PID_FIRST: u32 = 1;

static NEXT_PID: AtomicU32 = AtomicU32::new(PID_FIRST);

/// 分配一个新的 PID
///
/// PID 空间耗尽时返回 `Errno::TryAgain`
pub fn alloc_pid() -> Result<u32, Errno> {
    let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
    if pid >= PID_MAX_LIMIT {
        // 钉在上限，计数器不再增长
        NEXT_PID.store(PID_MAX_LIMIT, Ordering::Relaxed);
        Err(Errno::TryAgain)
    } else {
        Ok(pid)
    }
}
