//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 地址空间句柄
//!
//! 对应 Linux 的 struct mm_struct 中调度器关心的部分：页表根 (pgd)
//! 和引用计数 (mm_users)。页表本身由内存管理子系统维护，这里通过
//! `MemoryManager` 接口创建、映射和销毁。
//!
//! 多个任务（同一进程的线程）共享一个 `Arc<AddressSpace>`；最后一个
//! 引用释放时销毁页表，所以地址空间一定比引用它的任务活得久。

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use log::{debug, trace};

use crate::arch::cpu;
use crate::errno::Errno;

bitflags! {
    /// 映射权限
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC  = 1 << 2;
        const USER  = 1 << 3;
    }
}

/// 页表管理接口
///
/// 由内存管理子系统实现；调度核心只通过它拿到一个不透明的页表根
pub trait MemoryManager: Send + Sync {
    /// 创建一个新的用户地址空间，返回页表根（物理地址）
    fn create_address_space(&self) -> Result<usize, Errno>;

    /// 在 `root` 中映射 `[vaddr, vaddr + mem_size)`，前 `data.len()` 字节
    /// 从 `data` 复制，其余清零
    fn map_region(
        &self,
        root: usize,
        vaddr: u64,
        data: &[u8],
        mem_size: u64,
        flags: MapFlags,
    ) -> Result<(), Errno>;

    /// 释放页表及其映射的全部内存
    fn destroy_address_space(&self, root: usize);
}

/// 地址空间
pub struct AddressSpace {
    root: usize,
    mm: &'static dyn MemoryManager,
    activations: AtomicU64,
}

impl AddressSpace {
    /// 通过 `mm` 创建新地址空间
    pub fn new(mm: &'static dyn MemoryManager) -> Result<Arc<Self>, Errno> {
        let root = mm.create_address_space()?;
        debug!("mm: new address space root={:#x}", root);
        Ok(Arc::new(Self {
            root,
            mm,
            activations: AtomicU64::new(0),
        }))
    }

    /// 页表根
    pub fn root(&self) -> usize {
        self.root
    }

    /// 映射一段区域
    pub fn map(&self, vaddr: u64, data: &[u8], mem_size: u64, flags: MapFlags) -> Result<(), Errno> {
        if (data.len() as u64) > mem_size {
            return Err(Errno::InvalidArgument);
        }
        vaddr.checked_add(mem_size).ok_or(Errno::BadAddress)?;
        self.mm.map_region(self.root, vaddr, data, mem_size, flags)
    }

    /// 在当前 CPU 上装载这个地址空间
    ///
    /// 由调度器在切换到引用它的任务之前调用，调用时已关中断
    pub fn activate(&self) {
        trace!("mm: activate root={:#x}", self.root);
        cpu::load_address_space(self.root);
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    /// 被装载的次数
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        debug!("mm: destroy address space root={:#x}", self.root);
        self.mm.destroy_address_space(self.root);
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("root", &format_args!("{:#x}", self.root))
            .field("activations", &self.activations())
            .finish()
    }
}
