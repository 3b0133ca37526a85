//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核栈
//!
//! 对应 Linux 的 alloc_thread_stack_node()/free_thread_stack_node()
//! (kernel/fork.c)

use alloc::alloc::{alloc_zeroed, dealloc};
use core::alloc::Layout;
use core::ptr::NonNull;

use crate::errno::Errno;

/// 栈对齐，满足 x86_64 SysV ABI
const STACK_ALIGN: usize = 16;

/// 一块从全局分配器取得的内核栈，析构时归还
pub struct KernelStack {
    base: NonNull<u8>,
    layout: Layout,
}

// 栈内存只被拥有它的任务使用
unsafe impl Send for KernelStack {}
unsafe impl Sync for KernelStack {}

impl KernelStack {
    /// 分配并清零一块内核栈
    ///
    /// # 返回
    /// 内存不足时返回 `Errno::OutOfMemory`
    pub fn new(size: usize) -> Result<Self, Errno> {
        if size < STACK_ALIGN {
            return Err(Errno::InvalidArgument);
        }
        let layout = Layout::from_size_align(size, STACK_ALIGN)
            .map_err(|_| Errno::InvalidArgument)?;
        let base = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(Errno::OutOfMemory)?;
        Ok(Self { base, layout })
    }

    /// 栈底（最低地址）
    pub fn bottom(&self) -> u64 {
        self.base.as_ptr() as u64
    }

    /// 栈顶（最高地址，16 字节对齐）
    pub fn top(&self) -> u64 {
        self.bottom() + self.layout.size() as u64
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// 在栈顶压入一个返回地址，返回新的栈指针
    ///
    /// 入口函数执行 `ret` 时会跳到这个地址；压入后 rsp ≡ 8 (mod 16)，
    /// 和一次普通 `call` 之后的状态一致
    pub fn push_return_address(&mut self, addr: u64) -> u64 {
        let sp = self.top() - 8;
        unsafe {
            (sp as *mut u64).write(addr);
        }
        sp
    }
}

impl Drop for KernelStack {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) }
    }
}
