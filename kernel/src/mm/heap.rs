//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核堆
//!
//! 裸机目标上的全局分配器：一块静态数组交给 linked_list_allocator 管理。
//! 任务表、内核栈、等待队列项都从这里分配。

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicBool, Ordering};

use linked_list_allocator::LockedHeap;
use log::info;

use crate::config::KERNEL_HEAP_SIZE;

#[global_allocator]
static HEAP: LockedHeap = LockedHeap::empty();

static mut HEAP_ARENA: [u8; KERNEL_HEAP_SIZE] = [0; KERNEL_HEAP_SIZE];

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// 初始化内核堆，只在引导 CPU 上调用一次
pub fn init_heap() {
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return;
    }
    unsafe {
        HEAP.lock().init(addr_of_mut!(HEAP_ARENA) as *mut u8, KERNEL_HEAP_SIZE);
    }
    info!("heap: {} KB at {:p}", KERNEL_HEAP_SIZE / 1024, addr_of_mut!(HEAP_ARENA));
}

/// 已使用的堆字节数
pub fn heap_used() -> usize {
    HEAP.lock().used()
}
