//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 单元测试模块
//!
//! 在 hosted 后端上运行：
//! ```bash
//! cargo test -p weft
//! ```
//!
//! 每个测试线程接管为一个 CPU 的引导任务，任务表和调度器都泄漏成
//! `'static`，测试之间互不共享。时钟中断由测试代码直接调用
//! `Scheduler::tick` 模拟。

mod frame;
mod scheduler;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errno::Errno;
use crate::mm::{MapFlags, MemoryManager};
use crate::process::{ImageSource, TaskTable};
use crate::sched::Scheduler;

/// 用独立的任务表启动一个 CPU 的调度器，当前测试线程成为引导任务
pub(crate) fn boot_cpu(cpu: usize) -> &'static Scheduler {
    let tasks: &'static TaskTable = Box::leak(Box::new(TaskTable::new()));
    boot_cpu_with(cpu, tasks, None)
}

/// 指定任务表和时间片启动调度器
pub(crate) fn boot_cpu_with(cpu: usize, tasks: &'static TaskTable, time_slice: Option<u32>) -> &'static Scheduler {
    let sched = match time_slice {
        Some(slice) => Scheduler::with_time_slice(cpu, tasks, slice),
        None => Scheduler::new(cpu, tasks),
    };
    let sched: &'static Scheduler = Box::leak(Box::new(sched));
    sched.bootstrap().expect("bootstrap scheduler");
    sched
}

/// 让出 CPU 直到运行队列为空，然后回收最后退出的任务
pub(crate) fn run_until_idle(sched: &Scheduler) {
    while sched.nr_ready() > 0 {
        sched.yield_now();
    }
    sched.reap_zombie();
}

/// 记录调用的页表管理器
#[derive(Default)]
pub(crate) struct MockMemory {
    next_root: AtomicUsize,
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub regions: spin::Mutex<Vec<(u64, u64, MapFlags)>>,
}

impl MockMemory {
    pub fn leak() -> &'static MockMemory {
        Box::leak(Box::new(MockMemory::default()))
    }
}

impl MemoryManager for MockMemory {
    fn create_address_space(&self) -> Result<usize, Errno> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(0x1000 * (self.next_root.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn map_region(&self, _root: usize, vaddr: u64, data: &[u8], mem_size: u64, flags: MapFlags) -> Result<(), Errno> {
        assert!(data.len() as u64 <= mem_size);
        self.regions.lock().push((vaddr, mem_size, flags));
        Ok(())
    }

    fn destroy_address_space(&self, _root: usize) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// 内存中的文件集合
#[derive(Default)]
pub(crate) struct MockImages {
    files: BTreeMap<&'static str, Vec<u8>>,
}

impl MockImages {
    pub fn with(mut self, path: &'static str, data: Vec<u8>) -> Self {
        self.files.insert(path, data);
        self
    }
}

impl ImageSource for MockImages {
    fn read(&self, path: &str) -> Result<Vec<u8>, Errno> {
        self.files.get(path).cloned().ok_or(Errno::NoSuchFileOrDirectory)
    }
}

/// 构造只有一个 PT_LOAD 段的 x86_64 ELF 可执行文件
pub(crate) fn build_elf(entry: u64, vaddr: u64, code: &[u8], bss: u64) -> Vec<u8> {
    const EHDR_SIZE: u64 = 64;
    const PHDR_SIZE: u64 = 56;

    let mut elf = Vec::new();
    elf.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1]);
    elf.extend_from_slice(&[0; 9]);
    elf.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    elf.extend_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    elf.extend_from_slice(&1u32.to_le_bytes());
    elf.extend_from_slice(&entry.to_le_bytes());
    elf.extend_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    elf.extend_from_slice(&0u64.to_le_bytes());
    elf.extend_from_slice(&0u32.to_le_bytes());
    elf.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    elf.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    elf.extend_from_slice(&1u16.to_le_bytes());
    elf.extend_from_slice(&[0; 6]);
    assert_eq!(elf.len() as u64, EHDR_SIZE);

    let offset = EHDR_SIZE + PHDR_SIZE;
    elf.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
    elf.extend_from_slice(&5u32.to_le_bytes()); // R | X
    elf.extend_from_slice(&offset.to_le_bytes());
    elf.extend_from_slice(&vaddr.to_le_bytes());
    elf.extend_from_slice(&vaddr.to_le_bytes());
    elf.extend_from_slice(&(code.len() as u64).to_le_bytes());
    elf.extend_from_slice(&(code.len() as u64 + bss).to_le_bytes());
    elf.extend_from_slice(&0x1000u64.to_le_bytes());
    assert_eq!(elf.len() as u64, offset);

    elf.extend_from_slice(code);
    elf
}
