//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Weft 启动入口
//!
//! 接管引导 CPU，启动调度器，运行一组用信号量协作的生产者/消费者
//! 内核任务。

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use core::sync::atomic::{AtomicU64, Ordering};

use log::info;

use weft::config::{KERNEL_NAME, KERNEL_VERSION};
use weft::errno::Errno;
use weft::process::TaskTable;
use weft::sync::{Mutex, Semaphore};
use weft::{logger, println, sched};

const ITEMS: u64 = 16;
const BUFFER_SLOTS: i32 = 4;

static TASKS: TaskTable = TaskTable::new();

static FULL: Semaphore = Semaphore::new(0);
static EMPTY: Semaphore = Semaphore::new(BUFFER_SLOTS);
static CHECKSUM: Mutex<u64> = Mutex::new(0);
static CONSUMED: AtomicU64 = AtomicU64::new(0);

extern "C" fn producer() {
    for _ in 0..ITEMS {
        EMPTY.down();
        FULL.up();
        sched::yield_now();
    }
    info!("producer: done");
}

extern "C" fn consumer() {
    for item in 1..=ITEMS {
        FULL.down();
        *CHECKSUM.lock() += item;
        CONSUMED.fetch_add(1, Ordering::Release);
        EMPTY.up();
    }
    info!("consumer: done");
}

fn kernel_main() -> Result<(), Errno> {
    weft::console::init();
    logger::init()?;
    println!("{} {}", KERNEL_NAME, KERNEL_VERSION);

    let sched = sched::init_cpu(0, &TASKS)?;
    sched.spawn("producer", producer)?;
    sched.spawn("consumer", consumer)?;

    while CONSUMED.load(Ordering::Acquire) < ITEMS {
        sched.yield_now();
    }
    sched.yield_now();

    info!(
        "demo: {} items, checksum {}, {} switches",
        ITEMS,
        *CHECKSUM.lock(),
        sched.nr_switches()
    );
    Ok(())
}

#[cfg(not(target_os = "none"))]
fn main() {
    if let Err(err) = kernel_main() {
        println!("{}: boot failed: {}", KERNEL_NAME, err);
        std::process::exit(1);
    }
}

#[cfg(target_os = "none")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    weft::mm::init_heap();
    if let Err(err) = kernel_main() {
        log::error!("boot failed: {}", err);
    }
    info!("heap: {} bytes in use", weft::mm::heap::heap_used());
    loop {
        if let Some(sched) = sched::try_this_cpu() {
            sched.yield_now();
        }
        weft::arch::cpu::wait_for_interrupt();
    }
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    weft::arch::cpu::local_irq_disable();
    println!("[PANIC] {}", info);
    loop {
        core::hint::spin_loop();
    }
}
