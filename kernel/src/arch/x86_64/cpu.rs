//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! x86_64 CPU 操作
//!
//! 对应 Linux 的 arch/x86/include/asm/irqflags.h 与 msr.h

use core::arch::asm;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::frame::RFLAGS_IF;
use crate::config::MAX_CPUS;

/// IA32_GS_BASE MSR，内核用它保存每 CPU 数据指针
const IA32_GS_BASE: u32 = 0xC000_0101;

/// 每个 CPU 从用户态陷入时使用的内核栈顶
///
/// 由中断入口代码写入 TSS.RSP0
pub static KERNEL_ENTRY_STACK: [AtomicU64; MAX_CPUS] = [const { AtomicU64::new(0) }; MAX_CPUS];

#[inline]
fn read_rflags() -> u64 {
    let rflags: u64;
    unsafe {
        asm!("pushfq", "pop {}", out(reg) rflags, options(nomem, preserves_flags));
    }
    rflags
}

/// 当前是否开中断
#[inline]
pub fn irqs_enabled() -> bool {
    read_rflags() & RFLAGS_IF != 0
}

/// 关中断
#[inline]
pub fn local_irq_disable() {
    unsafe {
        asm!("cli", options(nostack));
    }
}

/// 开中断
#[inline]
pub fn local_irq_enable() {
    unsafe {
        asm!("sti", options(nostack));
    }
}

/// 关中断并返回之前的状态
///
/// 对应 Linux 的 local_irq_save()
#[inline]
pub fn local_irq_save() -> bool {
    let enabled = irqs_enabled();
    local_irq_disable();
    enabled
}

/// 恢复 `local_irq_save` 保存的状态
#[inline]
pub fn local_irq_restore(enabled: bool) {
    if enabled {
        local_irq_enable();
    }
}

/// 开中断并停机，直到下一个中断到来
pub fn wait_for_interrupt() {
    unsafe {
        asm!("sti", "hlt", options(nomem, nostack));
    }
}

unsafe fn rdmsr(msr: u32) -> u64 {
    let (low, high): (u32, u32);
    asm!("rdmsr", in("ecx") msr, out("eax") low, out("edx") high, options(nomem, nostack, preserves_flags));
    ((high as u64) << 32) | low as u64
}

unsafe fn wrmsr(msr: u32, value: u64) {
    asm!(
        "wrmsr",
        in("ecx") msr,
        in("eax") value as u32,
        in("edx") (value >> 32) as u32,
        options(nostack, preserves_flags)
    );
}

/// 读取每 CPU 数据指针
#[inline]
pub fn cpu_local() -> usize {
    unsafe { rdmsr(IA32_GS_BASE) as usize }
}

/// 设置每 CPU 数据指针
pub fn set_cpu_local(ptr: usize) {
    unsafe { wrmsr(IA32_GS_BASE, ptr as u64) }
}

/// 切换页表根
///
/// 与当前 CR3 相同时跳过，避免无谓地冲刷 TLB
pub fn load_address_space(root: usize) {
    let current: u64;
    unsafe {
        asm!("mov {}, cr3", out(reg) current, options(nomem, nostack, preserves_flags));
        if current != root as u64 {
            asm!("mov cr3, {}", in(reg) root as u64, options(nostack, preserves_flags));
        }
    }
}

/// 记录某个 CPU 的内核入口栈
pub fn set_kernel_entry_stack(cpu: usize, top: u64) {
    if let Some(slot) = KERNEL_ENTRY_STACK.get(cpu) {
        slot.store(top, Ordering::Relaxed);
    }
}
