//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! x86_64 上下文切换
//!
//! 保存与恢复都以 `RegisterFrame` 为单位：
//! - `save_and_switch` 把调用者的全部通用寄存器、返回地址、cs、rflags、
//!   返回后的 rsp 和 ss 写进 prev 帧，然后直接跳到恢复路径。prev 被再次
//!   选中时，`iretq` 让它从 `save_and_switch` 返回
//! - `context_switch_to` 把栈指针指向 next 帧，弹出通用寄存器后 `iretq`，
//!   特权级由帧中的 cs/ss 决定
//!
//! 两者都要求调用时已关中断。

use core::arch::naked_asm;

use crate::arch::cpu;
use crate::arch::frame::RegisterFrame;
use crate::arch::SwitchFrame;

/// 任务的体系结构私有状态
#[derive(Debug, Clone)]
pub struct ThreadState {
    /// 从用户态陷入时使用的内核栈顶，0 表示沿用当前入口栈
    kernel_stack_top: u64,
}

impl ThreadState {
    /// 为新任务创建状态
    pub fn new(_frame: &RegisterFrame, kernel_stack_top: u64) -> Self {
        Self { kernel_stack_top }
    }

    /// 接管当前正在运行的上下文（引导任务）
    pub fn current() -> Self {
        Self { kernel_stack_top: 0 }
    }

    fn load(&self, cpu: usize) {
        if self.kernel_stack_top != 0 {
            cpu::set_kernel_entry_stack(cpu, self.kernel_stack_top);
        }
    }
}

/// 保存当前上下文到 `prev`，切换到 `next`
///
/// # Safety
/// 必须关中断调用；两个帧指针在切换完成前必须有效
pub unsafe fn save_and_switch(prev: &SwitchFrame, next: &SwitchFrame) {
    next.thread.load(next.cpu);
    save_frame_and_switch(prev.frame, next.frame);
}

/// 丢弃当前上下文，切换到 `next`
///
/// # Safety
/// 必须关中断调用；当前上下文不会再被恢复
pub unsafe fn context_switch_to(next: &SwitchFrame) -> ! {
    next.thread.load(next.cpu);
    restore_frame(next.frame)
}

/// 内核任务入口函数的返回地址
pub fn kernel_exit_return_address() -> u64 {
    kernel_exit_trampoline as usize as u64
}

/// 入口函数 `ret` 到这里时 rsp % 16 == 0，对齐后再 `call`，
/// `kernel_task_exit` 入口处满足 rsp % 16 == 8
#[unsafe(naked)]
unsafe extern "C" fn kernel_exit_trampoline() -> ! {
    naked_asm!(
        "and rsp, -16",
        "call {exit}",
        "ud2",
        exit = sym crate::process::kernel_task_exit,
    )
}

#[unsafe(naked)]
unsafe extern "C" fn restore_frame(frame: *const RegisterFrame) -> ! {
    naked_asm!(
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "iretq",
    )
}

#[unsafe(naked)]
unsafe extern "C" fn save_frame_and_switch(prev: *mut RegisterFrame, next: *const RegisterFrame) {
    naked_asm!(
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r11",
        "mov [rdi + 0x28], r10",
        "mov [rdi + 0x30], r9",
        "mov [rdi + 0x38], r8",
        "mov [rdi + 0x40], rbp",
        "mov [rdi + 0x48], rdi",
        "mov [rdi + 0x50], rsi",
        "mov [rdi + 0x58], rdx",
        "mov [rdi + 0x60], rcx",
        "mov [rdi + 0x68], rbx",
        "mov [rdi + 0x70], rax",
        // 恢复点：本函数的返回地址
        "mov rax, [rsp]",
        "mov [rdi + 0x78], rax",
        "xor eax, eax",
        "mov ax, cs",
        "mov [rdi + 0x80], rax",
        "pushfq",
        "pop qword ptr [rdi + 0x88]",
        // 恢复后相当于执行了 ret
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x90], rax",
        "xor eax, eax",
        "mov ax, ss",
        "mov [rdi + 0x98], rax",
        "mov rdi, rsi",
        "jmp {restore}",
        restore = sym restore_frame,
    )
}
