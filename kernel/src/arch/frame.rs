//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! x86_64 寄存器帧
//!
//! 对应 Linux 的 struct pt_regs (arch/x86/include/asm/ptrace.h)：
//! 前 15 个字段是通用寄存器，按 r15..rax 顺序排列，后 5 个字段正好是
//! `iretq` 从栈上弹出的中断返回帧 (rip, cs, rflags, rsp, ss)。
//!
//! 恢复一个帧只需把栈指针指向它，依次弹出通用寄存器，再执行 `iretq`，
//! 特权级由 cs/ss 的选择子决定。

/// 内核代码段选择子 (GDT 第 1 项, RPL 0)
pub const KERNEL_CODE_SELECTOR: u64 = 1 << 3;
/// 内核数据段选择子 (GDT 第 2 项, RPL 0)
pub const KERNEL_DATA_SELECTOR: u64 = 2 << 3;
/// 用户代码段选择子 (GDT 第 3 项, RPL 3)
pub const USER_CODE_SELECTOR: u64 = (3 << 3) | 3;
/// 用户数据段选择子 (GDT 第 4 项, RPL 3)
pub const USER_DATA_SELECTOR: u64 = (4 << 3) | 3;

/// RFLAGS.IF 中断使能位
pub const RFLAGS_IF: u64 = 1 << 9;
/// RFLAGS 第 1 位保留，恒为 1
pub const RFLAGS_RESERVED: u64 = 1 << 1;

/// 选择子中的请求特权级 (RPL) 掩码
const SELECTOR_RPL_MASK: u64 = 0b11;

/// 帧恢复后运行的特权级
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// ring 0
    Kernel,
    /// ring 3
    User,
}

/// 寄存器帧
///
/// 布局必须与上下文切换汇编中的偏移保持一致
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// 恢复后执行的第一条指令
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl RegisterFrame {
    /// 帧大小（字节）
    pub const SIZE: usize = core::mem::size_of::<RegisterFrame>();

    /// 构造一个新任务的初始帧
    ///
    /// 通用寄存器清零，中断使能，段选择子由 `privilege` 决定
    ///
    /// # 参数
    /// * `entry` - 入口地址
    /// * `stack_pointer` - 初始栈指针
    /// * `privilege` - 运行特权级
    pub const fn new(entry: u64, stack_pointer: u64, privilege: Privilege) -> Self {
        let (cs, ss) = match privilege {
            Privilege::Kernel => (KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR),
            Privilege::User => (USER_CODE_SELECTOR, USER_DATA_SELECTOR),
        };
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            rip: entry,
            cs,
            rflags: RFLAGS_IF | RFLAGS_RESERVED,
            rsp: stack_pointer,
            ss,
        }
    }

    /// 修改恢复地址
    ///
    /// 只能用于没有在运行的任务的帧
    pub fn set_instruction_pointer(&mut self, addr: u64) {
        self.rip = addr;
    }

    /// 当前恢复地址
    pub fn instruction_pointer(&self) -> u64 {
        self.rip
    }

    /// 当前栈指针
    pub fn stack_pointer(&self) -> u64 {
        self.rsp
    }

    /// 根据 cs 的 RPL 判断特权级
    pub fn privilege(&self) -> Privilege {
        if self.cs & SELECTOR_RPL_MASK == 0 {
            Privilege::Kernel
        } else {
            Privilege::User
        }
    }

    /// 恢复后是否开中断
    pub fn interrupts_enabled(&self) -> bool {
        self.rflags & RFLAGS_IF != 0
    }
}
