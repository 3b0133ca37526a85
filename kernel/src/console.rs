//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 控制台输出
//!
//! 裸机下写 COM1 串口 (16550 UART)，宿主环境下写标准输出。

#[cfg(target_os = "none")]
mod imp {
    use core::arch::asm;

    const COM1: u16 = 0x3F8;
    /// 线路状态寄存器
    const LSR: u16 = COM1 + 5;
    /// 发送保持寄存器空
    const LSR_THR_EMPTY: u8 = 1 << 5;

    unsafe fn outb(port: u16, value: u8) {
        asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }

    unsafe fn inb(port: u16) -> u8 {
        let value: u8;
        asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        value
    }

    /// 38400 8N1，关闭串口中断
    pub fn init() {
        unsafe {
            outb(COM1 + 1, 0x00);
            outb(COM1 + 3, 0x80);
            outb(COM1, 0x03);
            outb(COM1 + 1, 0x00);
            outb(COM1 + 3, 0x03);
            outb(COM1 + 2, 0xC7);
            outb(COM1 + 4, 0x0B);
        }
    }

    pub fn putchar(c: u8) {
        unsafe {
            while inb(LSR) & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            outb(COM1, c);
        }
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    use std::io::Write;

    pub fn init() {}

    pub fn putchar(c: u8) {
        let _ = std::io::stdout().lock().write_all(&[c]);
    }
}

/// 初始化控制台
pub fn init() {
    imp::init();
}

/// 写入单个字符
pub fn putchar(c: u8) {
    imp::putchar(c);
}
