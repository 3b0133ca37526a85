//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 格式化输出宏
//!
//! 整行输出在控制台锁下完成，多个 CPU 或中断处理程序同时打印时不会交错

use core::fmt::{self, Write};

use crate::console;
use crate::sync::IrqSpinLock;

/// 串口终端需要 CR LF 换行
const SERIAL_CRLF: bool = cfg!(target_os = "none");

pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if SERIAL_CRLF && b == b'\n' {
                console::putchar(b'\r');
            }
            console::putchar(b);
        }
        Ok(())
    }
}

static CONSOLE: IrqSpinLock<Console> = IrqSpinLock::new(Console);

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let mut console = CONSOLE.lock();
    let _ = console.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(::core::format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print::_print(::core::format_args!("{}\n", ::core::format_args!($($arg)*))));
}
