//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 中断控制器接口
//!
//! 对应 Linux 的 struct irq_chip (include/linux/irq.h) 中调度路径用到的
//! 操作：EOI、屏蔽、解除屏蔽

use core::ops::Range;

/// 中断控制器
pub trait IrqController: Send + Sync {
    /// 通知控制器当前中断处理结束
    fn send_eoi(&self, line: u32);

    /// 解除屏蔽
    fn enable_irq_line(&self, line: u32);

    /// 屏蔽
    fn disable_irq_line(&self, line: u32);

    /// 本控制器负责的中断线范围
    fn responsible_irq_line_range(&self) -> Range<u32>;

    /// `line` 是否由本控制器负责
    fn handles(&self, line: u32) -> bool {
        self.responsible_irq_line_range().contains(&line)
    }
}
