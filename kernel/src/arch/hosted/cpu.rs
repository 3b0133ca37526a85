//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! hosted CPU 操作

use std::cell::Cell;
use std::time::Duration;

thread_local! {
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
    static CPU_LOCAL: Cell<usize> = const { Cell::new(0) };
}

/// 空闲时让出宿主 CPU 的时长
const IDLE_NAP: Duration = Duration::from_micros(100);

/// 当前是否开中断
#[inline]
pub fn irqs_enabled() -> bool {
    IRQ_ENABLED.with(Cell::get)
}

/// 关中断
#[inline]
pub fn local_irq_disable() {
    IRQ_ENABLED.with(|flag| flag.set(false));
}

/// 开中断
#[inline]
pub fn local_irq_enable() {
    IRQ_ENABLED.with(|flag| flag.set(true));
}

/// 关中断并返回之前的状态
#[inline]
pub fn local_irq_save() -> bool {
    IRQ_ENABLED.with(|flag| flag.replace(false))
}

/// 恢复 `local_irq_save` 保存的状态
#[inline]
pub fn local_irq_restore(enabled: bool) {
    IRQ_ENABLED.with(|flag| flag.set(enabled));
}

/// 开中断并短暂休眠，模拟 `hlt`
pub fn wait_for_interrupt() {
    local_irq_enable();
    std::thread::sleep(IDLE_NAP);
}

/// 读取每 CPU 数据指针
#[inline]
pub fn cpu_local() -> usize {
    CPU_LOCAL.with(Cell::get)
}

/// 设置每 CPU 数据指针
pub fn set_cpu_local(ptr: usize) {
    CPU_LOCAL.with(|slot| slot.set(ptr));
}

/// 宿主机没有页表可切换
pub fn load_address_space(_root: usize) {}
