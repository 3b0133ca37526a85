//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 时钟中断
//!
//! 对应 Linux 的 tick 处理路径 (kernel/time/tick-common.c)：
//! 全局 jiffies 由 CPU 0 推进，每个 CPU 的时钟中断都会调用
//! 调度器的 `tick`（对应 scheduler_tick）。
//!
//! 处理顺序：先发 EOI，再进入调度器。调度器可能在 `tick` 中切换到
//! 其他任务，被切走的中断处理要等任务再次运行时才返回。

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::info;
use spin::Once;

use crate::config::HZ;
use crate::drivers::intc::IrqController;
use crate::errno::Errno;
use crate::sched::{self, Scheduler};

/// 全局滴答计数
static JIFFIES: AtomicU64 = AtomicU64::new(0);

/// 时钟所在的中断线
struct TimerLine {
    intc: &'static dyn IrqController,
    line: u32,
}

static TIMER: Once<TimerLine> = Once::new();

/// 初始化进行中或已完成
static CLAIMED: AtomicBool = AtomicBool::new(false);

/// 周期时钟源
///
/// 由平台时钟驱动（PIT、LAPIC timer、HPET……）实现
pub trait TickSource {
    /// 每 `period_ms` 毫秒在中断上下文调用一次 `callback`
    fn register_tick_callback(&self, callback: fn(), period_ms: u64) -> Result<(), Errno>;
}

/// 读取 jiffies
pub fn get_jiffies() -> u64 {
    JIFFIES.load(Ordering::Relaxed)
}

/// jiffies 转毫秒
pub fn jiffies_to_msecs(jiffies: u64) -> u64 {
    jiffies.saturating_mul(1000) / HZ
}

/// 毫秒转 jiffies，向上取整
pub fn msecs_to_jiffies(msecs: u64) -> u64 {
    msecs.saturating_mul(HZ).div_ceil(1000)
}

/// 初始化时钟中断
///
/// 校验中断线归 `intc` 管理，向时钟源注册回调，然后解除屏蔽
///
/// # 返回
/// - `Errno::InvalidArgument` - 中断线不在控制器范围内
/// - `Errno::DeviceOrResourceBusy` - 已经初始化过
/// - 时钟源注册失败时原样返回其错误，之后可以重试
pub fn init(intc: &'static dyn IrqController, line: u32, source: &dyn TickSource) -> Result<(), Errno> {
    if !intc.handles(line) {
        return Err(Errno::InvalidArgument);
    }
    if CLAIMED.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
        return Err(Errno::DeviceOrResourceBusy);
    }

    let period_ms = (1000 / HZ).max(1);
    if let Err(err) = source.register_tick_callback(timer_interrupt, period_ms) {
        // 注册失败不占用时钟，允许换一个时钟源重试
        CLAIMED.store(false, Ordering::Release);
        return Err(err);
    }
    TIMER.call_once(|| TimerLine { intc, line });
    intc.enable_irq_line(line);
    info!("timer: irq {} at {} Hz", line, HZ);
    Ok(())
}

/// 注册给时钟源的回调
pub fn timer_interrupt() {
    if let Some(timer) = TIMER.get() {
        handle_tick(timer.intc, timer.line, sched::try_this_cpu());
    }
}

/// 处理一次时钟中断
///
/// # 参数
/// * `intc` - 发出中断的控制器
/// * `line` - 中断线
/// * `sched` - 当前 CPU 的调度器，尚未启动调度时为 `None`
pub fn handle_tick(intc: &dyn IrqController, line: u32, sched: Option<&Scheduler>) {
    if sched.map_or(true, |s| s.cpu() == 0) {
        JIFFIES.fetch_add(1, Ordering::Relaxed);
    }
    intc.send_eoi(line);
    if let Some(sched) = sched {
        sched.tick();
    }
}
