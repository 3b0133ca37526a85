//! Weft 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Weft";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// 内存配置
// ============================================================

/// 内核堆大小（字节）
pub const KERNEL_HEAP_SIZE: usize = 16777216;

/// 内核栈大小（字节）
pub const KERNEL_STACK_SIZE: usize = 65536;

/// 用户栈大小 (字节)
pub const USER_STACK_SIZE: usize = 262144;

/// 用户栈顶地址
pub const USER_STACK_TOP: u64 = 0x7ffffffff000;

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 4;

// ============================================================
// 调度器配置
// ============================================================

/// 每个任务表的最大任务数
pub const MAX_TASKS: usize = 64;

/// 时钟中断频率
pub const HZ: u64 = 100;

/// 默认时间片 (毫秒)
pub const DEFAULT_TIME_SLICE_MS: u32 = 100;

/// 时间片滴答数
pub const TIME_SLICE_TICKS: u32 = 10;

// ============================================================
// 调试配置
// ============================================================

/// 日志级别
pub const LOG_LEVEL: &str = "info";
