//! Weft 内核构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成 src/config.rs 配置常量

use std::env;
use std::fs;
use std::path::PathBuf;

/// 读取 `[section] key` 形式的整数配置
fn int_of(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 读取 `[section] key` 形式的字符串配置
fn str_of<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");

    let config = match fs::read_to_string("../Kernel.toml") {
        Ok(content) => toml::from_str(&content).expect("Kernel.toml 解析失败"),
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using built-in defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    let name = str_of(&config, "general", "name", "Weft");
    let version = str_of(&config, "general", "version", "0.1.0");
    println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
    println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", version);

    let mut log_level = str_of(&config, "debug", "log_level", "info");
    if env::var_os("CARGO_FEATURE_DEBUG_LOG").is_some() {
        log_level = "trace";
    }

    generate_config_code(&config, name, version, log_level);

    println!("cargo:warning=Weft configuration loaded successfully");
}

fn generate_config_code(config: &toml::Value, name: &str, version: &str, log_level: &str) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR 未设置"));

    let hz = int_of(config, "scheduler", "hz", 100).max(1);
    let slice_ms = int_of(config, "scheduler", "default_time_slice_ms", 100);
    // 时间片至少一个滴答
    let slice_ticks = (slice_ms * hz / 1000).max(1);

    let config_header = format!(
        r#"//! Weft 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{name}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{version}";

// ============================================================
// 内存配置
// ============================================================

/// 内核堆大小（字节）
pub const KERNEL_HEAP_SIZE: usize = {heap};

/// 内核栈大小（字节）
pub const KERNEL_STACK_SIZE: usize = {kstack};

/// 用户栈大小 (字节)
pub const USER_STACK_SIZE: usize = {ustack};

/// 用户栈顶地址
pub const USER_STACK_TOP: u64 = {ustack_top:#x};

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {cpus};

// ============================================================
// 调度器配置
// ============================================================

/// 每个任务表的最大任务数
pub const MAX_TASKS: usize = {tasks};

/// 时钟中断频率
pub const HZ: u64 = {hz};

/// 默认时间片 (毫秒)
pub const DEFAULT_TIME_SLICE_MS: u32 = {slice_ms};

/// 时间片滴答数
pub const TIME_SLICE_TICKS: u32 = {slice_ticks};

// ============================================================
// 调试配置
// ============================================================

/// 日志级别
pub const LOG_LEVEL: &str = "{log_level}";
"#,
        heap = int_of(config, "memory", "kernel_heap_size", 16) * 1024 * 1024,
        kstack = int_of(config, "memory", "kernel_stack_size", 64) * 1024,
        ustack = int_of(config, "memory", "user_stack_size", 256) * 1024,
        ustack_top = int_of(config, "memory", "user_stack_top", 0x0000_7fff_ffff_f000),
        cpus = int_of(config, "smp", "max_cpus", 4),
        tasks = int_of(config, "scheduler", "max_tasks", 64),
    );

    let config_file = manifest_dir.join("src").join("config.rs");
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    if existing_content != config_header {
        fs::write(&config_file, &config_header)
            .expect("写入配置文件失败");
    }
}
