//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核日志
//!
//! 把 `log` 门面接到控制台上。每条记录带上级别和当前 CPU；
//! 最大级别来自 Kernel.toml 的 `[debug] log_level`。

use log::{LevelFilter, Log, Metadata, Record};

use crate::config::LOG_LEVEL;
use crate::errno::Errno;
use crate::sched;

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match sched::try_this_cpu() {
            Some(sched) => println!("[{:>5}][cpu{}] {}", record.level(), sched.cpu(), record.args()),
            None => println!("[{:>5}][boot] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// 解析日志级别字符串，无法识别时使用 `Info`
pub fn parse_level(level: &str) -> LevelFilter {
    match level {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// 安装内核日志器
///
/// # 返回
/// 已经安装过日志器时返回 `Errno::DeviceOrResourceBusy`
pub fn init() -> Result<(), Errno> {
    log::set_logger(&LOGGER).map_err(|_| Errno::DeviceOrResourceBusy)?;
    log::set_max_level(parse_level(LOG_LEVEL));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("trace"), LevelFilter::Trace);
        assert_eq!(parse_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("loud"), LevelFilter::Info);
    }
}
