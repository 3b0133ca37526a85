//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 数值与 include/uapi/asm-generic/errno.h 一致，只收录调度与任务管理
//! 路径上会返回的错误

use core::fmt;

/// 标准错误代码
///
/// 可恢复错误通过 `Result<_, Errno>` 返回；调度器不变量被破坏属于
/// 内核 bug，直接 panic，不使用错误码
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such file or directory (ENOENT, 2)
    NoSuchFileOrDirectory = 2,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// Exec format error (ENOEXEC, 8)
    ExecFormatError = 8,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Connection timed out (ETIMEDOUT, 110)
    TimedOut = 110,
}

impl Errno {
    /// 转换为正数错误码
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 转换为系统调用返回值（负数）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 转换为寄存器中的返回值（负数的补码）
    #[inline]
    pub const fn as_neg_u64(self) -> u64 {
        (-(self as i64)) as u64
    }

    /// 从正数错误码还原
    pub const fn from_i32(code: i32) -> Option<Errno> {
        match code {
            constants::EPERM => Some(Errno::OperationNotPermitted),
            constants::ENOENT => Some(Errno::NoSuchFileOrDirectory),
            constants::ESRCH => Some(Errno::NoSuchProcess),
            constants::EINTR => Some(Errno::InterruptedSystemCall),
            constants::ENOEXEC => Some(Errno::ExecFormatError),
            constants::EAGAIN => Some(Errno::TryAgain),
            constants::ENOMEM => Some(Errno::OutOfMemory),
            constants::EFAULT => Some(Errno::BadAddress),
            constants::EBUSY => Some(Errno::DeviceOrResourceBusy),
            constants::EINVAL => Some(Errno::InvalidArgument),
            constants::ETIMEDOUT => Some(Errno::TimedOut),
            _ => None,
        }
    }

    /// 错误码的简短名称
    pub const fn name(self) -> &'static str {
        match self {
            Errno::OperationNotPermitted => "EPERM",
            Errno::NoSuchFileOrDirectory => "ENOENT",
            Errno::NoSuchProcess => "ESRCH",
            Errno::InterruptedSystemCall => "EINTR",
            Errno::ExecFormatError => "ENOEXEC",
            Errno::TryAgain => "EAGAIN",
            Errno::OutOfMemory => "ENOMEM",
            Errno::BadAddress => "EFAULT",
            Errno::DeviceOrResourceBusy => "EBUSY",
            Errno::InvalidArgument => "EINVAL",
            Errno::TimedOut => "ETIMEDOUT",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const ENOEXEC: i32 = 8;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ETIMEDOUT: i32 = 110;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(Errno::NoSuchFileOrDirectory.as_i32(), 2);
        assert_eq!(Errno::ExecFormatError.as_i32(), 8);
        assert_eq!(Errno::TryAgain.as_i32(), 11);
        assert_eq!(Errno::TimedOut.as_i32(), 110);
    }

    #[test]
    fn test_errno_negative() {
        assert_eq!(Errno::OutOfMemory.as_neg_i32(), -12);
        assert_eq!(Errno::TimedOut.as_neg_u64(), (-110i64) as u64);
    }

    #[test]
    fn test_errno_from_i32() {
        assert_eq!(Errno::from_i32(constants::ETIMEDOUT), Some(Errno::TimedOut));
        assert_eq!(Errno::from_i32(constants::EINVAL), Some(Errno::InvalidArgument));
        assert_eq!(Errno::from_i32(9999), None);
    }
}
