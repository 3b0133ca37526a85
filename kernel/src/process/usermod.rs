//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 用户态任务加载器
//!
//! 对应 Linux 的 execve 路径中与任务创建相关的部分：
//! 1. 通过文件系统读出可执行映像
//! 2. 校验 ELF 格式，取出可加载段和入口地址
//! 3. 创建新地址空间，映射各段和用户栈
//! 4. 构造用户态寄存器帧
//!
//! 文件系统与页表都是外部协作者，分别通过 `ImageSource` 和
//! `MemoryManager` 接入。

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{info, warn};

use crate::config::{USER_STACK_SIZE, USER_STACK_TOP};
use crate::errno::Errno;
use crate::mm::{AddressSpace, MapFlags, MemoryManager};

use super::elf::ElfImage;
use super::table::TaskTable;
use super::task::{Task, TaskId};

/// 可执行映像来源
///
/// 由 VFS 实现
pub trait ImageSource {
    /// 读出 `path` 的全部内容
    ///
    /// 文件不存在时返回 `Errno::NoSuchFileOrDirectory`
    fn read(&self, path: &str) -> Result<Vec<u8>, Errno>;
}

/// 用户任务加载器
pub struct UserLoader<'a> {
    images: &'a dyn ImageSource,
    memory: &'static dyn MemoryManager,
}

impl<'a> UserLoader<'a> {
    pub fn new(images: &'a dyn ImageSource, memory: &'static dyn MemoryManager) -> Self {
        Self { images, memory }
    }

    /// 从 `path` 加载程序，创建用户任务
    ///
    /// 任务处于 `Ready`，尚未入队
    ///
    /// # 返回
    /// - `Errno::NoSuchFileOrDirectory` - 映像不存在
    /// - `Errno::ExecFormatError` - 不是合法的 x86_64 ELF 可执行文件
    /// - `Errno::OutOfMemory` - 地址空间或内核栈分配失败
    /// - `Errno::TryAgain` - 任务表已满
    pub fn create_user_task(&self, tasks: &TaskTable, path: &str) -> Result<TaskId, Errno> {
        let image = self.images.read(path).map_err(|err| {
            warn!("exec: cannot read {}: {}", path, err);
            err
        })?;
        let elf = ElfImage::parse(&image)?;

        let space = AddressSpace::new(self.memory)?;
        for segment in &elf.segments {
            space.map(segment.vaddr, segment.data, segment.mem_size, segment.flags)?;
        }
        let stack_bottom = USER_STACK_TOP - USER_STACK_SIZE as u64;
        space.map(
            stack_bottom,
            &[],
            USER_STACK_SIZE as u64,
            MapFlags::READ | MapFlags::WRITE | MapFlags::USER,
        )?;

        let name = path.rsplit('/').next().unwrap_or(path);
        let task = Task::new_user(name, space, elf.entry, USER_STACK_TOP)?;
        let pid = task.pid();
        let id = tasks.insert(task)?;
        info!("exec: {} pid={} entry={:#x} as {}", path, pid, elf.entry, id);
        Ok(id)
    }
}

/// 在已有地址空间中创建一个用户线程
///
/// 新任务与 `space` 的其他使用者共享页表，引用计数加一
///
/// # 参数
/// * `tasks` - 放入的任务表
/// * `space` - 共享的地址空间
/// * `entry` - 用户态入口
/// * `user_stack_top` - 线程自己的用户栈顶
pub fn spawn_user_thread(
    tasks: &TaskTable,
    space: &Arc<AddressSpace>,
    entry: u64,
    user_stack_top: u64,
) -> Result<TaskId, Errno> {
    let task = Task::new_user("thread", Arc::clone(space), entry, user_stack_top)?;
    tasks.insert(task)
}
