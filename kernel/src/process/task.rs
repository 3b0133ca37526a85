//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 任务控制块 (Task Control Block)
//!
//! 对应 Linux 内核 `struct task_struct` (include/linux/sched.h) 中与调度
//! 相关的部分：寄存器帧、内核栈、地址空间引用、调度状态。
//!
//! 任务本身存放在 `TaskTable` 中，运行队列和等待队列只保存 `TaskId`。
//! 任务属于哪个队列由 `TaskLink` 标记，入队前检查它来保证一个任务
//! 同一时刻最多在一个队列中。

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

use crate::arch::frame::{Privilege, RegisterFrame};
use crate::arch::{context, SwitchFrame, ThreadState};
use crate::config::{KERNEL_STACK_SIZE, TIME_SLICE_TICKS};
use crate::errno::Errno;
use crate::mm::AddressSpace;

use super::pid::{alloc_pid, PID_IDLE};
use super::stack::KernelStack;

/// 内核任务入口
///
/// 入口函数返回即任务退出
pub type KernelEntry = extern "C" fn();

/// 任务状态
///
/// 新任务处于 `Ready`；`Exiting` 是终态
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// 在运行队列中等待，或刚创建尚未入队
    Ready,
    /// 正在某个 CPU 上运行
    Running,
    /// 在等待队列上睡眠（或定时睡眠）
    Blocked,
    /// 已退出，等待回收
    Exiting,
}

/// 任务所在的链表
///
/// 对应 Linux 中 task_struct::run_list / wait_queue_entry::entry 的挂接关系
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskLink {
    /// 不在任何队列中
    None,
    /// 在 `cpu` 的运行队列中
    Ready { cpu: usize },
    /// 在某个等待队列中，`ticket` 标识这一次等待
    Waiting { ticket: u64 },
}

bitflags! {
    /// 任务标志，对应 Linux 的 PF_* (include/linux/sched.h)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        /// 内核线程
        const KTHREAD = 1 << 0;
        /// 运行在用户态
        const USER    = 1 << 1;
        /// 每 CPU 的 idle 任务
        const IDLE    = 1 << 2;
        /// 接管引导上下文的任务
        const BOOT    = 1 << 3;
    }
}

/// 任务句柄
///
/// 槽位下标加代数，任务被回收后旧句柄不会误指向复用槽位的新任务
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl TaskId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}.{}", self.index, self.generation)
    }
}

/// 任务控制块
pub struct Task {
    /// 寄存器帧，任务不运行时保存其完整上下文
    frame: RegisterFrame,
    /// 体系结构私有状态
    thread: ThreadState,
    pid: u32,
    name: String,
    flags: TaskFlags,
    pub(crate) state: TaskState,
    pub(crate) link: TaskLink,
    /// 第一次入队时绑定的 CPU，之后不再迁移
    pub(crate) cpu: Option<usize>,
    /// 剩余时间片（滴答）
    pub(crate) time_slice: u32,
    /// 最近一次阻塞是否因超时结束
    pub(crate) timed_out: bool,
    kernel_stack: Option<KernelStack>,
    address_space: Option<Arc<AddressSpace>>,
}

impl Task {
    /// 创建内核任务
    ///
    /// 分配内核栈，在栈顶压入退出跳板的地址，入口函数返回时经跳板
    /// 进入 `kernel_task_exit`
    ///
    /// # 参数
    /// * `name` - 任务名
    /// * `entry` - 入口函数
    ///
    /// # 返回
    /// 内核栈分配失败返回 `Errno::OutOfMemory`
    pub fn new_kernel(name: &str, entry: KernelEntry) -> Result<Self, Errno> {
        let pid = alloc_pid()?;
        Self::build_kernel(pid, name, entry, TaskFlags::KTHREAD)
    }

    /// 创建 idle 任务，永远不进入运行队列
    pub(crate) fn new_idle(cpu: usize, entry: KernelEntry) -> Result<Self, Errno> {
        let mut task = Self::build_kernel(PID_IDLE, "idle", entry, TaskFlags::KTHREAD | TaskFlags::IDLE)?;
        task.cpu = Some(cpu);
        Ok(task)
    }

    fn build_kernel(pid: u32, name: &str, entry: KernelEntry, flags: TaskFlags) -> Result<Self, Errno> {
        let mut stack = KernelStack::new(KERNEL_STACK_SIZE)?;
        let sp = stack.push_return_address(context::kernel_exit_return_address());
        let frame = RegisterFrame::new(entry as usize as u64, sp, Privilege::Kernel);
        let thread = ThreadState::new(&frame, stack.top());
        Ok(Self {
            frame,
            thread,
            pid,
            name: String::from(name),
            flags,
            state: TaskState::Ready,
            link: TaskLink::None,
            cpu: None,
            time_slice: TIME_SLICE_TICKS,
            timed_out: false,
            kernel_stack: Some(stack),
            address_space: None,
        })
    }

    /// 创建用户任务
    ///
    /// 用户态帧从 `entry` 开始执行，栈指针为 `user_stack_top - 8`；
    /// 另外分配一块内核栈供陷入内核时使用
    ///
    /// # 参数
    /// * `name` - 任务名
    /// * `space` - 任务使用的地址空间，引用计数加一
    /// * `entry` - 用户态入口地址
    /// * `user_stack_top` - 用户栈顶，必须 16 字节对齐
    pub fn new_user(
        name: &str,
        space: Arc<AddressSpace>,
        entry: u64,
        user_stack_top: u64,
    ) -> Result<Self, Errno> {
        if user_stack_top % 16 != 0 || user_stack_top < 16 {
            return Err(Errno::InvalidArgument);
        }
        let pid = alloc_pid()?;
        let stack = KernelStack::new(KERNEL_STACK_SIZE)?;
        let frame = RegisterFrame::new(entry, user_stack_top - 8, Privilege::User);
        let thread = ThreadState::new(&frame, stack.top());
        Ok(Self {
            frame,
            thread,
            pid,
            name: String::from(name),
            flags: TaskFlags::USER,
            state: TaskState::Ready,
            link: TaskLink::None,
            cpu: None,
            time_slice: TIME_SLICE_TICKS,
            timed_out: false,
            kernel_stack: Some(stack),
            address_space: Some(space),
        })
    }

    /// 接管当前正在运行的上下文
    ///
    /// 帧在第一次被换下时才写入，内核栈沿用引导栈
    pub(crate) fn adopt_current(cpu: usize, name: &str) -> Self {
        Self {
            frame: RegisterFrame::default(),
            thread: ThreadState::current(),
            pid: PID_IDLE,
            name: String::from(name),
            flags: TaskFlags::KTHREAD | TaskFlags::BOOT,
            state: TaskState::Running,
            link: TaskLink::None,
            cpu: Some(cpu),
            time_slice: TIME_SLICE_TICKS,
            timed_out: false,
            kernel_stack: None,
            address_space: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn link(&self) -> TaskLink {
        self.link
    }

    /// 绑定的 CPU
    pub fn cpu(&self) -> Option<usize> {
        self.cpu
    }

    pub fn time_slice(&self) -> u32 {
        self.time_slice
    }

    pub fn is_idle(&self) -> bool {
        self.flags.contains(TaskFlags::IDLE)
    }

    /// 保存的寄存器帧
    pub fn frame(&self) -> &RegisterFrame {
        &self.frame
    }

    /// 修改入口地址
    ///
    /// 只允许在任务第一次运行之前或者阻塞期间修改
    pub fn set_instruction_pointer(&mut self, addr: u64) {
        assert!(
            self.state != TaskState::Running,
            "{}: cannot rewrite the frame of a running task",
            self.name
        );
        self.frame.set_instruction_pointer(addr);
    }

    pub fn address_space(&self) -> Option<&Arc<AddressSpace>> {
        self.address_space.as_ref()
    }

    pub fn kernel_stack(&self) -> Option<&KernelStack> {
        self.kernel_stack.as_ref()
    }

    /// 准备切换到本任务
    ///
    /// 装载任务的地址空间（内核任务沿用当前的），并取出交给切换原语的
    /// 帧指针和线程状态。调用者持有调度器锁，随后释放所有锁再切换。
    pub(crate) fn prepare_switch(&mut self, cpu: usize) -> SwitchFrame {
        if let Some(space) = &self.address_space {
            space.activate();
        }
        self.switch_frame(cpu)
    }

    /// 换下本任务时保存上下文的位置
    pub(crate) fn switch_frame(&mut self, cpu: usize) -> SwitchFrame {
        SwitchFrame {
            frame: &mut self.frame,
            thread: self.thread.clone(),
            cpu,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("link", &self.link)
            .field("flags", &self.flags)
            .field("cpu", &self.cpu)
            .field("rip", &format_args!("{:#x}", self.frame.rip))
            .finish()
    }
}
