//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 寄存器帧与任务构造测试

use core::mem::offset_of;
use std::sync::atomic::Ordering;

use crate::arch::frame::{
    KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, RFLAGS_IF, USER_CODE_SELECTOR, USER_DATA_SELECTOR,
};
use crate::arch::{context, Privilege, RegisterFrame};
use crate::config::{USER_STACK_SIZE, USER_STACK_TOP};
use crate::errno::Errno;
use crate::mm::MapFlags;
use crate::process::{spawn_user_thread, Task, TaskFlags, TaskState, TaskTable, UserLoader};

use super::{build_elf, MockImages, MockMemory};

extern "C" fn nop_entry() {}

/// 汇编保存/恢复路径依赖的偏移
#[test]
fn register_frame_layout() {
    assert_eq!(RegisterFrame::SIZE, 20 * 8);
    assert_eq!(offset_of!(RegisterFrame, r15), 0x00);
    assert_eq!(offset_of!(RegisterFrame, rbp), 0x40);
    assert_eq!(offset_of!(RegisterFrame, rax), 0x70);
    assert_eq!(offset_of!(RegisterFrame, rip), 0x78);
    assert_eq!(offset_of!(RegisterFrame, cs), 0x80);
    assert_eq!(offset_of!(RegisterFrame, rflags), 0x88);
    assert_eq!(offset_of!(RegisterFrame, rsp), 0x90);
    assert_eq!(offset_of!(RegisterFrame, ss), 0x98);
}

#[test]
fn kernel_task_frame() {
    let task = Task::new_kernel("worker", nop_entry).unwrap();
    let frame = *task.frame();
    let stack = task.kernel_stack().unwrap();

    assert_eq!(frame.instruction_pointer(), nop_entry as usize as u64);
    assert_eq!(frame.cs, KERNEL_CODE_SELECTOR);
    assert_eq!(frame.ss, KERNEL_DATA_SELECTOR);
    assert_eq!(frame.privilege(), Privilege::Kernel);
    assert!(frame.rflags & RFLAGS_IF != 0);
    assert_eq!(frame.rax, 0);
    assert_eq!(frame.rdi, 0);

    // 栈顶是退出跳板的返回地址，入口处满足 SysV 的 rsp % 16 == 8
    assert_eq!(frame.stack_pointer(), stack.top() - 8);
    assert_eq!(frame.stack_pointer() % 16, 8);
    let ret = unsafe { *(frame.stack_pointer() as *const u64) };
    assert_eq!(ret, context::kernel_exit_return_address());

    assert_eq!(task.state(), TaskState::Ready);
    assert!(task.flags().contains(TaskFlags::KTHREAD));
    assert!(task.address_space().is_none());
    assert!(task.pid() > 0);
}

#[test]
fn set_instruction_pointer_before_first_run() {
    let mut task = Task::new_kernel("patched", nop_entry).unwrap();
    task.set_instruction_pointer(0xdead_0000);
    assert_eq!(task.frame().instruction_pointer(), 0xdead_0000);
    assert_eq!(task.frame().cs, KERNEL_CODE_SELECTOR);
}

#[test]
fn user_task_from_image() {
    let memory = MockMemory::leak();
    let images = MockImages::default().with("/bin/init", build_elf(0x40_1000, 0x40_0000, &[0x90; 32], 0x100));
    let tasks = TaskTable::with_capacity(4);

    let id = UserLoader::new(&images, memory).create_user_task(&tasks, "/bin/init").unwrap();

    let (frame, name, flags, has_space) = tasks
        .with(id, |task| (*task.frame(), String::from(task.name()), task.flags(), task.address_space().is_some()))
        .unwrap();
    assert_eq!(name, "init");
    assert!(flags.contains(TaskFlags::USER));
    assert!(has_space);

    assert_eq!(frame.instruction_pointer(), 0x40_1000);
    assert_eq!(frame.cs, USER_CODE_SELECTOR);
    assert_eq!(frame.ss, USER_DATA_SELECTOR);
    assert_eq!(frame.privilege(), Privilege::User);
    assert_eq!(frame.stack_pointer(), USER_STACK_TOP - 8);
    assert!(frame.interrupts_enabled());

    let regions = memory.regions.lock().clone();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[0], (0x40_0000, 32 + 0x100, MapFlags::READ | MapFlags::EXEC | MapFlags::USER));
    assert_eq!(
        regions[1],
        (
            USER_STACK_TOP - USER_STACK_SIZE as u64,
            USER_STACK_SIZE as u64,
            MapFlags::READ | MapFlags::WRITE | MapFlags::USER
        )
    );
    assert_eq!(memory.created.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_image_is_reported() {
    let memory = MockMemory::leak();
    let images = MockImages::default();
    let tasks = TaskTable::with_capacity(4);

    let err = UserLoader::new(&images, memory).create_user_task(&tasks, "/bin/nope").unwrap_err();
    assert_eq!(err, Errno::NoSuchFileOrDirectory);
    assert!(tasks.is_empty());
    assert_eq!(memory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn malformed_image_is_rejected() {
    let memory = MockMemory::leak();
    let mut bad_magic = build_elf(0x40_1000, 0x40_0000, &[0x90; 8], 0);
    bad_magic[1] = b'X';
    let mut wrong_machine = build_elf(0x40_1000, 0x40_0000, &[0x90; 8], 0);
    wrong_machine[18] = 0xb7; // EM_AARCH64
    let images = MockImages::default()
        .with("/bin/magic", bad_magic)
        .with("/bin/arm", wrong_machine)
        .with("/bin/short", vec![0x7f, b'E', b'L', b'F']);
    let tasks = TaskTable::with_capacity(4);
    let loader = UserLoader::new(&images, memory);

    for path in ["/bin/magic", "/bin/arm", "/bin/short"] {
        assert_eq!(loader.create_user_task(&tasks, path).unwrap_err(), Errno::ExecFormatError, "{}", path);
    }
    assert!(tasks.is_empty());
    assert_eq!(memory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn user_stack_top_must_be_aligned() {
    let memory = MockMemory::leak();
    let space = crate::mm::AddressSpace::new(memory).unwrap();
    let err = Task::new_user("misaligned", space, 0x40_1000, USER_STACK_TOP - 4).unwrap_err();
    assert_eq!(err, Errno::InvalidArgument);
    // 创建失败时地址空间引用随之释放
    assert_eq!(memory.destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn user_threads_share_address_space() {
    let memory = MockMemory::leak();
    let images = MockImages::default().with("/bin/server", build_elf(0x40_1000, 0x40_0000, &[0x90; 16], 0));
    let tasks = TaskTable::with_capacity(4);

    let main = UserLoader::new(&images, memory).create_user_task(&tasks, "/bin/server").unwrap();
    let space = tasks.with(main, |task| task.address_space().cloned()).unwrap().unwrap();

    let thread_stack = USER_STACK_TOP - USER_STACK_SIZE as u64;
    let worker = spawn_user_thread(&tasks, &space, 0x40_1800, thread_stack).unwrap();
    let frame = tasks.with(worker, |task| *task.frame()).unwrap();
    assert_eq!(frame.instruction_pointer(), 0x40_1800);
    assert_eq!(frame.stack_pointer(), thread_stack - 8);
    assert_eq!(frame.cs, USER_CODE_SELECTOR);

    let shared = tasks.with(worker, |task| task.address_space().map(|s| s.root())).unwrap();
    assert_eq!(shared, Some(space.root()));

    drop(tasks.remove(main));
    drop(tasks.remove(worker));
    assert_eq!(memory.destroyed.load(Ordering::SeqCst), 0);
    drop(space);
    assert_eq!(memory.destroyed.load(Ordering::SeqCst), 1);
}
