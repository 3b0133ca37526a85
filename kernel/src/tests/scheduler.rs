//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器测试：轮转、时间片抢占、睡眠、退出回收、不变式检查

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::config::{MAX_CPUS, MAX_TASKS};
use crate::errno::Errno;
use crate::process::pid::PID_IDLE;
use crate::process::{self, TaskFlags, TaskId, TaskState, TaskTable, UserLoader};
use crate::sched::{self, Scheduler};
use crate::sync::WaitQueue;

use super::{boot_cpu, boot_cpu_with, build_elf, run_until_idle, MockImages, MockMemory};

#[test]
fn bootstrap_adopts_current_thread() {
    let sched = boot_cpu(0);
    let boot = sched.current_task_opt().unwrap();
    let idle = sched.idle_task().unwrap();

    assert_ne!(boot, idle);
    assert_eq!(sched.tasks().len(), 2);
    assert_eq!(sched.tasks().with(boot, |t| t.state()), Some(TaskState::Running));
    assert!(sched.tasks().with(boot, |t| t.flags().contains(TaskFlags::BOOT)).unwrap());
    assert!(sched.tasks().with(idle, |t| t.is_idle()).unwrap());
    assert!(core::ptr::eq(sched::this_cpu(), sched));

    // 没有其他就绪任务时让出立即返回
    sched.yield_now();
    assert_eq!(sched.nr_switches(), 0);
    assert_eq!(sched.current_task_opt(), Some(boot));
}

#[test]
fn yield_rotates_ready_tasks() {
    static ORDER: spin::Mutex<Vec<(u8, u32)>> = spin::Mutex::new(Vec::new());

    fn worker(tag: u8) {
        for round in 0..3 {
            ORDER.lock().push((tag, round));
            sched::yield_now();
        }
    }
    extern "C" fn a() {
        worker(b'a');
    }
    extern "C" fn b() {
        worker(b'b');
    }

    let sched = boot_cpu(0);
    sched.spawn("a", a).unwrap();
    sched.spawn("b", b).unwrap();
    assert_eq!(sched.nr_ready(), 2);
    run_until_idle(sched);

    let order = ORDER.lock().clone();
    let expected: Vec<_> = (0..3).flat_map(|round| [(b'a', round), (b'b', round)]).collect();
    assert_eq!(order, expected);
    // 两个任务都已回收，只剩引导任务和 idle
    assert_eq!(sched.tasks().len(), 2);
}

#[test]
fn ticks_preempt_running_task() {
    static ORDER: spin::Mutex<Vec<u8>> = spin::Mutex::new(Vec::new());

    fn busy(tag: u8) {
        let sched = sched::this_cpu();
        for _ in 0..3 {
            ORDER.lock().push(tag);
            // 时间片为 2，第二个滴答把任务换下
            sched.tick();
            sched.tick();
        }
    }
    extern "C" fn a() {
        busy(b'a');
    }
    extern "C" fn b() {
        busy(b'b');
    }

    let tasks: &'static TaskTable = Box::leak(Box::new(TaskTable::new()));
    let sched = boot_cpu_with(0, tasks, Some(2));
    assert_eq!(sched.time_slice(), 2);
    sched.spawn("a", a).unwrap();
    sched.spawn("b", b).unwrap();
    run_until_idle(sched);

    assert_eq!(*ORDER.lock(), b"ababab".to_vec());
    assert_eq!(sched.clock(), 12);
}

#[test]
fn zero_time_slice_is_clamped() {
    let tasks: &'static TaskTable = Box::leak(Box::new(TaskTable::new()));
    let sched = Scheduler::with_time_slice(0, tasks, 0);
    assert_eq!(sched.time_slice(), 1);
}

#[test]
fn sleep_wakes_after_deadline() {
    static WOKE_AT: AtomicU64 = AtomicU64::new(0);

    extern "C" fn sleeper() {
        let sched = sched::this_cpu();
        sched.sleep_ticks(3);
        WOKE_AT.store(sched.clock(), Ordering::SeqCst);
    }

    let sched = boot_cpu(0);
    let id = sched.spawn("sleeper", sleeper).unwrap();
    run_until_idle(sched);
    assert_eq!(sched.tasks().with(id, |t| t.state()), Some(TaskState::Blocked));

    sched.tick();
    sched.tick();
    assert_eq!(sched.nr_ready(), 0);
    sched.tick();
    assert_eq!(sched.ready_tasks(), vec![id]);

    run_until_idle(sched);
    assert_eq!(WOKE_AT.load(Ordering::SeqCst), 3);
    assert!(!sched.tasks().contains(id));
}

#[test]
fn exactly_one_running_task() {
    static IDS: spin::Mutex<Vec<TaskId>> = spin::Mutex::new(Vec::new());
    static SAMPLES: spin::Mutex<Vec<(bool, usize)>> = spin::Mutex::new(Vec::new());

    extern "C" fn observer() {
        let sched = sched::this_cpu();
        for _ in 0..2 {
            let ids = IDS.lock().clone();
            let me = sched.current_task_opt();
            let running = ids
                .iter()
                .filter(|&&id| sched.tasks().with(id, |t| t.state()) == Some(TaskState::Running))
                .count();
            let self_running = me.and_then(|me| sched.tasks().with(me, |t| t.state())) == Some(TaskState::Running);
            SAMPLES.lock().push((self_running, running));
            sched.yield_now();
        }
    }

    let sched = boot_cpu(0);
    let boot = sched.current_task_opt().unwrap();
    let a = sched.spawn("a", observer).unwrap();
    let b = sched.spawn("b", observer).unwrap();
    IDS.lock().extend([boot, a, b]);
    run_until_idle(sched);

    let samples = SAMPLES.lock().clone();
    assert_eq!(samples.len(), 4);
    assert!(samples.iter().all(|&(me, running)| me && running == 1), "{:?}", samples);
}

#[test]
fn exited_tasks_are_reaped() {
    static RAN: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn short_lived() {
        RAN.fetch_add(1, Ordering::SeqCst);
    }

    let sched = boot_cpu(0);
    let ids: Vec<_> = (0..5).map(|_| sched.spawn("short", short_lived).unwrap()).collect();
    assert_eq!(sched.tasks().len(), 7);
    run_until_idle(sched);

    assert_eq!(RAN.load(Ordering::SeqCst), 5);
    assert_eq!(sched.tasks().len(), 2);
    assert!(ids.iter().all(|&id| !sched.tasks().contains(id)));
    // 槽位可以复用
    sched.spawn("again", short_lived).unwrap();
    run_until_idle(sched);
    assert_eq!(RAN.load(Ordering::SeqCst), 6);
}

#[test]
fn init_cpu_validates_slot() {
    static TASKS: TaskTable = TaskTable::new();

    assert_eq!(sched::init_cpu(MAX_CPUS, &TASKS).err(), Some(Errno::InvalidArgument));
    let cpu = MAX_CPUS - 1;
    let sched = sched::init_cpu(cpu, &TASKS).unwrap();
    assert_eq!(sched.cpu(), cpu);
    assert!(core::ptr::eq(sched::cpu_scheduler(cpu).unwrap(), sched));
    assert_eq!(sched::init_cpu(cpu, &TASKS).err(), Some(Errno::DeviceOrResourceBusy));
}

#[test]
#[should_panic(expected = "already on the run queue")]
fn scheduling_queued_task_twice_panics() {
    extern "C" fn never_runs() {}

    let sched = boot_cpu(0);
    let id = sched.spawn("queued", never_runs).unwrap();
    sched.schedule_task(id);
}

#[test]
#[should_panic(expected = "cannot schedule")]
fn scheduling_running_task_panics() {
    let sched = boot_cpu(0);
    let boot = sched.current_task_opt().unwrap();
    sched.schedule_task(boot);
}

#[test]
#[should_panic(expected = "is bound to cpu0")]
fn waking_on_foreign_cpu_panics() {
    static PARKED: WaitQueue = WaitQueue::new();

    extern "C" fn parked() {
        let _ = PARKED.wait(|| false);
    }

    let tasks: &'static TaskTable = Box::leak(Box::new(TaskTable::new()));
    let sched0 = boot_cpu_with(0, tasks, None);
    let id = sched0.spawn("parked", parked).unwrap();
    run_until_idle(sched0);
    assert_eq!(tasks.with(id, |t| t.state()), Some(TaskState::Blocked));

    let sched1: &'static Scheduler = Box::leak(Box::new(Scheduler::new(1, tasks)));
    sched1.schedule_task(id);
}

#[test]
fn tasks_see_their_own_pid() {
    static SEEN: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn report() {
        SEEN.store(process::current_pid() as usize, Ordering::SeqCst);
    }

    let sched = boot_cpu(0);
    assert_eq!(process::current_pid(), PID_IDLE);

    let id = process::create_kernel_task("report", report).unwrap();
    let pid = sched.tasks().with(id, |t| t.pid()).unwrap();
    assert_eq!(sched.nr_ready(), 0);
    sched.schedule_task(id);
    run_until_idle(sched);
    assert_eq!(SEEN.load(Ordering::SeqCst), pid as usize);
}

#[test]
fn reaping_user_task_releases_address_space() {
    let memory = MockMemory::leak();
    let images = MockImages::default().with("/bin/true", build_elf(0x40_1000, 0x40_0000, &[0xc3], 0));

    let sched = boot_cpu(0);
    let id = UserLoader::new(&images, memory).create_user_task(sched.tasks(), "/bin/true").unwrap();
    let space = sched.tasks().with(id, |t| t.address_space().cloned()).unwrap().unwrap();

    // hosted 后端无法进入用户态，任务被切换到后直接退出
    sched.schedule_task(id);
    run_until_idle(sched);

    assert!(!sched.tasks().contains(id));
    assert_eq!(space.activations(), 1);
    assert_eq!(memory.destroyed.load(Ordering::SeqCst), 0);
    drop(space);
    assert_eq!(memory.destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn exit_after_tick_preemption_reaps_leftover_zombie() {
    static DONE: WaitQueue = WaitQueue::new();
    static FINISHED: AtomicUsize = AtomicUsize::new(0);
    static SHORT: spin::Mutex<Option<TaskId>> = spin::Mutex::new(None);
    static LEFT_BEHIND: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn preempted() {
        let sched = sched::this_cpu();
        // 时间片为 1：这个滴答切到 short，short 退出后直接切回这里，
        // 中断返回路径不回收，short 留在 zombie 槽位
        sched.tick();
        let short = (*SHORT.lock()).unwrap();
        if sched.tasks().contains(short) {
            LEFT_BEHIND.store(1, Ordering::SeqCst);
        }
        DONE.notify_all(|| FINISHED.store(1, Ordering::SeqCst));
    }
    extern "C" fn short_lived() {}

    let tasks: &'static TaskTable = Box::leak(Box::new(TaskTable::new()));
    let sched = boot_cpu_with(0, tasks, Some(1));
    let preempted_id = sched.spawn("preempted", preempted).unwrap();
    let short = sched.spawn("short", short_lived).unwrap();
    *SHORT.lock() = Some(short);

    // 引导任务阻塞，运行队列里只有 preempted 和 short
    DONE.wait(|| FINISHED.load(Ordering::SeqCst) == 1).unwrap();
    sched.reap_zombie();

    assert_eq!(LEFT_BEHIND.load(Ordering::SeqCst), 1);
    assert!(!tasks.contains(short));
    assert!(!tasks.contains(preempted_id));
    assert_eq!(tasks.len(), 2);
}

#[test]
fn full_table_fits_run_queue() {
    static RAN: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn counted() {
        RAN.fetch_add(1, Ordering::SeqCst);
    }

    let sched = boot_cpu(0);
    let mut spawned = 0;
    while sched.spawn("filler", counted).is_ok() {
        spawned += 1;
    }
    // 引导任务和 idle 各占一个槽位
    assert_eq!(spawned, MAX_TASKS - 2);
    assert_eq!(sched.nr_ready(), MAX_TASKS - 2);
    assert_eq!(sched.spawn("extra", counted).err(), Some(Errno::TryAgain));

    run_until_idle(sched);
    assert_eq!(RAN.load(Ordering::SeqCst), MAX_TASKS - 2);
    assert_eq!(sched.tasks().len(), 2);
}
