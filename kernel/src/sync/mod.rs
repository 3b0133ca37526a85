//! 同步原语 (Synchronization Primitives)
//!
//! 遵循 Linux 内核的同步机制设计：
//! - `include/linux/spinlock.h` - 关中断自旋锁
//! - `include/linux/wait.h` - 等待队列
//! - `include/linux/semaphore.h` - 信号量
//! - `include/linux/mutex.h` - 睡眠互斥锁
//!
//! 锁顺序：等待队列锁 → 运行队列锁 → 任务表锁

pub mod irq_lock;
pub mod semaphore;
pub mod wait_queue;

pub use irq_lock::{InterruptGuard, IrqSpinLock, IrqSpinLockGuard, IrqToken};
pub use semaphore::{Mutex, MutexGuard, Semaphore};
pub use wait_queue::{WaitQueue, Waiter};
