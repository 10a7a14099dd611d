//! Swappable values for real-time threads.
//!
//! A [`ManagedValue`] holds one value that a control thread may replace at any
//! time while real-time readers (an audio render callback, a control loop) keep
//! reading it. Readers never block, allocate or free; replaced values are queued
//! and destroyed later on the control side, once a reader has come back for a
//! fresh value and so can no longer be using the old one.
//!
//! Several cells sharing a [`BatchCoordinator`] can be updated together: readers
//! see either all of a batch's writes or none of them.
//!
//! ```
//! use rt_managed_value::{BatchCoordinator, ManagedValue, ManualScheduler};
//!
//! let coordinator = BatchCoordinator::new();
//! let driver = ManualScheduler::new();
//! let mut value = ManagedValue::builder(&coordinator)
//!     .scheduler(driver.clone())
//!     .build();
//! let reader = value.reader();
//!
//! value.set_raw(Box::new(1u32));
//! value.set_raw(Box::new(2u32));
//! assert_eq!(value.pending_count(), 1);
//!
//! // The reader's next cycle marks `1` as no longer in use...
//! assert_eq!(unsafe { reader.get_ref() }, Some(&2));
//! // ...and the driver destroys it.
//! driver.tick();
//! assert_eq!(value.pending_count(), 0);
//! ```
//!
//! 供实时线程使用的可替换值。
//!
//! [`ManagedValue`] 持有一个值，控制线程可以随时替换它，而实时读者（音频渲染回调、
//! 控制循环）持续读取它。读者从不阻塞、分配或释放内存；被替换的值会被排队，
//! 在读者回来获取新值（因此不可能再使用旧值）之后，于控制端销毁。
//!
//! 共享同一个 [`BatchCoordinator`] 的多个单元可以一起更新：读者要么看到一个批次的
//! 全部写入，要么一个也看不到。

mod batch;
mod builder;
mod driver;
mod policy;
mod queue;
mod reader;
mod state;
mod sync;
mod value;

pub use batch::BatchCoordinator;
pub use builder::ManagedValueBuilder;
pub use driver::{ManualScheduler, ReclaimThread, Scheduler, ThreadScheduler, TickFn};
pub use policy::{Retired, ValueKind};
pub use reader::{RealtimeReader, realtime_value};
pub use value::ManagedValue;

#[cfg(all(test, not(feature = "loom")))]
mod tests;
