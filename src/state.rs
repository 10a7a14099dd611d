use crate::batch::{BatchCoordinator, SnapshotCommit};
use crate::driver::Scheduler;
use crate::policy::{ReleasePolicy, Retired, ValueKind};
use crate::queue::RetireQueue;
use crate::sync::{Arc, AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Mutex, Ordering, Weak};
use std::boxed::Box;
use std::ptr::{self, NonNull};
use std::time::Duration;

/// Default period of the reclamation driver.
/// 回收驱动器的默认周期。
pub(crate) const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_millis(100);

/// Writer/driver state. Never touched by the real-time reader.
/// 写入者/驱动器状态。实时读者从不访问。
pub(crate) struct Control<T> {
    pub(crate) policy: ReleasePolicy<T>,
    /// True from the first retirement until a tick finds nothing left pending.
    /// 从第一次退休开始为真，直到某次节拍发现没有待处理的条目为止。
    pub(crate) driver_active: bool,
}

/// State shared by a cell's writer handle, its readers and its driver.
///
/// Invariant: `pending_count == |deferred| + |pending| + |release|` whenever the
/// control lock is free.
///
/// 单元的写入者句柄、读者和驱动器共享的状态。
/// 不变量：当控制锁空闲时，`pending_count == |deferred| + |pending| + |release|`。
pub(crate) struct CellCore<T> {
    pub(crate) current: AtomicPtr<T>,
    /// Last value that is consistent outside an open batch.
    /// 在打开的批次之外保持一致的最后一个值。
    pub(crate) snapshot: AtomicPtr<T>,
    pub(crate) kind: AtomicU8,
    /// Retired values the reader may still hold.
    /// 读者可能仍在持有的已退休值。
    pub(crate) pending: RetireQueue<T>,
    /// Retired values past the reader's quiescence point.
    /// 已越过读者静止点的已退休值。
    pub(crate) release: RetireQueue<T>,
    /// Values retired inside an open batch, still named by the snapshot.
    /// 在打开的批次中退休、仍被快照引用的值。
    pub(crate) deferred: RetireQueue<T>,
    pub(crate) pending_count: AtomicUsize,
    /// Registered with the coordinator for the open batch.
    /// 已为当前打开的批次在协调器中注册。
    pub(crate) in_batch: AtomicBool,
    pub(crate) control: Mutex<Control<T>>,
    pub(crate) coordinator: BatchCoordinator,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) interval: Duration,
}

impl<T: Send + Sync + 'static> CellCore<T> {
    pub(crate) fn new(
        coordinator: BatchCoordinator,
        scheduler: Box<dyn Scheduler>,
        interval: Duration,
        policy: ReleasePolicy<T>,
    ) -> Self {
        CellCore {
            current: AtomicPtr::new(ptr::null_mut()),
            snapshot: AtomicPtr::new(ptr::null_mut()),
            kind: AtomicU8::new(ValueKind::Unset as u8),
            pending: RetireQueue::new(),
            release: RetireQueue::new(),
            deferred: RetireQueue::new(),
            pending_count: AtomicUsize::new(0),
            in_batch: AtomicBool::new(false),
            control: Mutex::new(Control {
                policy,
                driver_active: false,
            }),
            coordinator,
            scheduler,
            interval,
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> ValueKind {
        ValueKind::from_u8(self.kind.load(Ordering::Acquire))
    }

    /// Establish the cell's kind on first write, or check it matches.
    /// 在第一次写入时确定单元的类型，或检查其是否匹配。
    pub(crate) fn claim_kind(&self, kind: ValueKind) {
        let established = self.kind();
        if established == ValueKind::Unset {
            self.kind.store(kind as u8, Ordering::Release);
            return;
        }
        assert!(
            established == kind,
            "BUG: writing a {kind:?} value into a cell that holds {established:?} values. \
             A cell must use either set_raw or set_managed, not both."
        );
    }

    /// Swap in `new` and retire the previous value. Writer only.
    ///
    /// Outside a batch the snapshot moves to `new` before the old value is
    /// queued, so a fallback reader can only have loaded the old value before it
    /// became reclaimable. Inside a batch the snapshot keeps the pre-batch value,
    /// so the old value is parked in `deferred` until the batch commits.
    ///
    /// 换入 `new` 并退休之前的值。仅限写入者。
    /// 在批次之外，快照先指向 `new`，然后旧值才入队，因此回退读者只可能在旧值可被回收之前读到它。
    /// 在批次之内，快照保持批次前的值，因此旧值暂存在 `deferred` 中，直到批次提交。
    pub(crate) fn replace(self: &Arc<Self>, new: *mut T) {
        let old = self.current.swap(new, Ordering::AcqRel);

        if self.coordinator.is_batch_open() {
            if !self.in_batch.swap(true, Ordering::Relaxed) {
                let weak: Weak<dyn SnapshotCommit> = Arc::downgrade(self) as Weak<dyn SnapshotCommit>;
                self.coordinator.register(weak);
            }
            if let Some(old) = NonNull::new(old) {
                self.retire(old, &self.deferred);
            }
        } else {
            self.snapshot.store(new, Ordering::Release);
            if let Some(old) = NonNull::new(old) {
                self.retire(old, &self.pending);
            }
        }
    }

    fn retire(self: &Arc<Self>, old: NonNull<T>, queue: &RetireQueue<T>) {
        let mut control = self.control.lock();
        self.pending_count.fetch_add(1, Ordering::AcqRel);
        queue.push(old);

        if !control.driver_active {
            let cell = Arc::downgrade(self);
            let tick = Box::new(move || match cell.upgrade() {
                Some(cell) => cell.tick(),
                None => log::trace!("reclaim tick skipped, cell is gone"),
            });
            match self.scheduler.start(self.interval, tick) {
                Ok(()) => control.driver_active = true,
                Err(err) => log::warn!("failed to start reclaim driver, will retry on next write: {err}"),
            }
        }
    }

    /// One driver tick: release everything past the quiescence point, and stop
    /// the driver once nothing is pending.
    ///
    /// 一次驱动器节拍：释放所有已越过静止点的值，并在没有待处理条目时停止驱动器。
    pub(crate) fn tick(&self) {
        let mut control = self.control.lock();
        let released = self.release_ready(&mut control);
        let remaining = self.pending_count.load(Ordering::Acquire);
        log::trace!("reclaim tick released {released} values, {remaining} pending");

        if remaining == 0 && control.driver_active {
            control.driver_active = false;
            self.scheduler.stop();
        }
    }

    /// Destroy every entry already in the release queue.
    /// 销毁已在释放队列中的所有条目。
    fn release_ready(&self, control: &mut Control<T>) -> usize {
        let kind = self.kind();
        self.release.take_all(|value| {
            // SAFETY: queued handles came from `set_raw`/`set_managed` of this
            // cell's kind and each is dequeued exactly once.
            let retired = unsafe { Retired::from_handle(value, kind) };
            control.policy.release(retired);
            self.pending_count.fetch_sub(1, Ordering::AcqRel);
        })
    }

    /// Real-time read. Never blocks, allocates or releases.
    ///
    /// 实时读取。从不阻塞、分配或释放。
    #[inline]
    pub(crate) fn read_realtime(&self) -> Option<NonNull<T>> {
        match self.coordinator.try_read() {
            Some(_guard) => {
                // Quiescence point: the caller is done with whatever it read last time.
                self.pending.move_all_into(&self.release);
                NonNull::new(self.current.load(Ordering::Acquire))
            }
            None => NonNull::new(self.snapshot.load(Ordering::Acquire)),
        }
    }

    /// Synchronously release every retired value and the current one.
    /// Called once, when the owning handle is dropped.
    ///
    /// 同步释放所有已退休值以及当前值。在持有句柄被 drop 时调用一次。
    pub(crate) fn teardown(&self) {
        self.scheduler.shutdown();

        let mut control = self.control.lock();
        control.driver_active = false;

        self.snapshot.store(ptr::null_mut(), Ordering::Release);
        self.deferred.move_all_into(&self.release);
        self.pending.move_all_into(&self.release);
        let released = self.release_ready(&mut control);

        let current = self.current.swap(ptr::null_mut(), Ordering::AcqRel);
        if let Some(current) = NonNull::new(current) {
            // SAFETY: the current handle is owned by the cell and was never queued.
            let retired = unsafe { Retired::from_handle(current, self.kind()) };
            control.policy.release(retired);
        }
        log::debug!("managed value torn down, released {released} retired values");
    }
}

impl<T: Send + Sync + 'static> SnapshotCommit for CellCore<T> {
    fn commit_snapshot(&self) {
        self.in_batch.store(false, Ordering::Relaxed);
        self.snapshot
            .store(self.current.load(Ordering::Acquire), Ordering::Release);
        // The snapshot no longer names anything retired during the batch.
        self.deferred.move_all_into(&self.pending);
    }
}
