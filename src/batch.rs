use crate::sync::{Arc, AtomicUsize, Mutex, MutexGuard, Ordering, Weak};
use std::vec::Vec;

/// A cell whose reader snapshot is finalized when the enclosing batch closes.
/// 在外层批次关闭时最终确定读者快照的单元。
pub(crate) trait SnapshotCommit: Send + Sync {
    fn commit_snapshot(&self);
}

struct CoordinatorInner {
    /// Held by the writer for the whole outermost batch. Readers only `try_lock` it.
    /// 写入者在整个最外层批次期间持有。读者只对其 `try_lock`。
    batch_lock: Mutex<()>,
    /// Batch nesting depth. Written by the writer only.
    /// 批次嵌套深度。仅由写入者写入。
    nesting: AtomicUsize,
    /// Cells written during the open batch. Membership only.
    /// 在打开的批次中被写入的单元。仅记录成员关系。
    touched: Mutex<Vec<Weak<dyn SnapshotCommit>>>,
}

/// Groups updates to many cells so real-time readers see all of them or none.
///
/// A coordinator is handed to every cell at construction; cells sharing one
/// coordinator can be updated together with [`run_atomic_batch`]. It is `Clone`
/// and cheap to share between the writer and the cells.
///
/// While a batch is open the writer holds the coordinator's lock. A reader that
/// cannot take the lock without blocking falls back to the snapshot each cell
/// kept from before the batch, so it sees either every old value or, once the
/// batch has returned, every new one.
///
/// ```
/// use rt_managed_value::{BatchCoordinator, ManagedValue};
///
/// let coordinator = BatchCoordinator::new();
/// let mut gain = ManagedValue::<f32>::new(&coordinator);
/// let mut pan = ManagedValue::<f32>::new(&coordinator);
///
/// coordinator.run_atomic_batch(|| {
///     gain.set_raw(Box::new(0.5));
///     pan.set_raw(Box::new(-0.25));
/// });
/// assert_eq!(gain.get(), Some(&0.5));
/// ```
///
/// 对多个单元的更新进行分组，使实时读者要么看到全部更新，要么一个也看不到。
///
/// 协调器在构造时交给每个单元；共享同一协调器的单元可以通过 [`run_atomic_batch`]
/// 一起更新。它是 `Clone` 的，可以在写入者和单元之间廉价共享。
///
/// 批次打开期间写入者持有协调器的锁。无法非阻塞地获取锁的读者会回退到每个单元
/// 在批次之前保留的快照，因此它要么看到所有旧值，要么（在批次返回后）看到所有新值。
///
/// [`run_atomic_batch`]: BatchCoordinator::run_atomic_batch
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl BatchCoordinator {
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                batch_lock: Mutex::new(()),
                nesting: AtomicUsize::new(0),
                touched: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Run `body` as one atomic batch. Writer thread only.
    ///
    /// Re-entrant: nested calls join the outermost batch, and readers observe the
    /// result only after the outermost call returns. The lock and the nesting depth
    /// are restored even if `body` panics.
    ///
    /// 将 `body` 作为一个原子批次运行。仅限写入者线程。
    ///
    /// 可重入：嵌套调用会并入最外层批次，读者只有在最外层调用返回后才能观察到结果。
    /// 即使 `body` panic，锁和嵌套深度也会被恢复。
    pub fn run_atomic_batch<R>(&self, body: impl FnOnce() -> R) -> R {
        let _scope = BatchScope::enter(&self.inner);
        body()
    }

    /// Whether the writer is currently inside `run_atomic_batch`.
    /// 写入者当前是否处于 `run_atomic_batch` 内部。
    #[inline]
    pub fn is_batch_open(&self) -> bool {
        self.inner.nesting.load(Ordering::Relaxed) > 0
    }

    /// Reader side: take the batch lock only if nobody holds it.
    /// 读者端：仅当无人持有时获取批次锁。
    #[inline]
    pub(crate) fn try_read(&self) -> Option<MutexGuard<'_, ()>> {
        self.inner.batch_lock.try_lock()
    }

    pub(crate) fn register(&self, cell: Weak<dyn SnapshotCommit>) {
        self.inner.touched.lock().push(cell);
    }

    #[cfg(all(test, not(feature = "loom")))]
    pub(crate) fn touched_count(&self) -> usize {
        self.inner.touched.lock().len()
    }
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("nesting", &self.inner.nesting.load(Ordering::Relaxed))
            .finish()
    }
}

/// One level of `run_atomic_batch`. Dropping it closes the level, also on unwind.
struct BatchScope<'a> {
    inner: &'a CoordinatorInner,
    guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> BatchScope<'a> {
    fn enter(inner: &'a CoordinatorInner) -> Self {
        let guard = if inner.nesting.load(Ordering::Relaxed) == 0 {
            Some(inner.batch_lock.lock())
        } else {
            None
        };
        inner.nesting.fetch_add(1, Ordering::Relaxed);
        BatchScope { inner, guard }
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        let previous = self.inner.nesting.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "BUG: closing a batch with nesting = 0");
        if previous > 1 {
            return;
        }

        // Readers take the live path from here on; snapshots only serve the next batch.
        drop(self.guard.take());

        let touched = std::mem::take(&mut *self.inner.touched.lock());
        for cell in touched {
            if let Some(cell) = cell.upgrade() {
                cell.commit_snapshot();
            }
        }
    }
}
