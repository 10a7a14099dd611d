use std::boxed::Box;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::vec::Vec;

/// Callback invoked on every driver tick.
/// 每次驱动器节拍时调用的回调。
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Periodic callback scheduler that drives reclamation for one cell.
///
/// A cell calls `start` when it retires a value while no driver is active, and
/// calls `stop` from inside its own tick once nothing is left to release.
/// `shutdown` is called during cell teardown and must not return while a tick
/// can still run.
///
/// Implementations run ticks off the real-time thread; ticks may block, free
/// memory and run arbitrary release code.
///
/// 为一个单元驱动回收的周期性回调调度器。
///
/// 当单元在没有活跃驱动器时退休一个值，会调用 `start`；当没有剩余需要释放的值时，
/// 会在自己的节拍内部调用 `stop`。`shutdown` 在单元析构期间调用，
/// 在仍可能有节拍运行时不得返回。
///
/// 实现在实时线程之外运行节拍；节拍可以阻塞、释放内存并运行任意释放代码。
pub trait Scheduler: Send + Sync {
    /// Begin invoking `tick` every `interval`. A no-op if already running.
    /// 开始每隔 `interval` 调用一次 `tick`。如果已在运行，则不做任何事。
    fn start(&self, interval: Duration, tick: TickFn) -> io::Result<()>;

    /// Stop invoking the tick. Idempotent, and callable from within the tick.
    /// 停止调用节拍。幂等，且可以在节拍内部调用。
    fn stop(&self);

    /// Stop and wait until no tick is running.
    /// 停止并等待直到没有节拍在运行。
    fn shutdown(&self) {
        self.stop();
    }
}

struct Slot {
    interval: Duration,
    due: Instant,
    tick: Option<TickFn>,
    running: bool,
    /// The tick is out of the slot and running on the worker.
    /// 节拍已从槽中取出，正在工作线程上运行。
    ticking: bool,
}

impl Slot {
    fn idle() -> Self {
        Slot {
            interval: Duration::ZERO,
            due: Instant::now(),
            tick: None,
            running: false,
            ticking: false,
        }
    }
}

struct WorkerState {
    slots: Vec<Option<Slot>>,
    worker: Option<JoinHandle<()>>,
    /// Live `ReclaimThread` and `ThreadScheduler` handles.
    /// 存活的 `ReclaimThread` 和 `ThreadScheduler` 句柄数。
    owners: usize,
    exit: bool,
}

impl WorkerState {
    fn on_worker(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.thread().id() == thread::current().id())
    }
}

struct Shared {
    state: antidote::Mutex<WorkerState>,
    /// Wakes the worker when a driver starts or the thread must exit.
    /// 当驱动器启动或线程需要退出时唤醒工作线程。
    wake: antidote::Condvar,
    /// Signalled after every tick.
    /// 每次节拍之后发出信号。
    ticked: antidote::Condvar,
}

impl Shared {
    fn release_owner(&self, mut state: antidote::MutexGuard<'_, WorkerState>) {
        state.owners -= 1;
        if state.owners > 0 {
            return;
        }
        state.exit = true;
        let worker = state.worker.take();
        drop(state);
        self.wake.notify_all();

        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                log::error!("reclaim thread panicked");
            }
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    loop {
        if state.exit {
            return;
        }

        let now = Instant::now();
        let mut ready = None;
        let mut next_due: Option<Instant> = None;
        for (id, slot) in state.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if !slot.running || slot.tick.is_none() {
                continue;
            }
            if slot.due <= now {
                ready = Some(id);
                break;
            }
            next_due = Some(next_due.map_or(slot.due, |due| due.min(slot.due)));
        }

        state = match (ready, next_due) {
            (Some(id), _) => run_slot(&shared, state, id),
            (None, Some(due)) => {
                shared
                    .wake
                    .wait_timeout(state, due.saturating_duration_since(now))
                    .0
            }
            (None, None) => shared.wake.wait(state),
        };
    }
}

/// Run one slot's tick with the state unlocked, so the tick may call `stop`.
/// 在状态解锁的情况下运行一个槽的节拍，因此节拍可以调用 `stop`。
fn run_slot<'a>(
    shared: &'a Shared,
    mut state: antidote::MutexGuard<'a, WorkerState>,
    id: usize,
) -> antidote::MutexGuard<'a, WorkerState> {
    let Some(slot) = state.slots[id].as_mut() else {
        return state;
    };
    let Some(mut tick) = slot.tick.take() else {
        return state;
    };
    slot.ticking = true;
    drop(state);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| tick()));

    let mut state = shared.state.lock();
    if let Some(slot) = state.slots[id].as_mut() {
        slot.ticking = false;
        match outcome {
            Ok(()) if slot.running && slot.tick.is_none() => {
                slot.due = Instant::now() + slot.interval;
                slot.tick = Some(tick);
            }
            Ok(()) => {}
            Err(_) => {
                log::error!("reclaim tick panicked, driver stopped");
                slot.running = false;
                slot.tick = None;
            }
        }
    }
    shared.ticked.notify_all();
    state
}

/// One long-lived background thread that runs the drivers of many cells.
///
/// The thread is spawned on the first `start` of any of its schedulers and then
/// sleeps while no driver is running. It exits once this handle, its clones and
/// every scheduler created from it are dropped.
///
/// ```
/// use rt_managed_value::{BatchCoordinator, ManagedValue, ReclaimThread};
///
/// let coordinator = BatchCoordinator::new();
/// let reclaim = ReclaimThread::new();
/// let mut a = ManagedValue::<u32>::builder(&coordinator)
///     .scheduler(reclaim.scheduler())
///     .build();
/// let mut b = ManagedValue::<u32>::builder(&coordinator)
///     .scheduler(reclaim.scheduler())
///     .build();
/// a.set_raw(Box::new(1));
/// b.set_raw(Box::new(1));
/// ```
///
/// 一个长期存在的后台线程，运行多个单元的驱动器。
///
/// 该线程在其任一调度器第一次 `start` 时生成，之后在没有驱动器运行时休眠。
/// 当此句柄、它的克隆以及由它创建的所有调度器都被 drop 后，线程退出。
pub struct ReclaimThread {
    shared: Arc<Shared>,
}

impl ReclaimThread {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: antidote::Mutex::new(WorkerState {
                    slots: Vec::new(),
                    worker: None,
                    owners: 1,
                    exit: false,
                }),
                wake: antidote::Condvar::new(),
                ticked: antidote::Condvar::new(),
            }),
        }
    }

    /// Create a driver for one cell, running on this thread.
    /// 为一个单元创建在此线程上运行的驱动器。
    pub fn scheduler(&self) -> ThreadScheduler {
        let mut state = self.shared.state.lock();
        let id = match state.slots.iter().position(Option::is_none) {
            Some(id) => {
                state.slots[id] = Some(Slot::idle());
                id
            }
            None => {
                state.slots.push(Some(Slot::idle()));
                state.slots.len() - 1
            }
        };
        state.owners += 1;
        ThreadScheduler {
            shared: self.shared.clone(),
            id,
        }
    }

    /// Whether the background thread has been spawned and not yet exited.
    /// 后台线程是否已生成且尚未退出。
    pub fn is_spawned(&self) -> bool {
        self.shared.state.lock().worker.is_some()
    }
}

impl Clone for ReclaimThread {
    fn clone(&self) -> Self {
        self.shared.state.lock().owners += 1;
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Default for ReclaimThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReclaimThread {
    fn drop(&mut self) {
        self.shared.release_owner(self.shared.state.lock());
    }
}

/// Default scheduler: one cell's driver on a [`ReclaimThread`].
///
/// `ThreadScheduler::new()` gives the cell a reclaim thread of its own; use
/// [`ReclaimThread::scheduler`] to share one thread between cells. `stop` never
/// waits, so it is safe to call from a tick while the cell's control lock is
/// held. `shutdown` waits for a running tick unless called from the reclaim
/// thread itself.
///
/// 默认调度器：在 [`ReclaimThread`] 上运行的单个单元的驱动器。
///
/// `ThreadScheduler::new()` 为单元提供独占的回收线程；使用 [`ReclaimThread::scheduler`]
/// 可以在多个单元之间共享一个线程。`stop` 从不等待，因此可以在持有单元控制锁的节拍中安全调用。
/// 除非在回收线程自身上调用，`shutdown` 会等待正在运行的节拍结束。
pub struct ThreadScheduler {
    shared: Arc<Shared>,
    id: usize,
}

impl ThreadScheduler {
    #[inline]
    pub fn new() -> Self {
        ReclaimThread::new().scheduler()
    }

    /// Whether this driver is currently scheduled.
    /// 此驱动器当前是否被调度。
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().slots[self.id]
            .as_ref()
            .is_some_and(|slot| slot.running)
    }
}

impl Scheduler for ThreadScheduler {
    fn start(&self, interval: Duration, tick: TickFn) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        if state.slots[self.id].as_ref().is_some_and(|slot| slot.running) {
            return Ok(());
        }

        if state.worker.is_none() {
            let shared = self.shared.clone();
            let handle = thread::Builder::new()
                .name("reclaim-driver".to_string())
                .spawn(move || run_worker(shared))?;
            state.worker = Some(handle);
        }

        if let Some(slot) = state.slots[self.id].as_mut() {
            slot.interval = interval;
            slot.due = Instant::now() + interval;
            slot.tick = Some(tick);
            slot.running = true;
        }
        drop(state);
        self.shared.wake.notify_all();

        log::debug!("reclaim driver started with interval {interval:?}");
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.shared.state.lock();
        let Some(slot) = state.slots[self.id].as_mut() else {
            return;
        };
        if slot.running {
            slot.running = false;
            slot.tick = None;
            log::debug!("reclaim driver stopped");
        }
    }

    fn shutdown(&self) {
        self.stop();
        let mut state = self.shared.state.lock();
        if state.on_worker() {
            return;
        }
        while state.slots[self.id].as_ref().is_some_and(|slot| slot.ticking) {
            state = self.shared.ticked.wait(state);
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
        let mut state = self.shared.state.lock();
        state.slots[self.id] = None;
        self.shared.release_owner(state);
    }
}

struct ManualState {
    interval: Duration,
    tick: Option<TickFn>,
    running: bool,
    ticking: bool,
}

/// Scheduler whose ticks are pumped by the host on its control thread.
///
/// Use it when the host already owns a periodic timer (a UI run loop, a control
/// loop), and in tests for deterministic reclamation. Clones share state, so
/// keep one clone and hand another to the cell.
///
/// 由宿主在其控制线程上手动驱动节拍的调度器。
///
/// 当宿主已经拥有周期性定时器（UI 运行循环、控制循环）时使用，
/// 也可在测试中用于确定性的回收。克隆共享状态，因此保留一个克隆并把另一个交给单元。
#[derive(Clone)]
pub struct ManualScheduler {
    state: crate::sync::Arc<crate::sync::Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            state: crate::sync::Arc::new(crate::sync::Mutex::new(ManualState {
                interval: Duration::ZERO,
                tick: None,
                running: false,
                ticking: false,
            })),
        }
    }

    /// Run the tick once if the driver is running. Returns whether it ran.
    /// 如果驱动器正在运行，则运行一次节拍。返回是否运行了。
    pub fn tick(&self) -> bool {
        let mut tick = {
            let mut state = self.state.lock();
            if !state.running {
                return false;
            }
            match state.tick.take() {
                Some(tick) => {
                    state.ticking = true;
                    tick
                }
                None => return false,
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| tick()));

        let mut state = self.state.lock();
        state.ticking = false;
        if let Err(payload) = outcome {
            state.running = false;
            drop(state);
            panic::resume_unwind(payload);
        }
        if state.running && state.tick.is_none() {
            state.tick = Some(tick);
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Interval requested by the last `start`.
    /// 最近一次 `start` 请求的间隔。
    pub fn interval(&self) -> Duration {
        self.state.lock().interval
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn start(&self, interval: Duration, tick: TickFn) -> io::Result<()> {
        let mut state = self.state.lock();
        if !state.running {
            state.running = true;
            state.interval = interval;
            state.tick = Some(tick);
        }
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.tick = None;
    }

    /// Stop, then wait for a tick pumped on another thread to return.
    /// Must not be called from inside a tick.
    ///
    /// 停止，然后等待在其他线程上驱动的节拍返回。不得在节拍内部调用。
    fn shutdown(&self) {
        self.stop();
        while self.state.lock().ticking {
            crate::sync::yield_now();
        }
    }
}
