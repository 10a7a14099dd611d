use crate::batch::BatchCoordinator;
use crate::driver::{Scheduler, ThreadScheduler};
use crate::policy::{ReleasePolicy, Retired};
use crate::state::{CellCore, DEFAULT_RECLAIM_INTERVAL};
use crate::sync::Arc;
use crate::value::ManagedValue;
use std::boxed::Box;
use std::time::Duration;

/// Builder for configuring a `ManagedValue`.
///
/// - `interval`: period of the reclamation driver (default 100 ms)
/// - `release_with`: custom release policy (default drops the `Box`/`Arc`)
/// - `scheduler`: driver collaborator (default [`ThreadScheduler`])
///
/// 用于配置 `ManagedValue` 的构建器。
pub struct ManagedValueBuilder<T: Send + Sync + 'static> {
    coordinator: BatchCoordinator,
    interval: Duration,
    policy: ReleasePolicy<T>,
    scheduler: Option<Box<dyn Scheduler>>,
}

impl<T: Send + Sync + 'static> ManagedValueBuilder<T> {
    #[inline]
    pub fn new(coordinator: &BatchCoordinator) -> Self {
        Self {
            coordinator: coordinator.clone(),
            interval: DEFAULT_RECLAIM_INTERVAL,
            policy: ReleasePolicy::Default,
            scheduler: None,
        }
    }

    /// Set how often the driver runs while values await destruction.
    /// 设置在有值等待销毁时驱动器运行的频率。
    #[inline]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Hand every retired value to `release` instead of dropping it.
    ///
    /// Called on the driver's thread, exactly once per value.
    ///
    /// 将每个已退休值交给 `release`，而不是直接 drop。
    /// 在驱动器线程上调用，每个值恰好一次。
    #[inline]
    pub fn release_with<F>(mut self, release: F) -> Self
    where
        F: FnMut(Retired<T>) + Send + 'static,
    {
        self.policy = ReleasePolicy::Custom(Box::new(release));
        self
    }

    #[inline]
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn build(self) -> ManagedValue<T> {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Box::new(ThreadScheduler::new()));
        ManagedValue {
            core: Arc::new(CellCore::new(
                self.coordinator,
                scheduler,
                self.interval,
                self.policy,
            )),
        }
    }
}
