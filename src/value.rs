use crate::batch::BatchCoordinator;
use crate::builder::ManagedValueBuilder;
use crate::policy::ValueKind;
use crate::reader::RealtimeReader;
use crate::state::CellCore;
use crate::sync::{Arc, Ordering};
use std::boxed::Box;
use std::ptr;

/// A swappable value shared with real-time readers.
///
/// `ManagedValue<T>` is the writer's handle: it is `!Clone`, and every mutation
/// takes `&mut self`, which makes the single-writer rule a compile-time property.
/// Real-time threads read through a [`RealtimeReader`] obtained from [`reader`].
///
/// Replaced values are never destroyed by the write that replaced them. They are
/// queued, become eligible once a reader has come back for a fresh value, and
/// are then handed to the release policy by the reclamation driver.
///
/// A cell holds either uniquely owned values (`set_raw`) or shared objects
/// (`set_managed`). The first write decides; mixing both panics.
///
/// **Typical Usage**:
/// ```
/// use rt_managed_value::{BatchCoordinator, ManagedValue};
///
/// let coordinator = BatchCoordinator::new();
/// let mut value = ManagedValue::new(&coordinator);
/// let reader = value.reader();
///
/// value.set_raw(Box::new(440.0f32));
///
/// // Real-time thread, once per cycle:
/// let frequency = unsafe { reader.get_ref() }.copied();
/// assert_eq!(frequency, Some(440.0));
/// ```
///
/// 与实时读者共享的可替换值。
///
/// `ManagedValue<T>` 是写入者的句柄：它是 `!Clone` 的，每次修改都需要 `&mut self`，
/// 这使得单写入者规则成为编译期属性。实时线程通过从 [`reader`] 获得的
/// [`RealtimeReader`] 进行读取。
///
/// 被替换的值永远不会被替换它的那次写入销毁。它们会被排队，在读者回来获取新值后
/// 变为可回收，然后由回收驱动器交给释放策略。
///
/// 一个单元要么持有独占所有的值（`set_raw`），要么持有共享对象（`set_managed`）。
/// 第一次写入决定类型；混用两者会 panic。
///
/// [`reader`]: ManagedValue::reader
pub struct ManagedValue<T: Send + Sync + 'static> {
    pub(crate) core: Arc<CellCore<T>>,
}

impl<T: Send + Sync + 'static> ManagedValue<T> {
    /// Create an empty cell bound to `coordinator`, with the default driver
    /// and release policy.
    /// 创建一个绑定到 `coordinator` 的空单元，使用默认驱动器和释放策略。
    #[inline]
    pub fn new(coordinator: &BatchCoordinator) -> Self {
        Self::builder(coordinator).build()
    }

    /// Create a builder for configuring the cell.
    ///
    /// # Example
    /// ```
    /// use rt_managed_value::{BatchCoordinator, ManagedValue, ManualScheduler};
    /// use std::time::Duration;
    ///
    /// let coordinator = BatchCoordinator::new();
    /// let value = ManagedValue::<Vec<f32>>::builder(&coordinator)
    ///     .interval(Duration::from_millis(250))
    ///     .scheduler(ManualScheduler::new())
    ///     .release_with(|retired| drop(retired))
    ///     .build();
    /// ```
    ///
    /// 创建一个用于配置单元的构建器。
    #[inline]
    pub fn builder(coordinator: &BatchCoordinator) -> ManagedValueBuilder<T> {
        ManagedValueBuilder::new(coordinator)
    }

    /// Replace the value with a uniquely owned one.
    ///
    /// Visible to the next real-time read, or when the enclosing batch closes.
    ///
    /// # Panics
    /// If the cell already holds values written with `set_managed`.
    ///
    /// 用独占所有的值替换当前值。
    /// 对下一次实时读取可见，或在外层批次关闭时可见。
    pub fn set_raw(&mut self, value: Box<T>) {
        self.core.claim_kind(ValueKind::Raw);
        self.core.replace(Box::into_raw(value));
    }

    /// Replace the value with a shared object. The cell keeps one reference until
    /// the value is released.
    ///
    /// # Panics
    /// If the cell already holds values written with `set_raw`.
    ///
    /// 用共享对象替换当前值。单元持有一个引用，直到该值被释放。
    pub fn set_managed(&mut self, value: Arc<T>) {
        self.core.claim_kind(ValueKind::Managed);
        self.core.replace(Arc::into_raw(value) as *mut T);
    }

    /// Retire the current value and leave the cell empty. The kind is kept.
    /// 退休当前值并使单元为空。类型保持不变。
    pub fn clear(&mut self) {
        if self.core.current.load(Ordering::Relaxed).is_null() {
            return;
        }
        self.core.replace(ptr::null_mut());
    }

    /// The most recently written value, for the writer thread.
    /// 最近写入的值，供写入者线程使用。
    #[inline]
    pub fn get(&self) -> Option<&T> {
        let ptr = self.core.current.load(Ordering::Acquire);
        // SAFETY: only `&mut self` methods or teardown retire the current value.
        unsafe { ptr.as_ref() }
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.core.kind()
    }

    /// A reader handle for real-time threads. Create and drop readers off the
    /// real-time thread.
    /// 供实时线程使用的读者句柄。请在实时线程之外创建和 drop 读者。
    #[inline]
    pub fn reader(&self) -> RealtimeReader<T> {
        RealtimeReader::new(self.core.clone())
    }

    /// Number of retired values not destroyed yet.
    /// 尚未销毁的已退休值的数量。
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.core.pending_count.load(Ordering::Acquire)
    }

    /// Whether the reclamation driver is scheduled for this cell.
    /// 此单元的回收驱动器是否已被调度。
    pub fn is_driver_active(&self) -> bool {
        self.core.control.lock().driver_active
    }

    /// The coordinator this cell batches with.
    /// 此单元进行批处理所使用的协调器。
    #[inline]
    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.core.coordinator
    }
}

impl<T: Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for ManagedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedValue")
            .field("kind", &self.kind())
            .field("value", &self.get())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Drop for ManagedValue<T> {
    /// Release every retired value and the current one before returning.
    ///
    /// Readers must have stopped using the cell: values they obtained are freed here.
    ///
    /// 在返回之前释放所有已退休值以及当前值。
    /// 读者必须已停止使用该单元：它们获得的值会在此处被释放。
    fn drop(&mut self) {
        self.core.teardown();
    }
}
