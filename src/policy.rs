use crate::sync::Arc;
use std::boxed::Box;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

/// How values held by a cell are owned.
///
/// Decided by the first write and immutable afterwards.
///
/// 单元所持有值的所有权方式。
/// 由第一次写入决定，此后不可更改。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueKind {
    /// Nothing has been written yet.
    /// 尚未写入任何值。
    Unset = 0,
    /// Uniquely owned allocations, written with `set_raw(Box<T>)`.
    /// 独占所有的分配，通过 `set_raw(Box<T>)` 写入。
    Raw = 1,
    /// Reference-counted objects, written with `set_managed(Arc<T>)`.
    /// 引用计数对象，通过 `set_managed(Arc<T>)` 写入。
    Managed = 2,
}

impl ValueKind {
    #[inline]
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ValueKind::Raw,
            2 => ValueKind::Managed,
            _ => ValueKind::Unset,
        }
    }
}

/// A value that has left its cell and is now owned by the release policy.
///
/// 已离开其单元、现在由释放策略持有的值。
pub enum Retired<T> {
    Raw(Box<T>),
    Managed(Arc<T>),
}

impl<T> Retired<T> {
    /// Rebuild the owning value from a handle stored in a cell.
    ///
    /// # Safety
    /// `ptr` must come from `Box::into_raw` (for `Raw`) or `Arc::into_raw` (for
    /// `Managed`), and ownership of that handle must not be reclaimed twice.
    pub(crate) unsafe fn from_handle(ptr: NonNull<T>, kind: ValueKind) -> Self {
        match kind {
            ValueKind::Raw => Retired::Raw(unsafe { Box::from_raw(ptr.as_ptr()) }),
            ValueKind::Managed => Retired::Managed(unsafe { Arc::from_raw(ptr.as_ptr()) }),
            ValueKind::Unset => unreachable!("BUG: a cell holding a value has no kind"),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Retired::Raw(_) => ValueKind::Raw,
            Retired::Managed(_) => ValueKind::Managed,
        }
    }
}

impl<T> Deref for Retired<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Retired::Raw(value) => value,
            Retired::Managed(value) => value,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Retired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Retired").field(&self.kind()).field(&**self).finish()
    }
}

/// Callback that takes ownership of every retired value.
/// 接管每个已退休值所有权的回调。
pub type ReleaseFn<T> = Box<dyn FnMut(Retired<T>) + Send + 'static>;

/// What happens to a value once it is safe to destroy.
///
/// The default drops the `Box` (freeing the allocation) or the `Arc` (releasing
/// one reference). A custom callback receives the value instead and decides.
/// Always invoked on the control side, never on the real-time thread.
///
/// 值可以安全销毁时如何处理。
///
/// 默认策略 drop `Box`（释放分配）或 `Arc`（释放一个引用）。
/// 自定义回调则接收该值并自行决定。
/// 总是在控制端调用，从不在实时线程上调用。
pub enum ReleasePolicy<T> {
    Default,
    Custom(ReleaseFn<T>),
}

impl<T> ReleasePolicy<T> {
    #[inline]
    pub(crate) fn release(&mut self, retired: Retired<T>) {
        match self {
            ReleasePolicy::Default => drop(retired),
            ReleasePolicy::Custom(release) => release(retired),
        }
    }
}

impl<T> fmt::Debug for ReleasePolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleasePolicy::Default => f.write_str("ReleasePolicy::Default"),
            ReleasePolicy::Custom(_) => f.write_str("ReleasePolicy::Custom(..)"),
        }
    }
}
