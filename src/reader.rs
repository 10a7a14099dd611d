use crate::state::CellCore;
use crate::sync::Arc;
use std::ptr::NonNull;

/// Real-time read access to a [`ManagedValue`].
///
/// `get` never blocks, allocates or frees, and never runs release code, so it
/// can be called from an audio render callback or any other latency-critical
/// thread.
///
/// **Validity**: a value returned by `get` stays valid until the next `get` on
/// any reader of the same cell. Each call is the proof that the caller is done
/// with what it read last time; values retired before it become eligible for
/// destruction.
///
/// The handle is `Clone + Send + Sync`. Clone and drop it off the real-time
/// thread: dropping the last handle to a torn-down cell frees its bookkeeping.
///
/// 对 [`ManagedValue`] 的实时读取访问。
///
/// `get` 从不阻塞、分配或释放内存，也从不运行释放代码，因此可以在音频渲染回调
/// 或任何其他对延迟敏感的线程中调用。
///
/// **有效性**：`get` 返回的值在同一单元任意读者的下一次 `get` 之前保持有效。
/// 每次调用都证明调用者已用完上次读取的值；在此之前退休的值变为可销毁。
///
/// 该句柄是 `Clone + Send + Sync` 的。请在实时线程之外克隆和 drop 它：
/// drop 已析构单元的最后一个句柄会释放其簿记数据。
///
/// [`ManagedValue`]: crate::ManagedValue
pub struct RealtimeReader<T: Send + Sync + 'static> {
    core: Arc<CellCore<T>>,
}

impl<T: Send + Sync + 'static> RealtimeReader<T> {
    pub(crate) fn new(core: Arc<CellCore<T>>) -> Self {
        RealtimeReader { core }
    }

    /// Fetch the value for this processing cycle.
    ///
    /// Returns the live value when no batch is in flight. While the writer holds
    /// an atomic batch open, returns the value the cell had before the batch, so
    /// several cells read in one cycle are never a mix of old and new.
    /// `None` if nothing has been written.
    ///
    /// 获取本处理周期的值。
    ///
    /// 没有批次进行时返回实时值。当写入者保持原子批次打开时，返回单元在批次之前的值，
    /// 因此在一个周期中读取的多个单元永远不会是新旧值的混合。
    /// 如果尚未写入任何值，则返回 `None`。
    #[inline]
    pub fn get(&self) -> Option<NonNull<T>> {
        self.core.read_realtime()
    }

    /// Like [`get`], borrowing the value.
    ///
    /// # Safety
    /// The reference must not be used after the next `get`/`get_ref` on a reader
    /// of the same cell, nor after the owning `ManagedValue` is dropped.
    ///
    /// [`get`]: RealtimeReader::get
    #[inline]
    pub unsafe fn get_ref(&self) -> Option<&T> {
        self.get().map(|ptr| unsafe { ptr.as_ref() })
    }
}

impl<T: Send + Sync + 'static> Clone for RealtimeReader<T> {
    fn clone(&self) -> Self {
        RealtimeReader {
            core: self.core.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for RealtimeReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RealtimeReader")
            .field(&Arc::as_ptr(&self.core))
            .finish()
    }
}

/// Free-function form of [`RealtimeReader::get`], for render callbacks that
/// receive the reader through a plain reference.
///
/// [`RealtimeReader::get`] 的自由函数形式，用于通过普通引用接收读者的渲染回调。
#[inline]
pub fn realtime_value<T: Send + Sync + 'static>(reader: &RealtimeReader<T>) -> Option<NonNull<T>> {
    reader.get()
}
