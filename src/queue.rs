use crate::sync::{AtomicPtr, Ordering};
use std::boxed::Box;
use std::ptr::{self, NonNull};

/// A retired value waiting in one of the cell's reclamation queues.
///
/// Entries are allocated by the writer in `push` and freed by whoever drains them
/// with `take_all` (the driver or teardown). Moving an entry between queues reuses
/// the same allocation, so the real-time reader never allocates or frees.
///
/// 在单元的回收队列之一中等待的已退休值。
///
/// 条目由写入者在 `push` 中分配，由使用 `take_all` 排空它们的一方（驱动器或析构）释放。
/// 在队列之间移动条目会复用同一分配，因此实时读者永远不会分配或释放内存。
struct ReleaseEntry<T> {
    value: NonNull<T>,
    /// Written only while the entry is exclusively owned, before it is published.
    /// 仅在条目被独占持有时（发布之前）写入。
    next: *mut ReleaseEntry<T>,
}

/// Intrusive lock-free queue of retired values.
///
/// Producers publish with a CAS on `head` (the chain is LIFO in memory), consumers
/// detach the whole chain with a single `swap`. Neither side ever dereferences a
/// node it does not own, so the structure is immune to ABA.
///
/// `take_all` hands entries out in retirement order.
///
/// 已退休值的侵入式无锁队列。
///
/// 生产者通过对 `head` 的 CAS 发布（链在内存中是 LIFO 的），消费者用一次 `swap`
/// 取下整条链。双方都不会解引用不属于自己的节点，因此该结构不受 ABA 影响。
///
/// `take_all` 按退休顺序交出条目。
pub(crate) struct RetireQueue<T> {
    head: AtomicPtr<ReleaseEntry<T>>,
}

impl<T> RetireQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[cfg(all(test, not(feature = "loom")))]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Allocate an entry for `value` and publish it. Writer side only.
    /// 为 `value` 分配一个条目并发布。仅限写入者。
    pub(crate) fn push(&self, value: NonNull<T>) {
        let entry = Box::into_raw(Box::new(ReleaseEntry {
            value,
            next: ptr::null_mut(),
        }));
        // SAFETY: `entry` was just allocated and is not shared yet.
        unsafe { self.push_chain(entry, entry) };
    }

    /// Publish the chain `first ..= last` in one CAS.
    ///
    /// # Safety
    /// The caller must exclusively own every entry of the chain and `last` must be
    /// reachable from `first`.
    unsafe fn push_chain(&self, first: *mut ReleaseEntry<T>, last: *mut ReleaseEntry<T>) {
        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            unsafe { (*last).next = current };
            match self
                .head
                .compare_exchange_weak(current, first, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Move every entry currently queued here onto `target` without allocating.
    ///
    /// Bounded by the number of entries moved; callable from the real-time thread.
    ///
    /// 将当前在此排队的所有条目移动到 `target`，不进行分配。
    /// 开销受移动的条目数限制；可以在实时线程上调用。
    pub(crate) fn move_all_into(&self, target: &RetireQueue<T>) {
        let first = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        if first.is_null() {
            return;
        }

        let mut last = first;
        // SAFETY: the detached chain is exclusively ours after the swap.
        unsafe {
            while !(*last).next.is_null() {
                last = (*last).next;
            }
            target.push_chain(first, last);
        }
    }

    /// Detach every queued entry, free the entries and pass each value to `f`
    /// oldest first. Returns the number of values handed out.
    ///
    /// Frees memory, so it must never run on the real-time thread.
    ///
    /// 取下所有排队的条目，释放条目本身，并按从旧到新的顺序将每个值交给 `f`。
    /// 返回交出的值的数量。
    ///
    /// 会释放内存，因此绝不能在实时线程上运行。
    pub(crate) fn take_all(&self, mut f: impl FnMut(NonNull<T>)) -> usize {
        let mut node = self.head.swap(ptr::null_mut(), Ordering::Acquire);

        // Reverse the LIFO chain in place so values come out in retirement order.
        let mut ordered: *mut ReleaseEntry<T> = ptr::null_mut();
        while !node.is_null() {
            // SAFETY: the detached chain is exclusively ours after the swap.
            unsafe {
                let next = (*node).next;
                (*node).next = ordered;
                ordered = node;
                node = next;
            }
        }

        let mut count = 0;
        while !ordered.is_null() {
            // SAFETY: every entry was created by `Box::into_raw` in `push`.
            let entry = unsafe { Box::from_raw(ordered) };
            ordered = entry.next;
            count += 1;
            f(entry.value);
        }
        count
    }
}

impl<T> Drop for RetireQueue<T> {
    fn drop(&mut self) {
        // Values are released by the cell before teardown; only stray entries remain.
        let leaked = self.take_all(|_| {});
        debug_assert_eq!(leaked, 0, "BUG: retire queue dropped with {leaked} unreleased values");
    }
}
