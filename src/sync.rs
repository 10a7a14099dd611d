#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
#[cfg(not(feature = "loom"))]
pub use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU8, AtomicUsize, Ordering};

// loom's Arc has no Weak, and the cell core is referenced weakly.
pub use std::sync::{Arc, Weak};

#[cfg(not(feature = "loom"))]
pub type MutexGuard<'a, T> = antidote::MutexGuard<'a, T>;
#[cfg(feature = "loom")]
pub type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

/// Non-poisoning mutex with a non-blocking `try_lock`.
/// 不会中毒的互斥锁，带有非阻塞的 `try_lock`。
#[cfg(not(feature = "loom"))]
pub struct Mutex<T>(antidote::Mutex<T>);

#[cfg(not(feature = "loom"))]
impl<T> Mutex<T> {
    pub fn new(t: T) -> Self {
        Self(antidote::Mutex::new(t))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.0.try_lock().ok()
    }
}

#[cfg(feature = "loom")]
#[derive(Debug, Default)]
pub struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(feature = "loom")]
impl<T> Mutex<T> {
    pub fn new(t: T) -> Self {
        Self(loom::sync::Mutex::new(t))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.0.try_lock().ok()
    }
}

#[cfg(feature = "loom")]
pub use loom::thread::yield_now;
#[cfg(not(feature = "loom"))]
pub use std::thread::yield_now;
