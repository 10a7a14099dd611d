mod basic_tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 测试辅助: 被 drop 时计数的值
pub(crate) struct Tracked {
    pub(crate) id: usize,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    pub(crate) fn new(id: usize, drops: &Arc<AtomicUsize>) -> Self {
        Tracked {
            id,
            drops: drops.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
