//! Single-use arrival barrier for the boot harts.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

/// Every hart blocks in [`wait`](Barrier::wait) until `total` harts have
/// arrived. Boot uses it exactly once, to hold the secondary harts until
/// the lead hart has the payload fully in memory; the release pairs the
/// lead hart's writes with the waiters' reads.
pub struct Barrier {
    arrived: AtomicU32,
}

impl Barrier {
    pub const fn new() -> Self {
        Self {
            arrived: AtomicU32::new(0),
        }
    }

    pub fn wait(&self, total: u32) {
        self.arrived.fetch_add(1, Ordering::AcqRel);
        while self.arrived.load(Ordering::Acquire) < total {
            spin_loop();
        }
    }
}
