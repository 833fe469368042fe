//! GPIO access for the fault indicator.

use core::sync::atomic::{AtomicU32, Ordering};

// Register byte offsets.
const REG_OUTPUT_EN: usize = 0x08;
const REG_OUTPUT_VAL: usize = 0x0c;
const REG_OUTPUT_XOR: usize = 0x40;

/// Handle to the GPIO register block.
pub struct GpioCtrl {
    base: *mut u32,
}

impl GpioCtrl {
    /// # Safety
    ///
    /// `base` must be the physical base address of the GPIO register block.
    pub unsafe fn new(base: usize) -> Self {
        Self {
            base: core::ptr::with_exposed_provenance_mut(base),
        }
    }

    fn reg(&self, offset: usize) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(self.base.byte_add(offset)) }
    }

    /// Drive the pins in `mask` as a fault indicator: set their output
    /// value, enable them, and invert them, toggling the indicator
    /// regardless of its prior state. Atomic read-modify-write so that
    /// harts failing concurrently stay race-free.
    pub fn raise_fault(&self, mask: u32) {
        self.reg(REG_OUTPUT_VAL).fetch_or(mask, Ordering::SeqCst);
        self.reg(REG_OUTPUT_EN).fetch_or(mask, Ordering::SeqCst);
        self.reg(REG_OUTPUT_XOR).fetch_or(mask, Ordering::SeqCst);
    }
}
