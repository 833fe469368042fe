//! Driver for the memory-mapped UART behind the console sink.

use proc_bitfield::bitfield;

use crate::device::console::Console;
use crate::poll::{self, Budget};

// Register byte offsets. 0x04 holds the receive FIFO, which the boot path
// never reads; 0x10/0x14/0x18 are interrupt enable/pending and the baud
// divisor, all left at their reset values.
const REG_TXFIFO: usize = 0x00;
const REG_STAT: usize = 0x08;
const REG_CTRL: usize = 0x0c;

bitfield! {
    /// Status register overlay.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct UartStatus(pub u32): Debug, FromStorage, IntoStorage {
        pub rx_empty: bool @ 0,
        pub rx_full: bool @ 1,
        pub tx_empty: bool @ 2,
        pub tx_full: bool @ 3,
        pub intr_enabled: bool @ 4,
        pub overrun_err: bool @ 5,
        pub frame_err: bool @ 6,
        pub parity_err: bool @ 7,
    }
}
const _: () = const { assert!(size_of::<UartStatus>() == 4) };

bitfield! {
    /// Control register overlay.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct UartControl(pub u32): Debug, FromStorage, IntoStorage {
        pub reset_tx: bool @ 0,
        pub reset_rx: bool @ 1,
        pub enable_intr: bool @ 4,
    }
}
const _: () = const { assert!(size_of::<UartControl>() == 4) };

/// Handle to one UART's register block.
pub struct UartCtrl {
    base: *mut u32,
}

impl UartCtrl {
    /// # Safety
    ///
    /// `base` must be the physical base address of a UART register block.
    pub unsafe fn new(base: usize) -> Self {
        Self {
            base: core::ptr::with_exposed_provenance_mut(base),
        }
    }

    fn read(&self, offset: usize) -> u32 {
        unsafe { self.base.byte_add(offset).read_volatile() }
    }

    fn write(&self, offset: usize, value: u32) {
        unsafe { self.base.byte_add(offset).write_volatile(value) }
    }

    pub fn status(&self) -> UartStatus {
        UartStatus::from(self.read(REG_STAT))
    }

    /// Reset the transmitter, dropping anything still queued. The fail
    /// path does this before emitting a diagnostic code.
    pub fn reset_tx(&self) {
        self.write(REG_CTRL, UartControl(0).with_reset_tx(true).into());
    }
}

impl Console for UartCtrl {
    fn putc(&self, byte: u8) {
        // Budget::UNBOUNDED never exhausts.
        let _ = poll::spin_until(Budget::UNBOUNDED, || !self.status().tx_full());
        self.write(REG_TXFIFO, u32::from(byte));
    }
}
