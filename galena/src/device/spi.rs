//! Raw byte-transaction driver for the memory-mapped SPI controller.
//!
//! The controller exposes 32-bit registers at fixed offsets inside its
//! block; everything here goes through whole-word volatile accesses. Waits
//! are status-register spins with no timeout.

use proc_bitfield::bitfield;

use crate::poll::{self, Budget};

// Register byte offsets. The low offsets hold interrupt plumbing this boot
// path never touches.
const REG_CR: usize = 0x60;
const REG_SR: usize = 0x64;
const REG_TX: usize = 0x68;
const REG_RX: usize = 0x6c;
const REG_SSR: usize = 0x70;
const REG_TX_OCCUPANCY: usize = 0x74;
const REG_RX_OCCUPANCY: usize = 0x78;

// Serial flash command set for the single-wire read path.
pub const FLASH_CMD_RESET_ENABLE: u8 = 0x66;
pub const FLASH_CMD_MEMORY_RESET: u8 = 0x99;
const FLASH_CMD_READ: u8 = 0x03;

/// `tx` holds off while at least this many bytes are queued.
const TX_FIFO_NEARLY_FULL: u8 = 0x0f;

bitfield! {
    /// Control register overlay.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct SpiControl(pub u32): Debug, FromStorage, IntoStorage {
        pub lsb_first: bool @ 22,
        pub transaction_inhibit: bool @ 23,
        pub manual_slave_select: bool @ 24,
        pub rx_fifo_reset: bool @ 25,
        pub tx_fifo_reset: bool @ 26,
        pub cpha: bool @ 27,
        pub cpol: bool @ 28,
        pub master: bool @ 29,
        pub enable: bool @ 30,
        pub loopback: bool @ 31,
    }
}
const _: () = const { assert!(size_of::<SpiControl>() == 4) };

bitfield! {
    /// Status register overlay.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct SpiStatus(pub u32): Debug, FromStorage, IntoStorage {
        pub command_err: bool @ 21,
        pub loopback_err: bool @ 22,
        pub lsb_err: bool @ 23,
        pub slave_mode_err: bool @ 24,
        pub cpol_cpha_err: bool @ 25,
        pub slave_mode_select: bool @ 26,
        pub mode_fault: bool @ 27,
        pub tx_full: bool @ 28,
        pub tx_empty: bool @ 29,
        pub rx_full: bool @ 30,
        pub rx_empty: bool @ 31,
    }
}
const _: () = const { assert!(size_of::<SpiStatus>() == 4) };

bitfield! {
    /// Receive data register overlay. On this controller revision the
    /// received byte reads back in the top byte of the word.
    #[derive(Clone, Copy)]
    pub struct RxData(pub u32): Debug, FromStorage, IntoStorage {
        pub data: u8 @ 24..=31,
    }
}
const _: () = const { assert!(size_of::<RxData>() == 4) };

bitfield! {
    /// Transmit occupancy register overlay.
    #[derive(Clone, Copy)]
    pub struct TxOccupancy(pub u32): Debug, FromStorage, IntoStorage {
        pub pending: u8 @ 24..=31,
    }
}
const _: () = const { assert!(size_of::<TxOccupancy>() == 4) };

/// Handle to one SPI controller's register block.
pub struct SpiCtrl {
    base: *mut u32,
}

impl SpiCtrl {
    /// # Safety
    ///
    /// `base` must be the physical base address of an SPI controller
    /// register block, and this handle must be its only user for as long
    /// as it lives.
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

    pub fn control(&self) -> SpiControl {
        SpiControl::from(self.read(REG_CR))
    }

    pub fn set_control(&self, control: SpiControl) {
        self.write(REG_CR, control.into());
    }

    pub fn status(&self) -> SpiStatus {
        SpiStatus::from(self.read(REG_SR))
    }

    /// Raw write to the slave-select register (active-low mask).
    pub fn set_slave_select(&self, raw: u32) {
        self.write(REG_SSR, raw);
    }

    /// Wait until the transmit FIFO has room, then queue `byte`.
    pub fn tx(&self, byte: u8) {
        // Budget::UNBOUNDED never exhausts.
        let _ = poll::spin_until(Budget::UNBOUNDED, || {
            TxOccupancy::from(self.read(REG_TX_OCCUPANCY)).pending() < TX_FIFO_NEARLY_FULL
        });
        self.write(REG_TX, u32::from(byte));
    }

    /// Wait until the receive FIFO has data, then take one byte.
    pub fn rx(&self) -> u8 {
        let _ = poll::spin_until(Budget::UNBOUNDED, || self.read(REG_RX_OCCUPANCY) != 0);
        RxData::from(self.read(REG_RX)).data()
    }

    /// Send a byte and take the byte clocked back in exchange.
    pub fn txrx(&self, byte: u8) -> u8 {
        self.tx(byte);
        self.rx()
    }

    /// Fill `dst` from serial flash starting at byte address `addr`.
    ///
    /// Frames the whole exchange as one chip-select transaction via the
    /// transaction-inhibit bit: read opcode, 3-byte big-endian address,
    /// then one exchanged byte per byte of `dst`. Always succeeds at this
    /// layer; there is no CRC or protocol-error detection on this path.
    pub fn copy(&self, dst: &mut [u8], addr: u32) {
        self.set_control(self.control().with_transaction_inhibit(true));

        self.txrx(FLASH_CMD_READ);
        self.txrx((addr >> 16) as u8);
        self.txrx((addr >> 8) as u8);
        self.txrx(addr as u8);

        for byte in dst.iter_mut() {
            *byte = self.txrx(0);
        }

        self.set_control(self.control().with_transaction_inhibit(false));
    }
}

/// Get the smallest clock divisor that divides `input_khz` to a quotient
/// less than or equal to `max_target_khz`.
///
/// `f_sck = f_in / (2 * (div + 1))`, so `div = ceil(f_in / (2 * f_sck)) - 1`,
/// rounded up so the target is never exceeded. The sum cannot overflow u32
/// for frequencies expressed in kHz. `max_target_khz` must be nonzero.
pub fn min_clk_divisor(input_khz: u32, max_target_khz: u32) -> u32 {
    let quotient = (input_khz + 2 * max_target_khz - 1) / (2 * max_target_khz);
    // Avoid underflow when the target already exceeds the input clock.
    quotient.saturating_sub(1)
}
