//! Raw (non-memory-mapped) serial flash as a block medium.

use core::convert::Infallible;

use thiserror::Error;

use crate::device::block::{BLOCK_SIZE, BlockDevice};
use crate::device::spi::{FLASH_CMD_MEMORY_RESET, FLASH_CMD_RESET_ENABLE, SpiCtrl};

/// Bytes reachable through the 3-byte read address framing.
const ADDR_SPACE: u64 = 1 << 24;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlashCopyError {
    #[error("flash read range exceeds the 24-bit address space")]
    AddressRange,
}

/// Serial boot flash behind one controller, read over the single-wire path.
pub struct SpiFlash<'s> {
    spi: &'s SpiCtrl,
}

impl<'s> SpiFlash<'s> {
    pub fn new(spi: &'s SpiCtrl) -> Self {
        Self { spi }
    }
}

impl BlockDevice for SpiFlash<'_> {
    const NAME: &'static str = "SPI flash";
    type InitError = Infallible;
    type CopyError = FlashCopyError;

    fn init(&mut self) -> Result<(), Infallible> {
        self.spi.txrx(FLASH_CMD_RESET_ENABLE);
        self.spi.txrx(FLASH_CMD_MEMORY_RESET);
        Ok(())
    }

    fn copy(&mut self, dst: &mut [u8], lba: u64, block_count: u64) -> Result<(), FlashCopyError> {
        debug_assert_eq!(dst.len(), block_count as usize * BLOCK_SIZE);
        if lba >= ADDR_SPACE / BLOCK_SIZE as u64 {
            return Err(FlashCopyError::AddressRange);
        }
        let addr = lba * BLOCK_SIZE as u64;
        if addr + dst.len() as u64 > ADDR_SPACE {
            return Err(FlashCopyError::AddressRange);
        }
        self.spi.copy(dst, addr as u32);
        Ok(())
    }
}
