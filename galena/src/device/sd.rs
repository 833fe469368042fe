//! SD card driver, SPI mode.
//!
//! Only what the boot path needs: the bring-up command sequence and
//! multi-block reads. Every wait on the card is an unbounded spin, like
//! every other wait at this layer; the response windows fixed by the
//! protocol (R1 turnaround) are the only bounded loops.

use thiserror::Error;

use crate::device::block::{BLOCK_SIZE, BlockDevice};
use crate::device::spi::SpiCtrl;

// Command set used by the bring-up and read paths.
const CMD0_GO_IDLE_STATE: u8 = 0;
const CMD8_SEND_IF_COND: u8 = 8;
const CMD12_STOP_TRANSMISSION: u8 = 12;
const CMD16_SET_BLOCKLEN: u8 = 16;
const CMD18_READ_MULTIPLE_BLOCK: u8 = 18;
const ACMD41_SD_SEND_OP_COND: u8 = 41;
const CMD55_APP_CMD: u8 = 55;
const CMD58_READ_OCR: u8 = 58;

const R1_READY: u8 = 0x00;
const R1_IDLE: u8 = 0x01;
/// R1 arrives within this many turnaround bytes of the command frame.
const R1_TURNAROUND_BYTES: usize = 8;
/// Token preceding each data block of a read.
const DATA_START_TOKEN: u8 = 0xfe;

/// Slave-select register values framing a command (active low, slave 0).
const CS_ASSERT: u32 = 0xffff_fffe;
const CS_RELEASE: u32 = 0xffff_ffff;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SdInitError {
    #[error("CMD0 (GO_IDLE_STATE) rejected")]
    Cmd0,
    #[error("CMD8 (SEND_IF_COND) rejected")]
    Cmd8,
    #[error("ACMD41 (SD_SEND_OP_COND) rejected")]
    Acmd41,
    #[error("CMD58 (READ_OCR) rejected")]
    Cmd58,
    #[error("CMD16 (SET_BLOCKLEN) rejected")]
    Cmd16,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SdCopyError {
    #[error("CMD18 (READ_MULTIPLE_BLOCK) rejected")]
    Cmd18,
    #[error("CMD18 data block failed CRC16")]
    Cmd18Crc,
}

/// An SD card in SPI mode behind one controller.
pub struct SdCard<'s> {
    spi: &'s SpiCtrl,
}

impl<'s> SdCard<'s> {
    pub fn new(spi: &'s SpiCtrl) -> Self {
        Self { spi }
    }

    fn dummy(&self) -> u8 {
        self.spi.txrx(0xff)
    }

    /// Send one command frame and return its R1 response.
    fn cmd(&self, cmd: u8, arg: u32, crc: u8) -> u8 {
        self.spi.set_slave_select(CS_ASSERT);
        self.spi.txrx(0x40 | cmd);
        self.spi.txrx((arg >> 24) as u8);
        self.spi.txrx((arg >> 16) as u8);
        self.spi.txrx((arg >> 8) as u8);
        self.spi.txrx(arg as u8);
        self.spi.txrx(crc);

        let mut response = 0xff;
        for _ in 0..R1_TURNAROUND_BYTES {
            response = self.dummy();
            if response & 0x80 == 0 {
                break;
            }
        }
        response
    }

    /// Release the card and clock out one trailing byte.
    fn cmd_end(&self) {
        self.spi.set_slave_select(CS_RELEASE);
        self.dummy();
    }

    fn init_card(&self) -> Result<(), SdInitError> {
        // >74 clocks with the card deselected put it into SPI mode.
        self.spi.set_slave_select(CS_RELEASE);
        for _ in 0..10 {
            self.dummy();
        }

        // CMD0 carries a real CRC7; the card still checks it here.
        let r = self.cmd(CMD0_GO_IDLE_STATE, 0, 0x95);
        self.cmd_end();
        if r != R1_IDLE {
            return Err(SdInitError::Cmd0);
        }

        // CMD8: 2.7-3.6V plus check pattern; the card must echo both.
        let r = self.cmd(CMD8_SEND_IF_COND, 0x1aa, 0x87);
        let mut echo = [0u8; 4];
        for byte in echo.iter_mut() {
            *byte = self.dummy();
        }
        self.cmd_end();
        if r != R1_IDLE || echo[2] != 0x01 || echo[3] != 0xaa {
            return Err(SdInitError::Cmd8);
        }

        // ACMD41 with HCS until the card leaves the idle state.
        loop {
            let r = self.cmd(CMD55_APP_CMD, 0, 0x01);
            self.cmd_end();
            if r & !R1_IDLE != 0 {
                return Err(SdInitError::Acmd41);
            }
            let r = self.cmd(ACMD41_SD_SEND_OP_COND, 0x4000_0000, 0x01);
            self.cmd_end();
            match r {
                R1_READY => break,
                R1_IDLE => continue,
                _ => return Err(SdInitError::Acmd41),
            }
        }

        // CMD58: the OCR must report a block-addressed (CCS) card, since
        // CMD18 below addresses by LBA.
        let r = self.cmd(CMD58_READ_OCR, 0, 0x01);
        let mut ocr = [0u8; 4];
        for byte in ocr.iter_mut() {
            *byte = self.dummy();
        }
        self.cmd_end();
        if r != R1_READY || ocr[0] & 0x40 == 0 {
            return Err(SdInitError::Cmd58);
        }

        // CMD16: fix the block length at one LBA.
        let r = self.cmd(CMD16_SET_BLOCKLEN, BLOCK_SIZE as u32, 0x01);
        self.cmd_end();
        if r != R1_READY {
            return Err(SdInitError::Cmd16);
        }

        Ok(())
    }

    fn read_blocks(&self, dst: &mut [u8], lba: u64) -> Result<(), SdCopyError> {
        let r = self.cmd(CMD18_READ_MULTIPLE_BLOCK, lba as u32, 0x01);
        if r != R1_READY {
            self.cmd_end();
            return Err(SdCopyError::Cmd18);
        }

        let mut result = Ok(());
        for block in dst.chunks_exact_mut(BLOCK_SIZE) {
            // Turnaround bytes until the data start token.
            while self.dummy() != DATA_START_TOKEN {}

            let mut crc = 0u16;
            for byte in block.iter_mut() {
                *byte = self.dummy();
                crc = crc16_step(crc, *byte);
            }
            let wire_crc = u16::from(self.dummy()) << 8 | u16::from(self.dummy());
            if crc != wire_crc {
                result = Err(SdCopyError::Cmd18Crc);
                break;
            }
        }

        // CMD12 ends the transfer whether or not every block arrived, then
        // the card signals busy until it is ready again.
        let _ = self.cmd(CMD12_STOP_TRANSMISSION, 0, 0x01);
        while self.dummy() != 0xff {}
        self.cmd_end();

        result
    }
}

impl BlockDevice for SdCard<'_> {
    const NAME: &'static str = "SD";
    type InitError = SdInitError;
    type CopyError = SdCopyError;

    fn init(&mut self) -> Result<(), SdInitError> {
        self.init_card()
    }

    fn copy(&mut self, dst: &mut [u8], lba: u64, block_count: u64) -> Result<(), SdCopyError> {
        debug_assert_eq!(dst.len(), block_count as usize * BLOCK_SIZE);
        self.read_blocks(dst, lba)
    }
}

/// One step of CRC16-CCITT (XModem), the per-block CRC SD cards use.
fn crc16_step(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ (u16::from(byte) << 8);
    for _ in 0..8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ 0x1021
        } else {
            crc << 1
        };
    }
    crc
}
