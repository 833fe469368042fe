//! Boot-media orchestration: bring a medium up, find the payload
//! partition, copy it into place.
//!
//! The flow is init media, header block, entry scan, payload copy, with
//! every failure an early return; there is no retry and no fallback to an
//! alternate medium. Collaborator errors are translated to exactly one
//! boot-level enumerant at this boundary, so nothing above it ever observes
//! a raw collaborator error.

use core::convert::Infallible;

use galena::device::block::{BLOCK_SIZE, BlockDevice};
use galena::device::console::Console;
use galena::device::flash::FlashCopyError;
use galena::device::sd::{SdCopyError, SdInitError};
use thiserror::Error;

use crate::gpt::{GPT_HEADER_LBA, GptHeader, Guid};
use crate::locate;

/// Boot-level error taxonomy. The explicit discriminants are the payload
/// values stamped into diagnostic codes.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    #[error("no SPI controller for the selected medium")]
    UnhandledMediaType = 0x1,
    #[error("mode select names no boot routine")]
    UnhandledBootRoutine = 0x2,
    #[error("no GPT partition carries the requested type GUID")]
    PartitionNotFound = 0x3,
    #[error("medium copy failed")]
    MediaCopyFailed = 0x4,
    #[error("SD card rejected CMD0")]
    SdCmd0 = 0x5,
    #[error("SD card rejected CMD8")]
    SdCmd8 = 0x6,
    #[error("SD card rejected ACMD41")]
    SdAcmd41 = 0x7,
    #[error("SD card rejected CMD58")]
    SdCmd58 = 0x8,
    #[error("SD card rejected CMD16")]
    SdCmd16 = 0x9,
    #[error("SD card rejected CMD18")]
    SdCmd18 = 0xa,
    #[error("SD card read failed CRC16")]
    SdCmd18Crc = 0xb,
    #[error("SD card failed with an unrecognized error")]
    SdUnexpected = 0xc,
}

impl BootError {
    /// Diagnostic-code payload value.
    pub const fn code(self) -> u64 {
        self as u64
    }
}

impl From<SdInitError> for BootError {
    fn from(error: SdInitError) -> Self {
        match error {
            SdInitError::Cmd0 => Self::SdCmd0,
            SdInitError::Cmd8 => Self::SdCmd8,
            SdInitError::Acmd41 => Self::SdAcmd41,
            SdInitError::Cmd58 => Self::SdCmd58,
            SdInitError::Cmd16 => Self::SdCmd16,
            _ => Self::SdUnexpected,
        }
    }
}

impl From<SdCopyError> for BootError {
    fn from(error: SdCopyError) -> Self {
        match error {
            SdCopyError::Cmd18 => Self::SdCmd18,
            SdCopyError::Cmd18Crc => Self::SdCmd18Crc,
            _ => Self::SdUnexpected,
        }
    }
}

impl From<FlashCopyError> for BootError {
    fn from(_: FlashCopyError) -> Self {
        Self::MediaCopyFailed
    }
}

impl From<Infallible> for BootError {
    fn from(error: Infallible) -> Self {
        match error {}
    }
}

/// Boot routine selected by the mode-select straps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootRoutine {
    /// GPT scan over the SD card slot.
    SdBlock,
    /// GPT scan over the raw boot flash.
    FlashBlock,
}

/// Strap encodings of the supported routines.
pub const MODE_SELECT_FLASH: u32 = 6;
pub const MODE_SELECT_SD: u32 = 11;

impl BootRoutine {
    pub const fn from_mode_select(mode_select: u32) -> Result<Self, BootError> {
        match mode_select {
            MODE_SELECT_FLASH => Ok(Self::FlashBlock),
            MODE_SELECT_SD => Ok(Self::SdBlock),
            _ => Err(BootError::UnhandledBootRoutine),
        }
    }
}

/// Initialize `media`, mapping collaborator errors into the boot taxonomy.
pub fn initialize<M, C>(media: &mut M, console: &C) -> Result<(), BootError>
where
    M: BlockDevice,
    BootError: From<M::InitError>,
    C: Console + ?Sized,
{
    media.init()?;
    console.puts(M::NAME);
    console.puts(" initialization complete!\n\r");
    Ok(())
}

/// Locate the partition whose type GUID equals `guid` and copy it into
/// `dst`.
///
/// One block is read at the fixed header LBA, the three entry-table fields
/// are pulled out of it, and the entry region is scanned block by block
/// through the same scratch buffer. The first match wins; no match is a
/// partition-not-found failure. Copy errors on the header read and the
/// payload copy propagate as the medium's copy-failure code; a destination
/// window that cannot hold the payload is likewise a copy that cannot
/// complete.
pub fn load_gpt_partition<M, C>(
    media: &mut M,
    console: &C,
    dst: &mut [u8],
    guid: &Guid,
) -> Result<(), BootError>
where
    M: BlockDevice,
    BootError: From<M::CopyError>,
    C: Console + ?Sized,
{
    let mut block = [0u8; BLOCK_SIZE];
    media.copy(&mut block, GPT_HEADER_LBA, 1)?;

    // The scratch block is reused by the scan below, so pull the header
    // fields out before it goes stale.
    let header = GptHeader::new(&block);
    let entries_lba = header.partition_entries_lba();
    let num_entries = header.num_partition_entries();
    let entry_size = header.partition_entry_size();

    let range =
        locate::find_gpt_partition(media, entries_lba, num_entries, entry_size, guid, &mut block);
    if !range.is_valid() {
        return Err(BootError::PartitionNotFound);
    }

    let payload_bytes = range.block_count() as usize * BLOCK_SIZE;
    let dst = dst
        .get_mut(..payload_bytes)
        .ok_or(BootError::MediaCopyFailed)?;
    media.copy(dst, range.first_lba, range.block_count())?;

    console.puts(M::NAME);
    console.puts(" load partition complete!\n\r");
    Ok(())
}

/// Full boot-media flow: init, then locate and copy.
pub fn load_boot_payload<M, C>(
    media: &mut M,
    console: &C,
    dst: &mut [u8],
    guid: &Guid,
) -> Result<(), BootError>
where
    M: BlockDevice,
    BootError: From<M::InitError> + From<M::CopyError>,
    C: Console + ?Sized,
{
    initialize(media, console)?;
    load_gpt_partition(media, console, dst, guid)
}
