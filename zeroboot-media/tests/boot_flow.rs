//! End-to-end boot-media flow over an in-memory medium.

use std::cell::RefCell;

use galena::device::block::{BLOCK_SIZE, BlockDevice};
use galena::device::console::Console;
use galena::device::sd::{SdCopyError, SdInitError};
use zeroboot_media::boot::{self, BootError};
use zeroboot_media::diag::{BOOT_STAGE, DiagCode};
use zeroboot_media::gpt::{Guid, PARTITION_ENTRY_SIZE};

const PAYLOAD_GUID: Guid = Guid::from_bytes([
    0x00, 0x33, 0x19, 0x5b, 0x78, 0xfc, 0xcd, 0x40, 0x80, 0x02, 0xe8, 0x6c, 0x45, 0x58, 0x0b,
    0x47,
]);
const OTHER_GUID: Guid = Guid::from_bytes(*b"not-the-payload!");

const IMAGE_BLOCKS: usize = 64;
const ENTRIES_LBA: u64 = 2;

/// In-memory SD-shaped medium with fault injection and a read log.
struct MockSd {
    image: Vec<u8>,
    init_error: Option<SdInitError>,
    failing_lba: Option<u64>,
    reads: RefCell<Vec<(u64, u64)>>,
}

impl MockSd {
    fn new() -> Self {
        Self {
            image: vec![0; IMAGE_BLOCKS * BLOCK_SIZE],
            init_error: None,
            failing_lba: None,
            reads: RefCell::new(Vec::new()),
        }
    }

    /// Write a GPT header block declaring `num_entries` entries of
    /// `entry_size` bytes starting at [`ENTRIES_LBA`].
    fn put_header(&mut self, num_entries: u32, entry_size: u32) {
        let header = &mut self.image[BLOCK_SIZE..2 * BLOCK_SIZE];
        header[72..80].copy_from_slice(&ENTRIES_LBA.to_le_bytes());
        header[80..84].copy_from_slice(&num_entries.to_le_bytes());
        header[84..88].copy_from_slice(&entry_size.to_le_bytes());
    }

    fn put_entry(&mut self, global_index: usize, guid: &Guid, first: u64, last: u64) {
        let offset = ENTRIES_LBA as usize * BLOCK_SIZE + global_index * PARTITION_ENTRY_SIZE;
        self.image[offset..offset + 16].copy_from_slice(guid.as_bytes());
        self.image[offset + 32..offset + 40].copy_from_slice(&first.to_le_bytes());
        self.image[offset + 40..offset + 48].copy_from_slice(&last.to_le_bytes());
    }

    fn fill_block(&mut self, lba: u64, fill: u8) {
        let start = lba as usize * BLOCK_SIZE;
        self.image[start..start + BLOCK_SIZE].fill(fill);
    }

    fn reads(&self) -> Vec<(u64, u64)> {
        self.reads.borrow().clone()
    }
}

impl BlockDevice for MockSd {
    const NAME: &'static str = "SD";
    type InitError = SdInitError;
    type CopyError = SdCopyError;

    fn init(&mut self) -> Result<(), SdInitError> {
        self.init_error.map_or(Ok(()), Err)
    }

    fn copy(&mut self, dst: &mut [u8], lba: u64, block_count: u64) -> Result<(), SdCopyError> {
        self.reads.borrow_mut().push((lba, block_count));
        if self.failing_lba == Some(lba) {
            return Err(SdCopyError::Cmd18);
        }
        let start = lba as usize * BLOCK_SIZE;
        let len = block_count as usize * BLOCK_SIZE;
        dst.copy_from_slice(&self.image[start..start + len]);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingConsole(RefCell<Vec<u8>>);

impl Console for RecordingConsole {
    fn putc(&self, byte: u8) {
        self.0.borrow_mut().push(byte);
    }
}

impl RecordingConsole {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

fn run(media: &mut MockSd, window_blocks: usize) -> (Result<(), BootError>, Vec<u8>, String) {
    let console = RecordingConsole::default();
    let mut dst = vec![0u8; window_blocks * BLOCK_SIZE];
    let result = boot::load_boot_payload(media, &console, &mut dst, &PAYLOAD_GUID);
    (result, dst, console.text())
}

#[test]
fn init_failure_surfaces_as_its_enumerant() {
    let mut media = MockSd::new();
    media.init_error = Some(SdInitError::Acmd41);

    let (result, _, text) = run(&mut media, 8);
    let error = result.unwrap_err();
    assert_eq!(error, BootError::SdAcmd41);
    // Nothing was read and nothing was announced.
    assert!(media.reads().is_empty());
    assert!(text.is_empty());

    // The emitted diagnostic decodes to this boot stage, no trap.
    let code = DiagCode::from_error(BOOT_STAGE, error);
    assert_eq!(code.bootstage(), 0);
    assert_eq!(code.trap(), 0);
    assert_eq!(code.payload(), 0x7);
}

#[test]
fn empty_entry_table_fails_without_entry_reads() {
    let mut media = MockSd::new();
    media.put_header(0, PARTITION_ENTRY_SIZE as u32);

    let (result, _, _) = run(&mut media, 8);
    assert_eq!(result.unwrap_err(), BootError::PartitionNotFound);
    // Only the header block was touched.
    assert_eq!(media.reads(), [(1, 1)]);
}

#[test]
fn payload_is_copied_and_completion_lines_emitted() {
    let mut media = MockSd::new();
    media.put_header(4, PARTITION_ENTRY_SIZE as u32);
    media.put_entry(0, &OTHER_GUID, 10, 11);
    media.put_entry(2, &PAYLOAD_GUID, 20, 21);
    media.fill_block(20, 0xa5);
    media.fill_block(21, 0x5a);

    let (result, dst, text) = run(&mut media, 8);
    assert_eq!(result, Ok(()));
    assert!(dst[..BLOCK_SIZE].iter().all(|&b| b == 0xa5));
    assert!(dst[BLOCK_SIZE..2 * BLOCK_SIZE].iter().all(|&b| b == 0x5a));
    assert!(text.contains("SD initialization complete!"));
    assert!(text.contains("SD load partition complete!"));
    // Header, one entry block, then the two payload blocks in one copy.
    assert_eq!(media.reads(), [(1, 1), (2, 1), (20, 2)]);
}

#[test]
fn first_match_wins_and_later_blocks_are_never_read() {
    let mut media = MockSd::new();
    // Twelve entries span blocks 2, 3 and 4; the match sits at in-block
    // index 2 of block 3 (global index 6), with a decoy in block 4.
    media.put_header(12, PARTITION_ENTRY_SIZE as u32);
    media.put_entry(6, &PAYLOAD_GUID, 30, 30);
    media.put_entry(9, &PAYLOAD_GUID, 40, 41);
    media.fill_block(30, 0x77);

    let (result, dst, _) = run(&mut media, 8);
    assert_eq!(result, Ok(()));
    assert!(dst[..BLOCK_SIZE].iter().all(|&b| b == 0x77));
    let reads = media.reads();
    assert_eq!(reads, [(1, 1), (2, 1), (3, 1), (30, 1)]);
}

#[test]
fn header_read_failure_propagates_the_copy_code() {
    let mut media = MockSd::new();
    media.failing_lba = Some(1);

    let (result, _, _) = run(&mut media, 8);
    assert_eq!(result.unwrap_err(), BootError::SdCmd18);
}

#[test]
fn payload_read_failure_propagates_the_copy_code() {
    let mut media = MockSd::new();
    media.put_header(4, PARTITION_ENTRY_SIZE as u32);
    media.put_entry(0, &PAYLOAD_GUID, 20, 21);
    media.failing_lba = Some(20);

    let (result, _, _) = run(&mut media, 8);
    assert_eq!(result.unwrap_err(), BootError::SdCmd18);
}

#[test]
fn unreadable_scan_block_is_skipped_not_fatal() {
    let mut media = MockSd::new();
    media.put_header(12, PARTITION_ENTRY_SIZE as u32);
    media.put_entry(6, &PAYLOAD_GUID, 30, 30);
    // First entry block misreads; the match in the next block still wins.
    media.failing_lba = Some(2);

    let (result, _, _) = run(&mut media, 8);
    assert_eq!(result, Ok(()));
}

#[test]
fn window_smaller_than_payload_is_a_copy_failure() {
    let mut media = MockSd::new();
    media.put_header(4, PARTITION_ENTRY_SIZE as u32);
    media.put_entry(0, &PAYLOAD_GUID, 20, 23);

    let (result, _, _) = run(&mut media, 2);
    assert_eq!(result.unwrap_err(), BootError::MediaCopyFailed);
}
