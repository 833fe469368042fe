//! Just enough GPT to find one partition by its type GUID.
//!
//! No header validation, no CRC, no writing: the boot path consumes three
//! header fields and scans entries for a byte-equal type GUID, nothing more.

use galena::device::block::BLOCK_SIZE;

/// LBA of the primary GPT header.
pub const GPT_HEADER_LBA: u64 = 1;

/// Byte stride of one entry in the on-media partition entry array.
pub const PARTITION_ENTRY_SIZE: usize = 128;

/// 128-bit partition type identifier. Equality is exact byte comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guid([u8; 16]);

impl Guid {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Inclusive LBA range of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    pub first_lba: u64,
    pub last_lba: u64,
}

impl PartitionRange {
    /// The "not found" sentinel. A real match can never produce it: any
    /// valid range has `first_lba <= last_lba`.
    pub const fn invalid() -> Self {
        Self {
            first_lba: 1,
            last_lba: 0,
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.first_lba <= self.last_lba
    }

    /// Number of blocks the range spans.
    pub const fn block_count(&self) -> u64 {
        self.last_lba + 1 - self.first_lba
    }
}

/// Read-only view of the header fields the boot path consumes.
pub struct GptHeader<'b> {
    block: &'b [u8; BLOCK_SIZE],
}

impl<'b> GptHeader<'b> {
    pub fn new(block: &'b [u8; BLOCK_SIZE]) -> Self {
        Self { block }
    }

    fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.block[offset..offset + 8].try_into().unwrap())
    }

    fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.block[offset..offset + 4].try_into().unwrap())
    }

    /// First LBA of the partition entry array.
    pub fn partition_entries_lba(&self) -> u64 {
        self.read_u64(72)
    }

    pub fn num_partition_entries(&self) -> u32 {
        self.read_u32(80)
    }

    pub fn partition_entry_size(&self) -> u32 {
        self.read_u32(84)
    }
}

/// Scan one block of partition entries for `guid`, in entry order, treating
/// the block as holding at most `max_entries` candidates.
pub fn find_partition_by_guid(block: &[u8], guid: &Guid, max_entries: u32) -> PartitionRange {
    for index in 0..max_entries as usize {
        let offset = index * PARTITION_ENTRY_SIZE;
        let Some(entry) = block.get(offset..offset + PARTITION_ENTRY_SIZE) else {
            break;
        };
        if entry[..16] == guid.0 {
            return PartitionRange {
                first_lba: u64::from_le_bytes(entry[32..40].try_into().unwrap()),
                last_lba: u64::from_le_bytes(entry[40..48].try_into().unwrap()),
            };
        }
    }
    PartitionRange::invalid()
}
