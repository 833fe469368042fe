//! Fixed physical address map and board constants.

use zeroboot_media::boot::BootError;
use zeroboot_media::gpt::Guid;

pub const UART0_CTRL_ADDR: usize = 0x1001_0000;
/// Boot flash controller.
pub const SPI0_CTRL_ADDR: usize = 0x1004_0000;
/// SD slot controller.
pub const SPI2_CTRL_ADDR: usize = 0x1005_0000;
pub const GPIO_CTRL_ADDR: usize = 0x1006_0000;
/// Mode-select straps, latched at reset.
pub const MODE_SELECT_ADDR: usize = 0x0000_1000;

/// DDR base the payload lands at; also the handoff jump target.
pub const MEMORY_MEM_ADDR: usize = 0x8000_0000;
/// Upper bound on the next-stage image size.
pub const PAYLOAD_WINDOW_BYTES: usize = 16 * 1024 * 1024;

pub const NUM_CORES: u32 = 5;
/// The hart that does all medium, GPT, and diagnostic work.
pub const LEAD_HART: u64 = 0;

/// Fault indicator pin.
pub const FAULT_LED_MASK: u32 = 1 << 15;

pub const FLASH_SPI_BUS: u32 = 0;
pub const SD_SPI_BUS: u32 = 2;

/// Partition type GUID of the next boot stage image.
pub const NEXT_STAGE_GUID: Guid = Guid::from_bytes([
    0x00, 0x33, 0x19, 0x5b, 0x78, 0xfc, 0xcd, 0x40, 0x80, 0x02, 0xe8, 0x6c, 0x45, 0x58, 0x0b,
    0x47,
]);

/// Register block address for an SPI bus; the straps can name buses this
/// board does not have.
pub fn spi_ctrl_addr(bus: u32) -> Result<usize, BootError> {
    match bus {
        FLASH_SPI_BUS => Ok(SPI0_CTRL_ADDR),
        SD_SPI_BUS => Ok(SPI2_CTRL_ADDR),
        _ => Err(BootError::UnhandledMediaType),
    }
}

/// Latched mode-select strap value.
pub fn read_mode_select() -> u32 {
    unsafe { core::ptr::with_exposed_provenance::<u32>(MODE_SELECT_ADDR).read_volatile() }
}
