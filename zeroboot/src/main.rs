//! Zeroth-stage boot loader: pull the next stage out of a GPT-partitioned
//! medium into DDR and hand every hart off to it.

#![no_std]
#![no_main]

use core::arch::{asm, global_asm};
use core::panic::PanicInfo;

use galena::console_print;
use galena::device::console::Console;
use galena::device::flash::SpiFlash;
use galena::device::sd::SdCard;
use galena::device::spi::SpiCtrl;
use galena::device::uart::UartCtrl;
use zeroboot_media::boot::{self, BootError, BootRoutine};

mod barrier;
mod csr;
mod fail;
mod platform;

use barrier::Barrier;

global_asm!(
    r#"
.attribute arch, "rv64imac"
"#
);

// Every hart lands here out of reset. Hart 0 prepares the image (BSS, data
// copy) and releases the rest; all of them end up in kernel_main on their
// own 4KiB stack (keep the size in sync with zsbl.ld).
global_asm!(
    r#"
.section .text.init
.globl _start
_start:
.option push
.option norelax
    la gp, __global_pointer$
.option pop

    csrw mie, zero
    csrci mstatus, 8
    la t0, __trap_vector
    csrw mtvec, t0

    la sp, __stack_start__
    li t0, 0x1000
    csrr t1, mhartid
    addi t1, t1, 1
    mul t0, t0, t1
    add sp, sp, t0
    andi sp, sp, -16
    add fp, sp, zero

    csrr t0, mhartid
    bnez t0, 6f

    la t1, __bss_start__
    la t2, __bss_end__
1:
    bgeu t1, t2, 2f
    sd zero, 0(t1)
    addi t1, t1, 8
    j 1b
2:
    la t1, __data_start__
    la t2, __data_end__
    la t3, __data_load_start__
3:
    bgeu t1, t2, 4f
    ld t4, 0(t3)
    sd t4, 0(t1)
    addi t1, t1, 8
    addi t3, t3, 8
    j 3b
4:
    la t1, __boot_release
    li t2, 1
    fence rw, w
    sw t2, 0(t1)
    j 8f

6:
    la t1, __boot_release
7:
    lw t2, 0(t1)
    beqz t2, 7b
    fence r, rw

8:
    call kernel_main

.align 2
.globl __trap_vector
__trap_vector:
    j handle_trap

.section .bss
.align 2
__boot_release:
    .zero 4
"#
);

static BOOT_BARRIER: Barrier = Barrier::new();

#[unsafe(no_mangle)]
pub extern "C" fn kernel_main() -> ! {
    let uart = unsafe { UartCtrl::new(platform::UART0_CTRL_ADDR) };

    if csr::mhartid() == platform::LEAD_HART {
        uart.puts("\n\r");
        if let Err(error) = load_next_stage(&uart) {
            fail::fail(error.code() as i64, false);
        }
        uart.puts("load gpt partition done!\n\r");
    }

    // Secondary harts may not touch the payload window until the lead hart
    // has fully populated it.
    BOOT_BARRIER.wait(platform::NUM_CORES);

    // One liveness character per hart, then into the next stage.
    uart.putc(b'@');
    unsafe { jump_to_payload() }
}

fn load_next_stage(console: &UartCtrl) -> Result<(), BootError> {
    let routine = BootRoutine::from_mode_select(platform::read_mode_select())?;
    // The lead hart is the window's only writer until the barrier opens.
    let dst = unsafe {
        core::slice::from_raw_parts_mut(
            platform::MEMORY_MEM_ADDR as *mut u8,
            platform::PAYLOAD_WINDOW_BYTES,
        )
    };
    match routine {
        BootRoutine::SdBlock => {
            let spi = unsafe { SpiCtrl::new(platform::spi_ctrl_addr(platform::SD_SPI_BUS)?) };
            let mut sd = SdCard::new(&spi);
            boot::load_boot_payload(&mut sd, console, dst, &platform::NEXT_STAGE_GUID)
        }
        BootRoutine::FlashBlock => {
            let spi = unsafe { SpiCtrl::new(platform::spi_ctrl_addr(platform::FLASH_SPI_BUS)?) };
            let mut flash = SpiFlash::new(&spi);
            boot::load_boot_payload(&mut flash, console, dst, &platform::NEXT_STAGE_GUID)
        }
    }
}

unsafe fn jump_to_payload() -> ! {
    unsafe {
        asm!("jr {0}", in(reg) platform::MEMORY_MEM_ADDR, options(noreturn));
    }
}

// The fail path never returns, so the trap vector needs no context save.
#[unsafe(no_mangle)]
extern "C" fn handle_trap() -> ! {
    fail::fail(csr::mcause() as i64, true)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let uart = unsafe { UartCtrl::new(platform::UART0_CTRL_ADDR) };
    console_print!(&uart, "\n\rpanic: {}\n\r", info);
    fail::halt_forever()
}
