//! Terminal failure path: diagnostics out, fault indicator on, halt.

use core::hint::spin_loop;

use galena::device::console::Console;
use galena::device::gpio::GpioCtrl;
use galena::device::uart::UartCtrl;
use zeroboot_media::diag::{BOOT_STAGE, DiagCode};

use crate::{csr, platform};

/// Report `code` and halt every hart for good.
///
/// Only the lead hart owns the console, so only it emits the diagnostic:
/// transmitter reset, then the two 32-bit hex halves of the composed code.
/// Every hart raises the fault indicator, which is why those register
/// writes are atomic, and then spins. There is no recovery path.
pub fn fail(code: i64, is_trap: bool) -> ! {
    if csr::mhartid() == platform::LEAD_HART {
        let uart = unsafe { UartCtrl::new(platform::UART0_CTRL_ADDR) };
        uart.reset_tx();

        let diag = DiagCode::compose(BOOT_STAGE, is_trap, code);
        let (hi, lo) = diag.halves();
        uart.puts("Error 0x");
        uart.put_hex32(hi);
        uart.put_hex32(lo);
    }
    halt_forever()
}

/// Toggle the fault indicator and spin.
pub fn halt_forever() -> ! {
    let gpio = unsafe { GpioCtrl::new(platform::GPIO_CTRL_ADDR) };
    gpio.raise_fault(platform::FAULT_LED_MASK);
    loop {
        spin_loop();
    }
}
