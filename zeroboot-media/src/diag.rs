//! Bit-packed diagnostic codes emitted on the failure path.

use proc_bitfield::bitfield;

use crate::boot::BootError;

/// Stage tag this firmware stamps into every diagnostic code.
pub const BOOT_STAGE: u8 = 0;

bitfield! {
    /// 64-bit diagnostic code.
    ///
    /// `[63:60]` bootstage, `[59:56]` trap flag, `[55:0]` payload. When the
    /// trap flag is set the payload is a compressed hardware cause: bit 55
    /// carries the cause register's interrupt bit and `[54:0]` the cause
    /// value. Built once at the failure boundary, never mutated after.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct DiagCode(pub u64): Debug, FromStorage, IntoStorage {
        pub payload: u64 @ 0..=55,
        pub cause: u64 @ 0..=54,
        pub interrupt: bool @ 55,
        pub trap: u8 @ 56..=59,
        pub bootstage: u8 @ 60..=63,
    }
}
const _: () = const { assert!(size_of::<DiagCode>() == 8) };

impl DiagCode {
    /// Pack a boot-logic error.
    pub fn from_error(stage: u8, error: BootError) -> Self {
        Self(0)
            .with_bootstage(stage)
            .with_trap(0)
            .with_payload(error.code())
    }

    /// Pack a hardware trap cause. A negative cause is an interrupt; its
    /// sign moves to payload bit 55 and the low 55 bits keep the value.
    pub fn from_trap_cause(stage: u8, cause: i64) -> Self {
        Self(0)
            .with_bootstage(stage)
            .with_trap(1)
            .with_cause(cause as u64 & ((1 << 55) - 1))
            .with_interrupt(cause < 0)
    }

    /// Pack either kind, as the fail handler receives them.
    pub fn compose(stage: u8, is_trap: bool, code: i64) -> Self {
        if is_trap {
            Self::from_trap_cause(stage, code)
        } else {
            Self(0)
                .with_bootstage(stage)
                .with_trap(0)
                .with_payload(code as u64 & ((1 << 56) - 1))
        }
    }

    /// The two 32-bit console halves, most significant first.
    pub fn halves(self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn error_round_trip_at_the_edges() {
        for payload in [0u64, (1 << 56) - 1, 0x00de_ad12_3456_7890] {
            let code = DiagCode::compose(3, false, payload as i64);
            assert_eq!(code.bootstage(), 3);
            assert_eq!(code.trap(), 0);
            assert_eq!(code.payload(), payload);
        }
    }

    #[test]
    fn boot_error_payload_is_its_code() {
        let code = DiagCode::from_error(BOOT_STAGE, BootError::SdAcmd41);
        assert_eq!(code.bootstage(), 0);
        assert_eq!(code.trap(), 0);
        assert_eq!(code.payload(), 0x7);
    }

    #[test]
    fn interrupt_cause_sets_bit_55() {
        // Machine timer interrupt: mcause sign bit plus cause 7.
        let mcause = 0x8000_0000_0000_0007u64 as i64;
        let code = DiagCode::compose(0, true, mcause);
        assert_eq!(code.trap(), 1);
        assert!(code.interrupt());
        assert_eq!(code.cause(), 7);
    }

    #[test]
    fn exception_cause_keeps_bit_55_clear() {
        let code = DiagCode::compose(0, true, 2);
        assert_eq!(code.trap(), 1);
        assert!(!code.interrupt());
        assert_eq!(code.cause(), 2);
    }

    #[test]
    fn halves_split_most_significant_first() {
        let code = DiagCode::from(0x0123_4567_89ab_cdefu64);
        assert_eq!(code.halves(), (0x0123_4567, 0x89ab_cdef));
    }

    proptest! {
        #[test]
        fn payload_round_trips(stage in 0u8..=15, payload in 0u64..(1u64 << 56)) {
            let code = DiagCode::compose(stage, false, payload as i64);
            prop_assert_eq!(code.bootstage(), stage);
            prop_assert_eq!(code.trap(), 0);
            prop_assert_eq!(code.payload(), payload);
        }

        #[test]
        fn trap_cause_compression(cause in any::<i64>()) {
            let code = DiagCode::compose(0, true, cause);
            prop_assert_eq!(code.trap(), 1);
            prop_assert_eq!(code.interrupt(), cause < 0);
            prop_assert_eq!(code.cause(), cause as u64 & ((1 << 55) - 1));
        }
    }
}
