//! Zicsr: the floating-point CSRs and the user-mode counters.

use std::arch::x86_64::_rdtsc;

use dbt_core::RegisterFile;

use super::fpu::{FFLAGS_MASK, FRM_MASK, FRM_SHIFT};

pub const CSR_FFLAGS: u16 = 0x001;
pub const CSR_FRM: u16 = 0x002;
pub const CSR_FCSR: u16 = 0x003;
pub const CSR_CYCLE: u16 = 0xc00;
pub const CSR_TIME: u16 = 0xc01;
pub const CSR_INSTRET: u16 = 0xc02;

/// `time` ticks per second.
pub const TIMEBASE_HZ: u64 = 10_000_000;

/// What a CSR instruction does to the register after reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CsrOp {
    Write = 0,
    Set = 1,
    Clear = 2,
    /// CSRRS/CSRRC with a zero source: no write side effects.
    Read = 3,
}

pub fn is_known(csr: u16) -> bool {
    matches!(
        csr,
        CSR_FFLAGS | CSR_FRM | CSR_FCSR | CSR_CYCLE | CSR_TIME | CSR_INSTRET
    )
}

/// CSRs whose top two address bits are set cannot be written.
pub fn is_read_only(csr: u16) -> bool {
    csr >> 10 == 0b11
}

fn monotonic_ticks() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer; CLOCK_MONOTONIC always exists.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    let ns = (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64);
    ns / (1_000_000_000 / TIMEBASE_HZ)
}

/// Read `csr`, then apply `op` with `src`; returns the old value.
///
/// The translator only emits calls for known CSRs and never a write
/// to a read-only one.
///
/// # Safety
/// `regs` must point to a live register file.
pub unsafe extern "C" fn helper_csr(regs: *mut RegisterFile, csr: u64, src: u64, op: u64) -> u64 {
    let regs = &mut *regs;
    let csr = csr as u16;
    let old = match csr {
        CSR_FFLAGS => regs.fcsr & FFLAGS_MASK,
        CSR_FRM => (regs.fcsr >> FRM_SHIFT) & FRM_MASK,
        CSR_FCSR => regs.fcsr & 0xff,
        // SAFETY: RDTSC is unprivileged on Linux hosts.
        CSR_CYCLE => unsafe { _rdtsc() },
        CSR_TIME => monotonic_ticks(),
        CSR_INSTRET => regs.instret,
        _ => 0,
    };
    let new = match op {
        x if x == CsrOp::Write as u64 => src,
        x if x == CsrOp::Set as u64 => old | src,
        x if x == CsrOp::Clear as u64 => old & !src,
        _ => return old,
    };
    match csr {
        CSR_FFLAGS => regs.fcsr = (regs.fcsr & !FFLAGS_MASK) | (new & FFLAGS_MASK),
        CSR_FRM => {
            regs.fcsr = (regs.fcsr & !(FRM_MASK << FRM_SHIFT)) | ((new & FRM_MASK) << FRM_SHIFT)
        }
        CSR_FCSR => regs.fcsr = new & 0xff,
        _ => {}
    }
    old
}

