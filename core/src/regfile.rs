//! Guest architectural state shared with translated code.

use std::fmt;

use crate::reg::{GuestReg, NUM_GUEST_REGS};

/// Guest register file (RV64, user-mode).
///
/// `#[repr(C)]` so translated code can address every field at a
/// fixed offset from the base pointer it keeps in a host register.
#[repr(C)]
#[derive(Clone)]
pub struct RegisterFile {
    /// x0-x31. Translated code never writes x0.
    pub gpr: [u64; NUM_GUEST_REGS],
    /// Program counter. Written by every block exit.
    pub pc: u64,
    /// Host address of guest address 0.
    pub guest_base: u64,
    /// f0-f31 as raw bits. Single-precision values are NaN-boxed.
    pub fpr: [u64; NUM_FP_REGS],
    /// `frm` in bits 7:5, accrued `fflags` in bits 4:0.
    pub fcsr: u64,
    /// Retired instructions, credited a whole block at a time on entry.
    pub instret: u64,
}

/// Number of guest floating-point registers (f0-f31).
pub const NUM_FP_REGS: usize = 32;

/// Byte offset of `gpr[i]`: `i * 8`.
pub const fn gpr_offset(reg: GuestReg) -> i32 {
    (reg.index() * 8) as i32
}

/// Byte offset of the `pc` field.
pub const PC_OFFSET: i32 = (NUM_GUEST_REGS * 8) as i32; // 256

/// Byte offset of the `guest_base` field.
pub const GUEST_BASE_OFFSET: i32 = PC_OFFSET + 8; // 264

/// Byte offset of `fpr[0]`.
pub const FPR_OFFSET: i32 = GUEST_BASE_OFFSET + 8; // 272

pub const FCSR_OFFSET: i32 = FPR_OFFSET + (NUM_FP_REGS * 8) as i32; // 528

pub const INSTRET_OFFSET: i32 = FCSR_OFFSET + 8; // 536

/// Byte offset of `fpr[n]` for a 5-bit register field `n`.
pub const fn fpr_offset(n: u32) -> i32 {
    FPR_OFFSET + ((n & 0x1f) * 8) as i32
}

const _: () = assert!(std::mem::offset_of!(RegisterFile, pc) == PC_OFFSET as usize);
const _: () = assert!(std::mem::offset_of!(RegisterFile, guest_base) == GUEST_BASE_OFFSET as usize);
const _: () = assert!(std::mem::offset_of!(RegisterFile, fpr) == FPR_OFFSET as usize);
const _: () = assert!(std::mem::offset_of!(RegisterFile, fcsr) == FCSR_OFFSET as usize);
const _: () = assert!(std::mem::offset_of!(RegisterFile, instret) == INSTRET_OFFSET as usize);

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            gpr: [0; NUM_GUEST_REGS],
            pc: 0,
            guest_base: 0,
            fpr: [0; NUM_FP_REGS],
            fcsr: 0,
            instret: 0,
        }
    }

    #[inline]
    pub fn get(&self, reg: GuestReg) -> u64 {
        self.gpr[reg.index()]
    }

    /// Write a register; writes to x0 are discarded.
    #[inline]
    pub fn set(&mut self, reg: GuestReg, val: u64) {
        if !reg.is_zero() {
            self.gpr[reg.index()] = val;
        }
    }

    /// Base pointer handed to translated code.
    pub fn as_mut_ptr(&mut self) -> *mut RegisterFile {
        self as *mut RegisterFile
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pc   = {:#018x}", self.pc)?;
        for row in GuestReg::all().collect::<Vec<_>>().chunks(4) {
            for (i, reg) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str("  ")?;
                }
                write!(f, "{:<4} = {:#018x}", reg.abi_name(), self.get(*reg))?;
            }
            writeln!(f)?;
        }
        for (r, vals) in self.fpr.chunks(4).enumerate() {
            for (i, val) in vals.iter().enumerate() {
                if i > 0 {
                    f.write_str("  ")?;
                }
                write!(f, "f{:<3} = {val:#018x}", r * 4 + i)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "fcsr = {:#04x}", self.fcsr)
    }
}
