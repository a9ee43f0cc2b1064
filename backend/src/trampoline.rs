use dbt_core::{RegisterFile, TranslateError};

use crate::code_buffer::CodeBuffer;
use crate::region::{finalize, CodeRegion};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{CALLEE_SAVED, CALL_ARG_REGS, REGFILE_BASE};

/// Signature of the emitted entry stub.
type EntryFn = unsafe extern "C" fn(regs: *mut RegisterFile, block: *const u8) -> u64;

/// Host stub through which the dispatcher enters translated code.
///
/// Saves the callee-saved registers, pins the register file base in
/// RBP, calls the block and hands its exit code back.
pub struct Trampoline {
    region: CodeRegion,
}

impl Trampoline {
    pub fn new() -> Result<Self, TranslateError> {
        let mut buf = CodeBuffer::with_capacity(32);
        for &reg in CALLEE_SAVED {
            emit_push(&mut buf, reg);
        }
        emit_mov_rr(&mut buf, true, REGFILE_BASE, CALL_ARG_REGS[0]);
        emit_call_reg(&mut buf, CALL_ARG_REGS[1]);
        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(&mut buf, reg);
        }
        emit_ret(&mut buf);
        Ok(Self {
            region: finalize(buf)?,
        })
    }

    /// Run translated code starting at `block` and return its exit code.
    ///
    /// # Safety
    ///
    /// `block` must be the entry of a finalized block that is still
    /// mapped, `regs` must point to a live register file whose
    /// `guest_base` maps the guest memory the block touches, and any
    /// return stack the block was emitted against must still be alive.
    pub unsafe fn enter(&self, regs: *mut RegisterFile, block: *const u8) -> u64 {
        let f: EntryFn = std::mem::transmute::<*const u8, EntryFn>(self.region.entry());
        f(regs, block)
    }
}
