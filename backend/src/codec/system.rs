//! FENCE, ECALL and EBREAK.

use dbt_core::{GuestInstruction, TranslateError};

use crate::emit::{BlockEmitter, Tail};

/// A single guest thread sees its own accesses in order, and guest
/// code is never patched after translation, so fences emit nothing.
pub(super) fn gen_fence(
    _e: &mut BlockEmitter<'_>,
    _insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    Ok(())
}

/// Leave `pc` on the ECALL; the dispatcher services it and steps past.
pub(super) fn gen_ecall(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    e.set_pc(insn.addr);
    e.tail = Some(Tail::Ecall);
    Ok(())
}

pub(super) fn gen_ebreak(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    e.set_pc(insn.addr);
    e.tail = Some(Tail::Ebreak);
    Ok(())
}
