//! A extension for a single guest hart: no other agent can observe or
//! break a reservation, so LR/SC and AMOs are plain read-modify-write
//! sequences and SC always succeeds.

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::BlockEmitter;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{TMP0, TMP1, TMP2, TMP3};

fn is_word(mnem: Mnemonic) -> bool {
    use Mnemonic::*;
    matches!(
        mnem,
        LrW | ScW
            | AmoswapW
            | AmoaddW
            | AmoxorW
            | AmoandW
            | AmoorW
            | AmominW
            | AmomaxW
            | AmominuW
            | AmomaxuW
    )
}

/// Load the old value at `[TMP3]` into TMP0, sign-extending words.
fn load_old(e: &mut BlockEmitter<'_>, word: bool) {
    if word {
        emit_load_ext(&mut e.buf, Extend::S32, TMP0, TMP3, 0);
    } else {
        emit_load(&mut e.buf, true, TMP0, TMP3, 0);
    }
}

pub(super) fn gen_lr(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    e.guest_address(insn.rs1, TMP3);
    load_old(e, is_word(insn.mnem));
    e.write(insn.rd, TMP0);
    Ok(())
}

pub(super) fn gen_sc(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    e.guest_address(insn.rs1, TMP3);
    let src = e.read(insn.rs2, TMP1);
    emit_store(&mut e.buf, !is_word(insn.mnem), src, TMP3, 0);
    e.write_imm(insn.rd, 0);
    Ok(())
}

pub(super) fn gen_amo(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    use Mnemonic::*;

    let word = is_word(insn.mnem);
    let w = !word;
    e.guest_address(insn.rs1, TMP3);
    load_old(e, word);
    let rhs = e.read(insn.rs2, TMP1);

    let buf = &mut e.buf;
    let arith = |op: Mnemonic| match op {
        AmoaddW | AmoaddD => Some(ArithOp::Add),
        AmoxorW | AmoxorD => Some(ArithOp::Xor),
        AmoandW | AmoandD => Some(ArithOp::And),
        AmoorW | AmoorD => Some(ArithOp::Or),
        _ => None,
    };
    let select = |op: Mnemonic| match op {
        AmominW | AmominD => Some(X86Cond::Jl),
        AmomaxW | AmomaxD => Some(X86Cond::Jg),
        AmominuW | AmominuD => Some(X86Cond::Jb),
        AmomaxuW | AmomaxuD => Some(X86Cond::Ja),
        _ => None,
    };

    // new value into TMP2
    if let Some(op) = arith(insn.mnem) {
        emit_mov_rr(buf, true, TMP2, TMP0);
        emit_arith_rr(buf, op, w, TMP2, rhs);
    } else if let Some(cond) = select(insn.mnem) {
        emit_mov_rr(buf, true, TMP2, rhs);
        emit_arith_rr(buf, ArithOp::Cmp, w, TMP0, rhs);
        emit_cmovcc(buf, cond, w, TMP2, TMP0);
    } else {
        emit_mov_rr(buf, true, TMP2, rhs);
    }
    emit_store(buf, w, TMP2, TMP3, 0);
    e.write(insn.rd, TMP0);
    Ok(())
}
