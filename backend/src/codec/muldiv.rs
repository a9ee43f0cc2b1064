//! M extension. RISC-V division never traps: division by zero and
//! signed overflow have defined results, so both are branched around
//! before IDIV/DIV can fault.

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::BlockEmitter;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{TMP0, TMP1, TMP2, TMP3};

pub(super) fn gen_mul(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    if insn.rd.is_zero() {
        return Ok(());
    }
    let word = insn.mnem == Mnemonic::Mulw;
    e.load_to(insn.rs1, TMP0);
    let rhs = e.read(insn.rs2, TMP1);
    emit_imul_rr(&mut e.buf, !word, TMP0, rhs);
    if word {
        emit_extend(&mut e.buf, Extend::S32, TMP0, TMP0);
    }
    e.write(insn.rd, TMP0);
    Ok(())
}

/// Upper 64 bits of the 128-bit product; one-operand MUL/IMUL leave
/// them in RDX.
pub(super) fn gen_mul_high(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    if insn.rd.is_zero() {
        return Ok(());
    }
    match insn.mnem {
        Mnemonic::Mulh => {
            e.load_to(insn.rs1, TMP0);
            let rhs = e.read(insn.rs2, TMP1);
            emit_imul1(&mut e.buf, true, rhs);
        }
        Mnemonic::Mulhu => {
            e.load_to(insn.rs1, TMP0);
            let rhs = e.read(insn.rs2, TMP1);
            emit_mul(&mut e.buf, true, rhs);
        }
        _ => {
            // signed x unsigned: mulhu(a, b) - (a < 0 ? b : 0)
            e.load_to(insn.rs1, TMP3);
            emit_mov_rr(&mut e.buf, true, TMP0, TMP3);
            let rhs = e.read(insn.rs2, TMP1);
            emit_mul(&mut e.buf, true, rhs);
            emit_shift_ri(&mut e.buf, ShiftOp::Sar, true, TMP3, 63);
            emit_arith_rr(&mut e.buf, ArithOp::And, true, TMP3, rhs);
            emit_arith_rr(&mut e.buf, ArithOp::Sub, true, TMP2, TMP3);
        }
    }
    e.write(insn.rd, TMP2);
    Ok(())
}

pub(super) fn gen_div_rem(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    use Mnemonic::*;

    if insn.rd.is_zero() {
        return Ok(());
    }
    let signed = matches!(insn.mnem, Div | Rem | Divw | Remw);
    let rem = matches!(insn.mnem, Rem | Remu | Remw | Remuw);
    let word = matches!(insn.mnem, Divw | Divuw | Remw | Remuw);
    let w = !word;
    // quotient in RAX, remainder in RDX
    let res = if rem { TMP2 } else { TMP0 };

    e.load_to(insn.rs1, TMP0);
    e.load_to(insn.rs2, TMP1);

    let buf = &mut e.buf;
    let by_zero = buf.new_label();
    let done = buf.new_label();

    emit_test_rr(buf, w, TMP1, TMP1);
    emit_jcc(buf, X86Cond::Je, by_zero);

    if signed {
        // MIN / -1 overflows IDIV; the result is MIN with remainder 0.
        let regular = buf.new_label();
        emit_arith_ri(buf, ArithOp::Cmp, w, TMP1, -1);
        emit_jcc(buf, X86Cond::Jne, regular);
        if rem {
            emit_mov_ri(buf, false, TMP2, 0);
        } else {
            emit_neg(buf, w, TMP0);
        }
        emit_jmp(buf, done);
        buf.bind(regular)?;
        if word {
            emit_cdq(buf);
        } else {
            emit_cqo(buf);
        }
        emit_idiv(buf, w, TMP1);
    } else {
        emit_mov_ri(buf, false, TMP2, 0);
        emit_div(buf, w, TMP1);
    }
    emit_jmp(buf, done);

    // x / 0 = all ones, x % 0 = x
    buf.bind(by_zero)?;
    if rem {
        emit_mov_rr(buf, true, TMP2, TMP0);
    } else {
        emit_mov_ri(buf, true, TMP0, u64::MAX);
    }

    buf.bind(done)?;
    if word {
        emit_extend(buf, Extend::S32, res, res);
    }
    e.write(insn.rd, res);
    Ok(())
}
