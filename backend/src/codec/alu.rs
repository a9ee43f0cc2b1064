//! Integer register/immediate arithmetic (RV64I).

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::{imm32, BlockEmitter};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{TMP0, TMP1};

/// `*W` forms compute in 32 bits and sign-extend the result.
fn is_word(mnem: Mnemonic) -> bool {
    use Mnemonic::*;
    matches!(
        mnem,
        Addw | Subw | Addiw | Sllw | Srlw | Sraw | Slliw | Srliw | Sraiw
    )
}

fn arith_op(mnem: Mnemonic) -> ArithOp {
    use Mnemonic::*;
    match mnem {
        Add | Addw | Addi | Addiw => ArithOp::Add,
        Sub | Subw => ArithOp::Sub,
        And | Andi => ArithOp::And,
        Or | Ori => ArithOp::Or,
        Xor | Xori => ArithOp::Xor,
        _ => unreachable!("{mnem} is not an arithmetic op"),
    }
}

fn shift_op(mnem: Mnemonic) -> ShiftOp {
    use Mnemonic::*;
    match mnem {
        Sll | Sllw | Slli | Slliw => ShiftOp::Shl,
        Srl | Srlw | Srli | Srliw => ShiftOp::Shr,
        Sra | Sraw | Srai | Sraiw => ShiftOp::Sar,
        _ => unreachable!("{mnem} is not a shift"),
    }
}

fn finish_word(e: &mut BlockEmitter<'_>, word: bool) {
    if word {
        emit_extend(&mut e.buf, Extend::S32, TMP0, TMP0);
    }
}

/// LUI / AUIPC: the value is known at translation time.
pub(super) fn gen_upper(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let val = match insn.mnem {
        Mnemonic::Auipc => insn.addr.wrapping_add(insn.imm as u64),
        _ => insn.imm as u64,
    };
    e.write_imm(insn.rd, val);
    Ok(())
}

pub(super) fn gen_arith(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    if insn.rd.is_zero() {
        return Ok(());
    }
    let word = is_word(insn.mnem);
    e.load_to(insn.rs1, TMP0);
    let rhs = e.read(insn.rs2, TMP1);
    emit_arith_rr(&mut e.buf, arith_op(insn.mnem), !word, TMP0, rhs);
    finish_word(e, word);
    e.write(insn.rd, TMP0);
    Ok(())
}

pub(super) fn gen_arith_imm(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    if insn.rd.is_zero() {
        return Ok(());
    }
    let word = is_word(insn.mnem);
    let op = arith_op(insn.mnem);
    let imm = imm32(insn.imm)?;
    e.load_to(insn.rs1, TMP0);
    if imm != 0 || op == ArithOp::And {
        emit_arith_ri(&mut e.buf, op, !word, TMP0, imm);
    }
    finish_word(e, word);
    e.write(insn.rd, TMP0);
    Ok(())
}

/// Register shifts. x86 masks CL to 6 (or 5) bits exactly like RISC-V
/// masks `rs2`.
pub(super) fn gen_shift(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    if insn.rd.is_zero() {
        return Ok(());
    }
    let word = is_word(insn.mnem);
    e.load_to(insn.rs2, TMP1);
    e.load_to(insn.rs1, TMP0);
    emit_shift_cl(&mut e.buf, shift_op(insn.mnem), !word, TMP0);
    finish_word(e, word);
    e.write(insn.rd, TMP0);
    Ok(())
}

pub(super) fn gen_shift_imm(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    if insn.rd.is_zero() {
        return Ok(());
    }
    let word = is_word(insn.mnem);
    let shamt = (insn.imm & if word { 0x1f } else { 0x3f }) as u8;
    e.load_to(insn.rs1, TMP0);
    if shamt != 0 {
        emit_shift_ri(&mut e.buf, shift_op(insn.mnem), !word, TMP0, shamt);
    }
    finish_word(e, word);
    e.write(insn.rd, TMP0);
    Ok(())
}

/// SLT / SLTU / SLTI / SLTIU. The immediate forms compare against the
/// sign-extended immediate, unsigned for SLTIU.
pub(super) fn gen_set_less(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    use Mnemonic::*;

    if insn.rd.is_zero() {
        return Ok(());
    }
    let cond = match insn.mnem {
        Slt | Slti => X86Cond::Jl,
        _ => X86Cond::Jb,
    };
    e.load_to(insn.rs1, TMP0);
    match insn.mnem {
        Slti | Sltiu => {
            let imm = imm32(insn.imm)?;
            emit_arith_ri(&mut e.buf, ArithOp::Cmp, true, TMP0, imm);
        }
        _ => {
            let rhs = e.read(insn.rs2, TMP1);
            emit_arith_rr(&mut e.buf, ArithOp::Cmp, true, TMP0, rhs);
        }
    }
    emit_setcc(&mut e.buf, cond, TMP0);
    emit_extend(&mut e.buf, Extend::U8, TMP0, TMP0);
    e.write(insn.rd, TMP0);
    Ok(())
}
