//! Branches and jumps. Every block-ending control transfer stores the
//! guest successor in `pc`; the block exit decides how it is reached.

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::{imm32, BlockEmitter, Tail};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{TMP0, TMP1, TMP2, TMP3};

fn branch_cond(mnem: Mnemonic) -> X86Cond {
    match mnem {
        Mnemonic::Beq => X86Cond::Je,
        Mnemonic::Bne => X86Cond::Jne,
        Mnemonic::Blt => X86Cond::Jl,
        Mnemonic::Bge => X86Cond::Jge,
        Mnemonic::Bltu => X86Cond::Jb,
        Mnemonic::Bgeu => X86Cond::Jae,
        _ => unreachable!("{mnem} is not a branch"),
    }
}

/// `pc = cond ? target : pc + 4`, selected without a host branch.
pub(super) fn gen_branch(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    // Both candidates are materialized before the compare: loading a
    // zero would otherwise clear the flags.
    emit_mov_ri(&mut e.buf, true, TMP2, insn.next_addr());
    emit_mov_ri(&mut e.buf, true, TMP3, insn.target());
    e.load_to(insn.rs1, TMP0);
    let rhs = e.read(insn.rs2, TMP1);
    emit_arith_rr(&mut e.buf, ArithOp::Cmp, true, TMP0, rhs);
    emit_cmovcc(&mut e.buf, branch_cond(insn.mnem), true, TMP2, TMP3);
    e.set_pc_reg(TMP2);
    e.tail = Some(Tail::Next);
    Ok(())
}

/// A JAL that was not folded into the block.
pub(super) fn gen_jal(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let link = insn.next_addr();
    e.write_imm(insn.rd, link);
    if insn.is_call() {
        e.emit_return_push(link)?;
    }
    e.set_pc(insn.target());
    e.tail = Some(Tail::Next);
    Ok(())
}

/// Link-only form of an inlined JAL.
pub(super) fn gen_link(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let link = insn.addr.wrapping_add(insn.imm as u64);
    e.write_imm(insn.rd, link);
    if insn.is_call() {
        e.emit_return_push(link)?;
    }
    Ok(())
}

pub(super) fn gen_jalr(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let link = insn.next_addr();
    let imm = imm32(insn.imm)?;
    // Target first: rd may alias rs1.
    e.load_to(insn.rs1, TMP2);
    if imm != 0 {
        emit_arith_ri(&mut e.buf, ArithOp::Add, true, TMP2, imm);
    }
    emit_arith_ri(&mut e.buf, ArithOp::And, true, TMP2, -2);
    e.set_pc_reg(TMP2);
    e.write_imm(insn.rd, link);
    if insn.is_call() {
        e.emit_return_push(link)?;
    }
    e.tail = Some(if insn.is_return() && e.return_stack_enabled() {
        Tail::Return
    } else {
        Tail::Next
    });
    Ok(())
}
