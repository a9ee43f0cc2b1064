//! Loads and stores. Guest addresses are offsets from the guest memory
//! base kept in the register file; the instruction's immediate becomes
//! the host displacement.

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::{imm32, BlockEmitter};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{TMP0, TMP1};

pub(super) fn gen_load(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let disp = imm32(insn.imm)?;
    e.guest_address(insn.rs1, TMP1);
    let buf = &mut e.buf;
    match insn.mnem {
        Mnemonic::Lb => emit_load_ext(buf, Extend::S8, TMP0, TMP1, disp),
        Mnemonic::Lh => emit_load_ext(buf, Extend::S16, TMP0, TMP1, disp),
        Mnemonic::Lw => emit_load_ext(buf, Extend::S32, TMP0, TMP1, disp),
        Mnemonic::Lbu => emit_load_ext(buf, Extend::U8, TMP0, TMP1, disp),
        Mnemonic::Lhu => emit_load_ext(buf, Extend::U16, TMP0, TMP1, disp),
        Mnemonic::Lwu => emit_load(buf, false, TMP0, TMP1, disp),
        _ => emit_load(buf, true, TMP0, TMP1, disp),
    }
    e.write(insn.rd, TMP0);
    Ok(())
}

pub(super) fn gen_store(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let disp = imm32(insn.imm)?;
    e.guest_address(insn.rs1, TMP1);
    let src = e.read(insn.rs2, TMP0);
    let buf = &mut e.buf;
    match insn.mnem {
        Mnemonic::Sb => emit_store_byte(buf, src, TMP1, disp),
        Mnemonic::Sh => emit_store_word(buf, src, TMP1, disp),
        Mnemonic::Sw => emit_store(buf, false, src, TMP1, disp),
        _ => emit_store(buf, true, src, TMP1, disp),
    }
    Ok(())
}
