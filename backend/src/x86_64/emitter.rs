//! x86-64 instruction encoder.
//!
//! Every ModR/M-encoded instruction goes through `encode`: an
//! `Opcode` describing prefixes and operand size, the reg field
//! (a register or an opcode extension digit) and an `Rm` operand.
//! The public `emit_*` functions are thin wrappers that pick the
//! opcode and operand order.

use crate::code_buffer::{CodeBuffer, Label, RelocKind};
use crate::x86_64::regs::Reg;

/// Opcode byte plus the prefixes and size attributes it is emitted with.
#[derive(Debug, Clone, Copy)]
struct Opcode {
    code: u8,
    /// Preceded by the 0x0F escape.
    escaped: bool,
    /// REX.W: 64-bit operand size.
    wide: bool,
    /// 0x66: 16-bit operand size.
    word: bool,
    /// Byte-register operands; SPL/BPL/SIL/DIL need a REX prefix.
    byte: bool,
}

impl Opcode {
    const fn one(code: u8) -> Self {
        Self {
            code,
            escaped: false,
            wide: false,
            word: false,
            byte: false,
        }
    }

    const fn two(code: u8) -> Self {
        Self {
            escaped: true,
            ..Self::one(code)
        }
    }

    const fn w(self, wide: bool) -> Self {
        Self { wide, ..self }
    }

    const fn o16(self) -> Self {
        Self { word: true, ..self }
    }

    const fn b(self) -> Self {
        Self { byte: true, ..self }
    }

    const fn plus(self, n: u8) -> Self {
        Self {
            code: self.code + n,
            ..self
        }
    }
}

/// The r/m operand.
#[derive(Debug, Clone, Copy)]
enum Rm {
    Reg(Reg),
    /// `[base + index << scale + disp]`.
    Mem {
        base: Reg,
        index: Option<(Reg, u8)>,
        disp: i32,
    },
}

impl Rm {
    const fn at(base: Reg, disp: i32) -> Self {
        Rm::Mem {
            base,
            index: None,
            disp,
        }
    }
}

// Opcode extension digits (ModR/M reg field).
const GRP3_NEG: u8 = 3;
const GRP3_MUL: u8 = 4;
const GRP3_IMUL: u8 = 5;
const GRP3_DIV: u8 = 6;
const GRP3_IDIV: u8 = 7;
const GRP5_CALL: u8 = 2;
const GRP5_JMP: u8 = 4;

const MOV_STORE: Opcode = Opcode::one(0x89);
const MOV_LOAD: Opcode = Opcode::one(0x8B);
const MOV_IMM: Opcode = Opcode::one(0xC7);
const GRP1_IMM8: Opcode = Opcode::one(0x83);
const GRP1_IMM32: Opcode = Opcode::one(0x81);
const GRP2_ONE: Opcode = Opcode::one(0xD1);
const GRP2_IMM8: Opcode = Opcode::one(0xC1);
const GRP2_CL: Opcode = Opcode::one(0xD3);
const GRP3: Opcode = Opcode::one(0xF7);
const GRP5: Opcode = Opcode::one(0xFF);

/// ALU operations of opcode group 1; the value is the /digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

impl ArithOp {
    /// `op r, r/m` form (0x03, 0x0B, ... 0x3B).
    const fn reg_form(self) -> Opcode {
        Opcode::one(0x03 + ((self as u8) << 3))
    }
}

/// Shift operations of opcode group 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Extending moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extend {
    /// Sign-extend byte to 64 bits.
    S8,
    /// Sign-extend word to 64 bits.
    S16,
    /// Sign-extend dword to 64 bits.
    S32,
    /// Zero-extend byte (the 32-bit write clears the upper half).
    U8,
    /// Zero-extend word.
    U16,
}

impl Extend {
    const fn opcode(self) -> Opcode {
        match self {
            Extend::S8 => Opcode::two(0xBE).w(true).b(),
            Extend::S16 => Opcode::two(0xBF).w(true),
            Extend::S32 => Opcode::one(0x63).w(true),
            Extend::U8 => Opcode::two(0xB6).b(),
            Extend::U16 => Opcode::two(0xB7),
        }
    }
}

/// x86 condition codes, numbered as in Jcc/SETcc/CMOVcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    Jo = 0x0,
    Jno = 0x1,
    Jb = 0x2,
    Jae = 0x3,
    Je = 0x4,
    Jne = 0x5,
    Jbe = 0x6,
    Ja = 0x7,
    Js = 0x8,
    Jns = 0x9,
    Jp = 0xA,
    Jnp = 0xB,
    Jl = 0xC,
    Jge = 0xD,
    Jle = 0xE,
    Jg = 0xF,
}

impl X86Cond {
    const ALL: [X86Cond; 16] = [
        X86Cond::Jo,
        X86Cond::Jno,
        X86Cond::Jb,
        X86Cond::Jae,
        X86Cond::Je,
        X86Cond::Jne,
        X86Cond::Jbe,
        X86Cond::Ja,
        X86Cond::Js,
        X86Cond::Jns,
        X86Cond::Jp,
        X86Cond::Jnp,
        X86Cond::Jl,
        X86Cond::Jge,
        X86Cond::Jle,
        X86Cond::Jg,
    ];

    /// Negated condition. Conditions come in pairs differing in bit 0.
    pub fn invert(self) -> Self {
        Self::ALL[(self as usize) ^ 1]
    }
}

#[inline]
const fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | ((reg & 7) << 3) | (rm & 7)
}

#[inline]
const fn fits_i8(v: i32) -> bool {
    v >= i8::MIN as i32 && v <= i8::MAX as i32
}

/// Legacy prefix, REX and opcode bytes. `reg`, `index` and `base` are
/// full 4-bit register numbers (0 where unused).
fn emit_prefixes(buf: &mut CodeBuffer, op: Opcode, reg: u8, index: u8, base: u8, byte_regs: bool) {
    if op.word {
        buf.emit_u8(0x66);
    }
    let rex = (u8::from(op.wide) << 3) | ((reg >> 3) << 2) | ((index >> 3) << 1) | (base >> 3);
    if rex != 0 || (op.byte && byte_regs) {
        buf.emit_u8(0x40 | rex);
    }
    if op.escaped {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(op.code);
}

fn encode(buf: &mut CodeBuffer, op: Opcode, reg: u8, rm: Rm) {
    match rm {
        Rm::Reg(r) => {
            let byte_regs = (4..8).contains(&reg) || (4..8).contains(&(r as u8));
            emit_prefixes(buf, op, reg, 0, r as u8, byte_regs);
            buf.emit_u8(modrm(0b11, reg, r.low3()));
        }
        Rm::Mem { base, index, disp } => {
            let index_num = index.map_or(0, |(i, _)| i as u8);
            emit_prefixes(buf, op, reg, index_num, base as u8, (4..8).contains(&reg));

            // RBP/R13 have no disp-less form; RSP/R12 always need a SIB.
            let mode = if disp == 0 && base.low3() != 5 {
                0b00
            } else if fits_i8(disp) {
                0b01
            } else {
                0b10
            };
            let sib = index.is_some() || base.low3() == 4;
            buf.emit_u8(modrm(mode, reg, if sib { 4 } else { base.low3() }));
            if sib {
                let (idx, scale) = index.map_or((4, 0), |(i, s)| (i.low3(), s));
                buf.emit_u8((scale << 6) | (idx << 3) | base.low3());
            }
            match mode {
                0b01 => buf.emit_u8(disp as u8),
                0b10 => buf.emit_u32(disp as u32),
                _ => {}
            }
        }
    }
}

/// Opcodes with the register folded into the low three bits
/// (push, pop, mov r, imm).
fn encode_short(buf: &mut CodeBuffer, op: Opcode, reg: Reg) {
    emit_prefixes(buf, op.plus(reg.low3()), 0, 0, reg as u8, false);
}

fn emit_group1_imm(buf: &mut CodeBuffer, op: ArithOp, wide: bool, rm: Rm, imm: i32) {
    let digit = op as u8;
    if fits_i8(imm) {
        encode(buf, GRP1_IMM8.w(wide), digit, rm);
        buf.emit_u8(imm as u8);
    } else {
        encode(buf, GRP1_IMM32.w(wide), digit, rm);
        buf.emit_u32(imm as u32);
    }
}

// -- ALU --

/// `op dst, src`.
pub fn emit_arith_rr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, src: Reg) {
    encode(buf, op.reg_form().w(rexw), dst as u8, Rm::Reg(src));
}

/// `op dst, imm`, imm8 form when it fits.
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, imm: i32) {
    emit_group1_imm(buf, op, rexw, Rm::Reg(dst), imm);
}

/// `op dst, [base + offset]`.
pub fn emit_arith_rm(
    buf: &mut CodeBuffer,
    op: ArithOp,
    rexw: bool,
    dst: Reg,
    base: Reg,
    offset: i32,
) {
    encode(buf, op.reg_form().w(rexw), dst as u8, Rm::at(base, offset));
}

/// `op [base + offset], imm`.
pub fn emit_arith_mi(
    buf: &mut CodeBuffer,
    op: ArithOp,
    rexw: bool,
    base: Reg,
    offset: i32,
    imm: i32,
) {
    emit_group1_imm(buf, op, rexw, Rm::at(base, offset), imm);
}

pub fn emit_neg(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    encode(buf, GRP3.w(rexw), GRP3_NEG, Rm::Reg(reg));
}

pub fn emit_test_rr(buf: &mut CodeBuffer, rexw: bool, a: Reg, b: Reg) {
    encode(buf, Opcode::one(0x85).w(rexw), a as u8, Rm::Reg(b));
}

pub fn emit_shift_ri(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg, imm: u8) {
    if imm == 1 {
        encode(buf, GRP2_ONE.w(rexw), op as u8, Rm::Reg(dst));
    } else {
        encode(buf, GRP2_IMM8.w(rexw), op as u8, Rm::Reg(dst));
        buf.emit_u8(imm);
    }
}

/// Shift by CL.
pub fn emit_shift_cl(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg) {
    encode(buf, GRP2_CL.w(rexw), op as u8, Rm::Reg(dst));
}

// -- Moves --

pub fn emit_mov_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    encode(buf, MOV_STORE.w(rexw), src as u8, Rm::Reg(dst));
}

/// `mov reg, val` in its shortest encoding.
///
/// Zero is materialized with XOR, which clobbers the flags.
pub fn emit_mov_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, val: u64) {
    if val == 0 {
        emit_arith_rr(buf, ArithOp::Xor, false, reg, reg);
    } else if !rexw || val <= u32::MAX as u64 {
        encode_short(buf, Opcode::one(0xB8), reg);
        buf.emit_u32(val as u32);
    } else if i32::try_from(val as i64).is_ok() {
        encode(buf, MOV_IMM.w(true), 0, Rm::Reg(reg));
        buf.emit_u32(val as u32);
    } else {
        emit_mov_ri64(buf, reg, val);
    }
}

/// 10-byte `movabs reg, imm64`; leaves the flags intact.
pub fn emit_mov_ri64(buf: &mut CodeBuffer, reg: Reg, val: u64) {
    encode_short(buf, Opcode::one(0xB8).w(true), reg);
    buf.emit_u64(val);
}

/// `movsx`/`movsxd`/`movzx dst, src`.
pub fn emit_extend(buf: &mut CodeBuffer, ext: Extend, dst: Reg, src: Reg) {
    encode(buf, ext.opcode(), dst as u8, Rm::Reg(src));
}

// -- Memory --

pub fn emit_load(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    encode(buf, MOV_LOAD.w(rexw), dst as u8, Rm::at(base, offset));
}

/// Extending load from `[base + offset]`.
pub fn emit_load_ext(buf: &mut CodeBuffer, ext: Extend, dst: Reg, base: Reg, offset: i32) {
    encode(buf, ext.opcode(), dst as u8, Rm::at(base, offset));
}

pub fn emit_store(buf: &mut CodeBuffer, rexw: bool, src: Reg, base: Reg, offset: i32) {
    encode(buf, MOV_STORE.w(rexw), src as u8, Rm::at(base, offset));
}

pub fn emit_store_word(buf: &mut CodeBuffer, src: Reg, base: Reg, offset: i32) {
    encode(buf, MOV_STORE.o16(), src as u8, Rm::at(base, offset));
}

pub fn emit_store_byte(buf: &mut CodeBuffer, src: Reg, base: Reg, offset: i32) {
    encode(buf, Opcode::one(0x88).b(), src as u8, Rm::at(base, offset));
}

/// `mov [base + offset], imm32`; sign-extended to 64 bits when `rexw`.
pub fn emit_store_imm(buf: &mut CodeBuffer, rexw: bool, base: Reg, offset: i32, imm: i32) {
    encode(buf, MOV_IMM.w(rexw), 0, Rm::at(base, offset));
    buf.emit_u32(imm as u32);
}

/// `mov dst, [base + index << shift + offset]`.
pub fn emit_load_sib(
    buf: &mut CodeBuffer,
    rexw: bool,
    dst: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    let rm = Rm::Mem {
        base,
        index: Some((index, shift)),
        disp: offset,
    };
    encode(buf, MOV_LOAD.w(rexw), dst as u8, rm);
}

/// `mov [base + index << shift + offset], src`.
pub fn emit_store_sib(
    buf: &mut CodeBuffer,
    rexw: bool,
    src: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    let rm = Rm::Mem {
        base,
        index: Some((index, shift)),
        disp: offset,
    };
    encode(buf, MOV_STORE.w(rexw), src as u8, rm);
}

// -- Multiply / divide --

/// Unsigned widening multiply: RDX:RAX = RAX * reg.
pub fn emit_mul(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    encode(buf, GRP3.w(rexw), GRP3_MUL, Rm::Reg(reg));
}

/// Signed widening multiply: RDX:RAX = RAX * reg.
pub fn emit_imul1(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    encode(buf, GRP3.w(rexw), GRP3_IMUL, Rm::Reg(reg));
}

pub fn emit_imul_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    encode(buf, Opcode::two(0xAF).w(rexw), dst as u8, Rm::Reg(src));
}

pub fn emit_div(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    encode(buf, GRP3.w(rexw), GRP3_DIV, Rm::Reg(reg));
}

pub fn emit_idiv(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    encode(buf, GRP3.w(rexw), GRP3_IDIV, Rm::Reg(reg));
}

/// EAX into EDX:EAX.
pub fn emit_cdq(buf: &mut CodeBuffer) {
    buf.emit_u8(0x99);
}

/// RAX into RDX:RAX.
pub fn emit_cqo(buf: &mut CodeBuffer) {
    buf.emit_u8(0x48);
    buf.emit_u8(0x99);
}

// -- Control flow --

/// `jcc rel32` to `label`, patched by `resolve_links`.
pub fn emit_jcc(buf: &mut CodeBuffer, cond: X86Cond, label: Label) {
    buf.emit_u8(0x0F);
    buf.emit_u8(0x80 + cond as u8);
    buf.emit_label_ref(label, RelocKind::Rel32);
}

pub fn emit_jmp(buf: &mut CodeBuffer, label: Label) {
    buf.emit_u8(0xE9);
    buf.emit_label_ref(label, RelocKind::Rel32);
}

pub fn emit_jmp_reg(buf: &mut CodeBuffer, reg: Reg) {
    encode(buf, GRP5, GRP5_JMP, Rm::Reg(reg));
}

pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    encode(buf, GRP5, GRP5_CALL, Rm::Reg(reg));
}

/// `setcc dst8`.
pub fn emit_setcc(buf: &mut CodeBuffer, cond: X86Cond, dst: Reg) {
    encode(buf, Opcode::two(0x90).plus(cond as u8).b(), 0, Rm::Reg(dst));
}

pub fn emit_cmovcc(buf: &mut CodeBuffer, cond: X86Cond, rexw: bool, dst: Reg, src: Reg) {
    encode(buf, Opcode::two(0x40).plus(cond as u8).w(rexw), dst as u8, Rm::Reg(src));
}

pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    encode_short(buf, Opcode::one(0x50), reg);
}

pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    encode_short(buf, Opcode::one(0x58), reg);
}

pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(0xC3);
}
