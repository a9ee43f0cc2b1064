//! RV64 instruction decoder.
//!
//! Covers RV64I, M, A, F, D and Zicsr.
//! Compressed (16-bit) encodings are reported as `Invalid`.

use dbt_core::{GuestInstruction, GuestReg, Mnemonic, OpClass};

// Major opcodes (bits 6:0).
const OP_LOAD: u32 = 0x03;
const OP_LOAD_FP: u32 = 0x07;
const OP_MISC_MEM: u32 = 0x0f;
const OP_IMM: u32 = 0x13;
const OP_AUIPC: u32 = 0x17;
const OP_IMM_32: u32 = 0x1b;
const OP_STORE: u32 = 0x23;
const OP_STORE_FP: u32 = 0x27;
const OP_AMO: u32 = 0x2f;
const OP_REG: u32 = 0x33;
const OP_LUI: u32 = 0x37;
const OP_REG_32: u32 = 0x3b;
const OP_MADD: u32 = 0x43;
const OP_MSUB: u32 = 0x47;
const OP_NMSUB: u32 = 0x4b;
const OP_NMADD: u32 = 0x4f;
const OP_FP: u32 = 0x53;
const OP_BRANCH: u32 = 0x63;
const OP_JALR: u32 = 0x67;
const OP_JAL: u32 = 0x6f;
const OP_SYSTEM: u32 = 0x73;

const RAW_ECALL: u32 = 0x0000_0073;
const RAW_EBREAK: u32 = 0x0010_0073;

// ── Field extraction ───────────────────────────────────────────

#[inline]
fn rd(raw: u32) -> GuestReg {
    GuestReg::from_field(raw >> 7)
}

#[inline]
fn rs1(raw: u32) -> GuestReg {
    GuestReg::from_field(raw >> 15)
}

#[inline]
fn rs2(raw: u32) -> GuestReg {
    GuestReg::from_field(raw >> 20)
}

#[inline]
fn funct3(raw: u32) -> u32 {
    (raw >> 12) & 0x7
}

#[inline]
fn funct7(raw: u32) -> u32 {
    raw >> 25
}

fn imm_i(raw: u32) -> i64 {
    ((raw as i32) >> 20) as i64
}

fn imm_s(raw: u32) -> i64 {
    ((((raw as i32) >> 25) << 5) | ((raw >> 7) & 0x1f) as i32) as i64
}

fn imm_b(raw: u32) -> i64 {
    let sign = ((raw as i32) >> 31) << 12;
    let b11 = ((raw >> 7) & 1) << 11;
    let b10_5 = ((raw >> 25) & 0x3f) << 5;
    let b4_1 = ((raw >> 8) & 0xf) << 1;
    (sign | (b11 | b10_5 | b4_1) as i32) as i64
}

fn imm_u(raw: u32) -> i64 {
    ((raw & 0xffff_f000) as i32) as i64
}

fn imm_j(raw: u32) -> i64 {
    let sign = ((raw as i32) >> 31) << 20;
    let b19_12 = raw & 0x000f_f000;
    let b11 = ((raw >> 20) & 1) << 11;
    let b10_1 = ((raw >> 21) & 0x3ff) << 1;
    (sign | (b19_12 | b11 | b10_1) as i32) as i64
}

// ── Format builders ────────────────────────────────────────────

fn r_type(addr: u64, raw: u32, mnem: Mnemonic, class: OpClass) -> GuestInstruction {
    GuestInstruction {
        rd: rd(raw),
        rs1: rs1(raw),
        rs2: rs2(raw),
        ..GuestInstruction::new(addr, mnem, class, raw)
    }
}

fn i_type(addr: u64, raw: u32, mnem: Mnemonic, class: OpClass, imm: i64) -> GuestInstruction {
    GuestInstruction {
        rd: rd(raw),
        rs1: rs1(raw),
        imm,
        ..GuestInstruction::new(addr, mnem, class, raw)
    }
}

fn s_type(addr: u64, raw: u32, mnem: Mnemonic, class: OpClass, imm: i64) -> GuestInstruction {
    GuestInstruction {
        rs1: rs1(raw),
        rs2: rs2(raw),
        imm,
        ..GuestInstruction::new(addr, mnem, class, raw)
    }
}

fn u_type(addr: u64, raw: u32, mnem: Mnemonic, class: OpClass, imm: i64) -> GuestInstruction {
    GuestInstruction {
        rd: rd(raw),
        imm,
        ..GuestInstruction::new(addr, mnem, class, raw)
    }
}

fn bare(addr: u64, raw: u32, mnem: Mnemonic, class: OpClass) -> GuestInstruction {
    GuestInstruction::new(addr, mnem, class, raw)
}

fn invalid(addr: u64, raw: u32) -> GuestInstruction {
    bare(addr, raw, Mnemonic::Invalid, OpClass::Invalid)
}

// ── Decoder ────────────────────────────────────────────────────

/// Decode the instruction word `raw` located at guest address `addr`.
///
/// Never fails: words outside the supported encoding space decode
/// to `Mnemonic::Invalid`, which the codec rejects at emission time.
pub fn decode(addr: u64, raw: u32) -> GuestInstruction {
    if raw & 0x3 != 0x3 {
        return invalid(addr, raw);
    }
    match raw & 0x7f {
        OP_LUI => u_type(addr, raw, Mnemonic::Lui, OpClass::UpperImmediate, imm_u(raw)),
        OP_AUIPC => u_type(addr, raw, Mnemonic::Auipc, OpClass::UpperImmediate, imm_u(raw)),
        OP_JAL => u_type(addr, raw, Mnemonic::Jal, OpClass::Jump, imm_j(raw)),
        OP_JALR if funct3(raw) == 0 => {
            i_type(addr, raw, Mnemonic::Jalr, OpClass::Jump, imm_i(raw))
        }
        OP_BRANCH => decode_branch(addr, raw),
        OP_LOAD => decode_load(addr, raw),
        OP_STORE => decode_store(addr, raw),
        OP_IMM => decode_op_imm(addr, raw),
        OP_IMM_32 => decode_op_imm_32(addr, raw),
        OP_REG => decode_op(addr, raw),
        OP_REG_32 => decode_op_32(addr, raw),
        OP_AMO => decode_amo(addr, raw),
        OP_MISC_MEM => match funct3(raw) {
            0 => bare(addr, raw, Mnemonic::Fence, OpClass::Fence),
            1 => bare(addr, raw, Mnemonic::FenceI, OpClass::Fence),
            _ => invalid(addr, raw),
        },
        OP_SYSTEM => decode_system(addr, raw),
        OP_LOAD_FP => decode_load_fp(addr, raw),
        OP_STORE_FP => decode_store_fp(addr, raw),
        OP_MADD | OP_MSUB | OP_NMSUB | OP_NMADD => decode_fused(addr, raw),
        OP_FP => decode_op_fp(addr, raw),
        _ => invalid(addr, raw),
    }
}

fn decode_branch(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match funct3(raw) {
        0 => Mnemonic::Beq,
        1 => Mnemonic::Bne,
        4 => Mnemonic::Blt,
        5 => Mnemonic::Bge,
        6 => Mnemonic::Bltu,
        7 => Mnemonic::Bgeu,
        _ => return invalid(addr, raw),
    };
    s_type(addr, raw, mnem, OpClass::Branch, imm_b(raw))
}

fn decode_load(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match funct3(raw) {
        0 => Mnemonic::Lb,
        1 => Mnemonic::Lh,
        2 => Mnemonic::Lw,
        3 => Mnemonic::Ld,
        4 => Mnemonic::Lbu,
        5 => Mnemonic::Lhu,
        6 => Mnemonic::Lwu,
        _ => return invalid(addr, raw),
    };
    i_type(addr, raw, mnem, OpClass::Load, imm_i(raw))
}

fn decode_store(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match funct3(raw) {
        0 => Mnemonic::Sb,
        1 => Mnemonic::Sh,
        2 => Mnemonic::Sw,
        3 => Mnemonic::Sd,
        _ => return invalid(addr, raw),
    };
    s_type(addr, raw, mnem, OpClass::Store, imm_s(raw))
}

fn decode_op_imm(addr: u64, raw: u32) -> GuestInstruction {
    // RV64 shifts carry a 6-bit shamt; funct6 selects the variant.
    let shamt = ((raw >> 20) & 0x3f) as i64;
    let funct6 = raw >> 26;
    let (mnem, imm) = match (funct3(raw), funct6) {
        (0, _) => (Mnemonic::Addi, imm_i(raw)),
        (2, _) => (Mnemonic::Slti, imm_i(raw)),
        (3, _) => (Mnemonic::Sltiu, imm_i(raw)),
        (4, _) => (Mnemonic::Xori, imm_i(raw)),
        (6, _) => (Mnemonic::Ori, imm_i(raw)),
        (7, _) => (Mnemonic::Andi, imm_i(raw)),
        (1, 0x00) => (Mnemonic::Slli, shamt),
        (5, 0x00) => (Mnemonic::Srli, shamt),
        (5, 0x10) => (Mnemonic::Srai, shamt),
        _ => return invalid(addr, raw),
    };
    i_type(addr, raw, mnem, OpClass::Immediate, imm)
}

fn decode_op_imm_32(addr: u64, raw: u32) -> GuestInstruction {
    let shamt = ((raw >> 20) & 0x1f) as i64;
    let (mnem, imm) = match (funct3(raw), funct7(raw)) {
        (0, _) => (Mnemonic::Addiw, imm_i(raw)),
        (1, 0x00) => (Mnemonic::Slliw, shamt),
        (5, 0x00) => (Mnemonic::Srliw, shamt),
        (5, 0x20) => (Mnemonic::Sraiw, shamt),
        _ => return invalid(addr, raw),
    };
    i_type(addr, raw, mnem, OpClass::Immediate, imm)
}

fn decode_op(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match (funct7(raw), funct3(raw)) {
        (0x00, 0) => Mnemonic::Add,
        (0x20, 0) => Mnemonic::Sub,
        (0x00, 1) => Mnemonic::Sll,
        (0x00, 2) => Mnemonic::Slt,
        (0x00, 3) => Mnemonic::Sltu,
        (0x00, 4) => Mnemonic::Xor,
        (0x00, 5) => Mnemonic::Srl,
        (0x20, 5) => Mnemonic::Sra,
        (0x00, 6) => Mnemonic::Or,
        (0x00, 7) => Mnemonic::And,
        (0x01, 0) => Mnemonic::Mul,
        (0x01, 1) => Mnemonic::Mulh,
        (0x01, 2) => Mnemonic::Mulhsu,
        (0x01, 3) => Mnemonic::Mulhu,
        (0x01, 4) => Mnemonic::Div,
        (0x01, 5) => Mnemonic::Divu,
        (0x01, 6) => Mnemonic::Rem,
        (0x01, 7) => Mnemonic::Remu,
        _ => return invalid(addr, raw),
    };
    r_type(addr, raw, mnem, OpClass::Register)
}

fn decode_op_32(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match (funct7(raw), funct3(raw)) {
        (0x00, 0) => Mnemonic::Addw,
        (0x20, 0) => Mnemonic::Subw,
        (0x00, 1) => Mnemonic::Sllw,
        (0x00, 5) => Mnemonic::Srlw,
        (0x20, 5) => Mnemonic::Sraw,
        (0x01, 0) => Mnemonic::Mulw,
        (0x01, 4) => Mnemonic::Divw,
        (0x01, 5) => Mnemonic::Divuw,
        (0x01, 6) => Mnemonic::Remw,
        (0x01, 7) => Mnemonic::Remuw,
        _ => return invalid(addr, raw),
    };
    r_type(addr, raw, mnem, OpClass::Register)
}

fn decode_amo(addr: u64, raw: u32) -> GuestInstruction {
    use Mnemonic::*;

    // funct5 in bits 31:27; aq/rl (bits 26:25) are ignored.
    let funct5 = raw >> 27;
    let mnem = match (funct3(raw), funct5) {
        (2, 0x02) if rs2(raw).is_zero() => LrW,
        (2, 0x03) => ScW,
        (2, 0x01) => AmoswapW,
        (2, 0x00) => AmoaddW,
        (2, 0x04) => AmoxorW,
        (2, 0x0c) => AmoandW,
        (2, 0x08) => AmoorW,
        (2, 0x10) => AmominW,
        (2, 0x14) => AmomaxW,
        (2, 0x18) => AmominuW,
        (2, 0x1c) => AmomaxuW,
        (3, 0x02) if rs2(raw).is_zero() => LrD,
        (3, 0x03) => ScD,
        (3, 0x01) => AmoswapD,
        (3, 0x00) => AmoaddD,
        (3, 0x04) => AmoxorD,
        (3, 0x0c) => AmoandD,
        (3, 0x08) => AmoorD,
        (3, 0x10) => AmominD,
        (3, 0x14) => AmomaxD,
        (3, 0x18) => AmominuD,
        (3, 0x1c) => AmomaxuD,
        _ => return invalid(addr, raw),
    };
    r_type(addr, raw, mnem, OpClass::Atomic)
}

fn decode_system(addr: u64, raw: u32) -> GuestInstruction {
    let csr = ((raw >> 20) & 0xfff) as i64;
    match funct3(raw) {
        0 => match raw {
            RAW_ECALL => bare(addr, raw, Mnemonic::Ecall, OpClass::System),
            RAW_EBREAK => bare(addr, raw, Mnemonic::Ebreak, OpClass::System),
            _ => invalid(addr, raw),
        },
        1 => i_type(addr, raw, Mnemonic::Csrrw, OpClass::Csr, csr),
        2 => i_type(addr, raw, Mnemonic::Csrrs, OpClass::Csr, csr),
        3 => i_type(addr, raw, Mnemonic::Csrrc, OpClass::Csr, csr),
        // The rs1 field holds a 5-bit immediate here, not a register.
        5 => u_type(addr, raw, Mnemonic::Csrrwi, OpClass::Csr, csr),
        6 => u_type(addr, raw, Mnemonic::Csrrsi, OpClass::Csr, csr),
        7 => u_type(addr, raw, Mnemonic::Csrrci, OpClass::Csr, csr),
        _ => invalid(addr, raw),
    }
}

// ── F/D ────────────────────────────────────────────────────────

fn decode_load_fp(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match funct3(raw) {
        2 => Mnemonic::Flw,
        3 => Mnemonic::Fld,
        _ => return invalid(addr, raw),
    };
    GuestInstruction {
        rs1: rs1(raw),
        imm: imm_i(raw),
        ..bare(addr, raw, mnem, OpClass::Float)
    }
}

fn decode_store_fp(addr: u64, raw: u32) -> GuestInstruction {
    let mnem = match funct3(raw) {
        2 => Mnemonic::Fsw,
        3 => Mnemonic::Fsd,
        _ => return invalid(addr, raw),
    };
    GuestInstruction {
        rs1: rs1(raw),
        imm: imm_s(raw),
        ..bare(addr, raw, mnem, OpClass::Float)
    }
}

/// Operand format of bits 26:25: `Some(false)` single, `Some(true)` double.
fn fp_double(raw: u32) -> Option<bool> {
    match (raw >> 25) & 0x3 {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

fn decode_fused(addr: u64, raw: u32) -> GuestInstruction {
    use Mnemonic::*;

    let Some(double) = fp_double(raw) else {
        return invalid(addr, raw);
    };
    let mnem = match (raw & 0x7f, double) {
        (OP_MADD, false) => FmaddS,
        (OP_MSUB, false) => FmsubS,
        (OP_NMSUB, false) => FnmsubS,
        (OP_NMADD, false) => FnmaddS,
        (OP_MADD, true) => FmaddD,
        (OP_MSUB, true) => FmsubD,
        (OP_NMSUB, true) => FnmsubD,
        _ => FnmaddD,
    };
    bare(addr, raw, mnem, OpClass::Float)
}

/// Which operand of an OP-FP instruction is an integer register.
enum IntOperand {
    None,
    Dest,
    Source,
}

fn decode_op_fp(addr: u64, raw: u32) -> GuestInstruction {
    use Mnemonic::*;

    let Some(double) = fp_double(raw) else {
        return invalid(addr, raw);
    };
    let pick = |single: Mnemonic, dbl: Mnemonic| if double { dbl } else { single };
    let funct5 = raw >> 27;
    let rs2_field = (raw >> 20) & 0x1f;

    let (mnem, int) = match (funct5, funct3(raw), rs2_field) {
        (0x00, _, _) => (pick(FaddS, FaddD), IntOperand::None),
        (0x01, _, _) => (pick(FsubS, FsubD), IntOperand::None),
        (0x02, _, _) => (pick(FmulS, FmulD), IntOperand::None),
        (0x03, _, _) => (pick(FdivS, FdivD), IntOperand::None),
        (0x0b, _, 0) => (pick(FsqrtS, FsqrtD), IntOperand::None),
        (0x04, 0, _) => (pick(FsgnjS, FsgnjD), IntOperand::None),
        (0x04, 1, _) => (pick(FsgnjnS, FsgnjnD), IntOperand::None),
        (0x04, 2, _) => (pick(FsgnjxS, FsgnjxD), IntOperand::None),
        (0x05, 0, _) => (pick(FminS, FminD), IntOperand::None),
        (0x05, 1, _) => (pick(FmaxS, FmaxD), IntOperand::None),
        (0x08, _, 1) if !double => (FcvtSD, IntOperand::None),
        (0x08, _, 0) if double => (FcvtDS, IntOperand::None),
        (0x14, 2, _) => (pick(FeqS, FeqD), IntOperand::Dest),
        (0x14, 1, _) => (pick(FltS, FltD), IntOperand::Dest),
        (0x14, 0, _) => (pick(FleS, FleD), IntOperand::Dest),
        (0x18, _, 0) => (pick(FcvtWS, FcvtWD), IntOperand::Dest),
        (0x18, _, 1) => (pick(FcvtWuS, FcvtWuD), IntOperand::Dest),
        (0x18, _, 2) => (pick(FcvtLS, FcvtLD), IntOperand::Dest),
        (0x18, _, 3) => (pick(FcvtLuS, FcvtLuD), IntOperand::Dest),
        (0x1a, _, 0) => (pick(FcvtSW, FcvtDW), IntOperand::Source),
        (0x1a, _, 1) => (pick(FcvtSWu, FcvtDWu), IntOperand::Source),
        (0x1a, _, 2) => (pick(FcvtSL, FcvtDL), IntOperand::Source),
        (0x1a, _, 3) => (pick(FcvtSLu, FcvtDLu), IntOperand::Source),
        (0x1c, 0, 0) => (pick(FmvXW, FmvXD), IntOperand::Dest),
        (0x1c, 1, 0) => (pick(FclassS, FclassD), IntOperand::Dest),
        (0x1e, 0, 0) => (pick(FmvWX, FmvDX), IntOperand::Source),
        _ => return invalid(addr, raw),
    };
    let insn = bare(addr, raw, mnem, OpClass::Float);
    match int {
        IntOperand::None => insn,
        IntOperand::Dest => GuestInstruction { rd: rd(raw), ..insn },
        IntOperand::Source => GuestInstruction { rs1: rs1(raw), ..insn },
    }
}
