//! RISC-V instruction word encoders and in-memory guest images.

#![allow(dead_code)]

// ── Format encoders ───────────────────────────────────────────

pub fn rv_r(f7: u32, rs2: u32, rs1: u32, f3: u32, rd: u32, op: u32) -> u32 {
    (f7 << 25) | (rs2 << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | op
}

pub fn rv_i(imm: i32, rs1: u32, f3: u32, rd: u32, op: u32) -> u32 {
    let imm = (imm as u32) & 0xFFF;
    (imm << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | op
}

pub fn rv_s(imm: i32, rs2: u32, rs1: u32, f3: u32) -> u32 {
    let i = imm as u32;
    ((i >> 5 & 0x7F) << 25) | (rs2 << 20) | (rs1 << 15) | (f3 << 12) | ((i & 0x1F) << 7) | 0b0100011
}

pub fn rv_u(imm: i32, rd: u32, op: u32) -> u32 {
    ((imm as u32) & 0xFFFF_F000) | (rd << 7) | op
}

pub fn rv_b(imm: i32, rs2: u32, rs1: u32, f3: u32) -> u32 {
    let i = imm as u32;
    let b12 = (i >> 12) & 1;
    let b11 = (i >> 11) & 1;
    let b10_5 = (i >> 5) & 0x3F;
    let b4_1 = (i >> 1) & 0xF;
    (b12 << 31)
        | (b10_5 << 25)
        | (rs2 << 20)
        | (rs1 << 15)
        | (f3 << 12)
        | (b4_1 << 8)
        | (b11 << 7)
        | 0b1100011
}

pub fn rv_j(imm: i32, rd: u32) -> u32 {
    let i = imm as u32;
    let b20 = (i >> 20) & 1;
    let b10_1 = (i >> 1) & 0x3FF;
    let b11 = (i >> 11) & 1;
    let b19_12 = (i >> 12) & 0xFF;
    (b20 << 31) | (b10_1 << 21) | (b11 << 20) | (b19_12 << 12) | (rd << 7) | 0b1101111
}

// ── Registers ─────────────────────────────────────────────────

pub const ZERO: u32 = 0;
pub const RA: u32 = 1;
pub const SP: u32 = 2;
pub const T0: u32 = 5;
pub const T1: u32 = 6;
pub const T2: u32 = 7;
pub const S0: u32 = 8;
pub const S1: u32 = 9;
pub const A0: u32 = 10;
pub const A1: u32 = 11;
pub const A2: u32 = 12;
pub const A3: u32 = 13;
pub const A4: u32 = 14;
pub const A5: u32 = 15;
pub const A6: u32 = 16;
pub const A7: u32 = 17;
pub const S2: u32 = 18;
pub const S3: u32 = 19;

// ── Instructions ──────────────────────────────────────────────

const OP_LUI: u32 = 0b0110111;
const OP_AUIPC: u32 = 0b0010111;
const OP_IMM: u32 = 0b0010011;
const OP_REG: u32 = 0b0110011;
const OP_IMM32: u32 = 0b0011011;
const OP_REG32: u32 = 0b0111011;
const OP_LOAD: u32 = 0b0000011;
const OP_AMO: u32 = 0b0101111;
const M_EXT: u32 = 0b0000001;

pub fn lui(rd: u32, imm: i32) -> u32 {
    rv_u(imm, rd, OP_LUI)
}
pub fn auipc(rd: u32, imm: i32) -> u32 {
    rv_u(imm, rd, OP_AUIPC)
}
pub fn jal(rd: u32, imm: i32) -> u32 {
    rv_j(imm, rd)
}
pub fn jalr(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b000, rd, 0b1100111)
}
pub fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
    rv_b(imm, rs2, rs1, 0b000)
}
pub fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
    rv_b(imm, rs2, rs1, 0b001)
}
pub fn blt(rs1: u32, rs2: u32, imm: i32) -> u32 {
    rv_b(imm, rs2, rs1, 0b100)
}
pub fn bgeu(rs1: u32, rs2: u32, imm: i32) -> u32 {
    rv_b(imm, rs2, rs1, 0b111)
}
pub fn lb(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b000, rd, OP_LOAD)
}
pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b010, rd, OP_LOAD)
}
pub fn ld(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b011, rd, OP_LOAD)
}
pub fn lbu(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b100, rd, OP_LOAD)
}
pub fn lwu(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b110, rd, OP_LOAD)
}
pub fn sb(rs2: u32, rs1: u32, imm: i32) -> u32 {
    rv_s(imm, rs2, rs1, 0b000)
}
pub fn sw(rs2: u32, rs1: u32, imm: i32) -> u32 {
    rv_s(imm, rs2, rs1, 0b010)
}
pub fn sd(rs2: u32, rs1: u32, imm: i32) -> u32 {
    rv_s(imm, rs2, rs1, 0b011)
}
pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b000, rd, OP_IMM)
}
pub fn slti(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b010, rd, OP_IMM)
}
pub fn sltiu(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b011, rd, OP_IMM)
}
pub fn xori(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b100, rd, OP_IMM)
}
pub fn andi(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b111, rd, OP_IMM)
}
pub fn slli(rd: u32, rs1: u32, sh: u32) -> u32 {
    rv_i(sh as i32, rs1, 0b001, rd, OP_IMM)
}
pub fn srli(rd: u32, rs1: u32, sh: u32) -> u32 {
    rv_i(sh as i32, rs1, 0b101, rd, OP_IMM)
}
pub fn srai(rd: u32, rs1: u32, sh: u32) -> u32 {
    rv_i((0b010000 << 6 | sh) as i32, rs1, 0b101, rd, OP_IMM)
}
pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0, rs2, rs1, 0b000, rd, OP_REG)
}
pub fn sub(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0b0100000, rs2, rs1, 0b000, rd, OP_REG)
}
pub fn sll(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0, rs2, rs1, 0b001, rd, OP_REG)
}
pub fn slt(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0, rs2, rs1, 0b010, rd, OP_REG)
}
pub fn sltu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0, rs2, rs1, 0b011, rd, OP_REG)
}
pub fn sra(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0b0100000, rs2, rs1, 0b101, rd, OP_REG)
}
pub fn addiw(rd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b000, rd, OP_IMM32)
}
pub fn addw(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0, rs2, rs1, 0b000, rd, OP_REG32)
}
pub fn sllw(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0, rs2, rs1, 0b001, rd, OP_REG32)
}
pub fn sraw(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(0b0100000, rs2, rs1, 0b101, rd, OP_REG32)
}
pub fn mul(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b000, rd, OP_REG)
}
pub fn mulh(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b001, rd, OP_REG)
}
pub fn mulhsu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b010, rd, OP_REG)
}
pub fn mulhu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b011, rd, OP_REG)
}
pub fn div(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b100, rd, OP_REG)
}
pub fn divu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b101, rd, OP_REG)
}
pub fn rem(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b110, rd, OP_REG)
}
pub fn remu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b111, rd, OP_REG)
}
pub fn divw(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b100, rd, OP_REG32)
}
pub fn remw(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(M_EXT, rs2, rs1, 0b110, rd, OP_REG32)
}
fn amo(f5: u32, f3: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    rv_r(f5 << 2, rs2, rs1, f3, rd, OP_AMO)
}
pub fn lr_d(rd: u32, rs1: u32) -> u32 {
    amo(0b00010, 0b011, rd, rs1, 0)
}
pub fn sc_d(rd: u32, rs1: u32, rs2: u32) -> u32 {
    amo(0b00011, 0b011, rd, rs1, rs2)
}
pub fn amoadd_w(rd: u32, rs1: u32, rs2: u32) -> u32 {
    amo(0b00000, 0b010, rd, rs1, rs2)
}
pub fn amomax_d(rd: u32, rs1: u32, rs2: u32) -> u32 {
    amo(0b10100, 0b011, rd, rs1, rs2)
}
pub fn amominu_d(rd: u32, rs1: u32, rs2: u32) -> u32 {
    amo(0b11000, 0b011, rd, rs1, rs2)
}
pub fn amoswap_d(rd: u32, rs1: u32, rs2: u32) -> u32 {
    amo(0b00001, 0b011, rd, rs1, rs2)
}

// ── Zicsr ─────────────────────────────────────────────────────

const OP_SYSTEM: u32 = 0b1110011;
pub const CSR_FFLAGS: u32 = 0x001;
pub const CSR_FRM: u32 = 0x002;
pub const CSR_FCSR: u32 = 0x003;
pub const CSR_CYCLE: u32 = 0xc00;
pub const CSR_TIME: u32 = 0xc01;
pub const CSR_INSTRET: u32 = 0xc02;

pub fn csrrw(rd: u32, csr: u32, rs1: u32) -> u32 {
    rv_i(csr as i32, rs1, 0b001, rd, OP_SYSTEM)
}
pub fn csrrs(rd: u32, csr: u32, rs1: u32) -> u32 {
    rv_i(csr as i32, rs1, 0b010, rd, OP_SYSTEM)
}
pub fn csrrc(rd: u32, csr: u32, rs1: u32) -> u32 {
    rv_i(csr as i32, rs1, 0b011, rd, OP_SYSTEM)
}
pub fn csrrwi(rd: u32, csr: u32, zimm: u32) -> u32 {
    rv_i(csr as i32, zimm, 0b101, rd, OP_SYSTEM)
}
pub fn csrrsi(rd: u32, csr: u32, zimm: u32) -> u32 {
    rv_i(csr as i32, zimm, 0b110, rd, OP_SYSTEM)
}

// ── F/D ───────────────────────────────────────────────────────

const OP_LOAD_FP: u32 = 0b0000111;
const OP_STORE_FP: u32 = 0b0100111;
const OP_FP: u32 = 0b1010011;
const OP_MADD: u32 = 0b1000011;
pub const RM_RNE: u32 = 0;
pub const RM_RTZ: u32 = 1;
pub const RM_DYN: u32 = 7;

pub fn flw(fd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b010, fd, OP_LOAD_FP)
}
pub fn fld(fd: u32, rs1: u32, imm: i32) -> u32 {
    rv_i(imm, rs1, 0b011, fd, OP_LOAD_FP)
}
pub fn fsw(fs2: u32, rs1: u32, imm: i32) -> u32 {
    (rv_s(imm, fs2, rs1, 0b010) & !0x7f) | OP_STORE_FP
}
pub fn fsd(fs2: u32, rs1: u32, imm: i32) -> u32 {
    (rv_s(imm, fs2, rs1, 0b011) & !0x7f) | OP_STORE_FP
}
fn op_fp(f7: u32, rs2: u32, rs1: u32, rm: u32, rd: u32) -> u32 {
    rv_r(f7, rs2, rs1, rm, rd, OP_FP)
}
pub fn fadd_s(fd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b0000000, fs2, fs1, RM_DYN, fd)
}
pub fn fadd_d(fd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b0000001, fs2, fs1, RM_DYN, fd)
}
pub fn fmul_d(fd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b0001001, fs2, fs1, RM_DYN, fd)
}
pub fn fdiv_d(fd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b0001101, fs2, fs1, RM_DYN, fd)
}
pub fn fsqrt_d(fd: u32, fs1: u32) -> u32 {
    op_fp(0b0101101, 0, fs1, RM_DYN, fd)
}
pub fn fsgnjn_d(fd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b0010001, fs2, fs1, 0b001, fd)
}
pub fn fmax_d(fd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b0010101, fs2, fs1, 0b001, fd)
}
pub fn feq_d(rd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b1010001, fs2, fs1, 0b010, rd)
}
pub fn flt_d(rd: u32, fs1: u32, fs2: u32) -> u32 {
    op_fp(0b1010001, fs2, fs1, 0b001, rd)
}
pub fn fclass_s(rd: u32, fs1: u32) -> u32 {
    op_fp(0b1110000, 0, fs1, 0b001, rd)
}
pub fn fcvt_l_d(rd: u32, fs1: u32, rm: u32) -> u32 {
    op_fp(0b1100001, 2, fs1, rm, rd)
}
pub fn fcvt_w_s(rd: u32, fs1: u32, rm: u32) -> u32 {
    op_fp(0b1100000, 0, fs1, rm, rd)
}
pub fn fcvt_d_l(fd: u32, rs1: u32) -> u32 {
    op_fp(0b1101001, 2, rs1, RM_DYN, fd)
}
pub fn fcvt_s_w(fd: u32, rs1: u32) -> u32 {
    op_fp(0b1101000, 0, rs1, RM_DYN, fd)
}
pub fn fcvt_d_s(fd: u32, fs1: u32) -> u32 {
    op_fp(0b0100001, 0, fs1, RM_RNE, fd)
}
pub fn fcvt_s_d(fd: u32, fs1: u32) -> u32 {
    op_fp(0b0100000, 1, fs1, RM_DYN, fd)
}
pub fn fmv_x_w(rd: u32, fs1: u32) -> u32 {
    op_fp(0b1110000, 0, fs1, 0, rd)
}
pub fn fmv_w_x(fd: u32, rs1: u32) -> u32 {
    op_fp(0b1111000, 0, rs1, 0, fd)
}
pub fn fmv_x_d(rd: u32, fs1: u32) -> u32 {
    op_fp(0b1110001, 0, fs1, 0, rd)
}
pub fn fmv_d_x(fd: u32, rs1: u32) -> u32 {
    op_fp(0b1111001, 0, rs1, 0, fd)
}
pub fn fmadd_d(fd: u32, fs1: u32, fs2: u32, fs3: u32) -> u32 {
    (fs3 << 27) | (0b01 << 25) | (fs2 << 20) | (fs1 << 15) | (RM_DYN << 12) | (fd << 7) | OP_MADD
}

/// Decodes as `Invalid`.
pub const INVALID_WORD: u32 = 0;

pub fn fence() -> u32 {
    0x0ff0_000f
}
pub fn ecall() -> u32 {
    0x0000_0073
}
pub fn ebreak() -> u32 {
    0x0010_0073
}

// ── Guest images ──────────────────────────────────────────────

/// Guest image: code at address 0, zero-filled up to `size` bytes.
pub fn image(code: &[u32], size: usize) -> Vec<u8> {
    let mut mem = vec![0u8; size.max(code.len() * 4)];
    for (i, word) in code.iter().enumerate() {
        mem[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    mem
}
