//! F and D extensions.
//!
//! Loads, stores and the bit-pattern moves are inline; everything that
//! rounds, compares or raises flags calls a helper from
//! [`crate::helper::fpu`]. f-registers always live in the register
//! file, never in host registers.

use dbt_core::{fpr_offset, GuestInstruction, Mnemonic, TranslateError};

use crate::emit::{imm32, BlockEmitter, HelperArg};
use crate::helper::fpu::{self, FpHelper, NAN_BOX};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{TMP0, TMP1, TMP2};

fn fd(insn: &GuestInstruction) -> u32 {
    (insn.raw >> 7) & 0x1f
}

fn fs1(insn: &GuestInstruction) -> u32 {
    (insn.raw >> 15) & 0x1f
}

fn fs2(insn: &GuestInstruction) -> u32 {
    (insn.raw >> 20) & 0x1f
}

fn fs3(insn: &GuestInstruction) -> u32 {
    insn.raw >> 27
}

/// Rounding-mode field.
fn rm(insn: &GuestInstruction) -> u64 {
    ((insn.raw >> 12) & 0x7) as u64
}

pub(super) fn gen_fp_load(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let disp = imm32(insn.imm)?;
    e.guest_address(insn.rs1, TMP1);
    let base = e.mapping().base();
    let buf = &mut e.buf;
    if insn.mnem == Mnemonic::Flw {
        emit_load(buf, false, TMP0, TMP1, disp);
        emit_mov_ri64(buf, TMP2, NAN_BOX);
        emit_arith_rr(buf, ArithOp::Or, true, TMP0, TMP2);
    } else {
        emit_load(buf, true, TMP0, TMP1, disp);
    }
    emit_store(buf, true, TMP0, base, fpr_offset(fd(insn)));
    Ok(())
}

pub(super) fn gen_fp_store(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let disp = imm32(insn.imm)?;
    e.guest_address(insn.rs1, TMP1);
    let base = e.mapping().base();
    let wide = insn.mnem == Mnemonic::Fsd;
    let buf = &mut e.buf;
    emit_load(buf, wide, TMP0, base, fpr_offset(fs2(insn)));
    emit_store(buf, wide, TMP0, TMP1, disp);
    Ok(())
}

/// FMV.X.W, FMV.W.X, FMV.X.D and FMV.D.X copy bits unchanged.
pub(super) fn gen_fp_move(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let base = e.mapping().base();
    match insn.mnem {
        Mnemonic::FmvXW => {
            emit_load_ext(&mut e.buf, Extend::S32, TMP0, base, fpr_offset(fs1(insn)));
            e.write(insn.rd, TMP0);
        }
        Mnemonic::FmvXD => {
            emit_load(&mut e.buf, true, TMP0, base, fpr_offset(fs1(insn)));
            e.write(insn.rd, TMP0);
        }
        Mnemonic::FmvWX => {
            e.load_to(insn.rs1, TMP0);
            let buf = &mut e.buf;
            // 32-bit mov zero-extends.
            emit_mov_rr(buf, false, TMP0, TMP0);
            emit_mov_ri64(buf, TMP2, NAN_BOX);
            emit_arith_rr(buf, ArithOp::Or, true, TMP0, TMP2);
            emit_store(buf, true, TMP0, base, fpr_offset(fd(insn)));
        }
        _ => {
            e.load_to(insn.rs1, TMP0);
            emit_store(&mut e.buf, true, TMP0, base, fpr_offset(fd(insn)));
        }
    }
    Ok(())
}

/// Where the helper's operands come from.
#[derive(Clone, Copy)]
enum Sources {
    /// `fs1`.
    One,
    /// `fs1`, `fs2`.
    Two,
    /// `fs1`, `fs2`, `fs3`.
    Three,
    /// Integer `rs1`.
    Int,
}

/// Helper, operand sources and whether the result goes to an integer
/// register.
fn helper_for(mnem: Mnemonic) -> Option<(FpHelper, Sources, bool)> {
    use fpu::*;
    use Mnemonic::*;
    use Sources::*;

    let entry: (FpHelper, Sources, bool) = match mnem {
        FaddS => (helper_fadd_s, Two, false),
        FsubS => (helper_fsub_s, Two, false),
        FmulS => (helper_fmul_s, Two, false),
        FdivS => (helper_fdiv_s, Two, false),
        FsqrtS => (helper_fsqrt_s, One, false),
        FmaddS => (helper_fmadd_s, Three, false),
        FmsubS => (helper_fmsub_s, Three, false),
        FnmsubS => (helper_fnmsub_s, Three, false),
        FnmaddS => (helper_fnmadd_s, Three, false),
        FsgnjS => (helper_fsgnj_s, Two, false),
        FsgnjnS => (helper_fsgnjn_s, Two, false),
        FsgnjxS => (helper_fsgnjx_s, Two, false),
        FminS => (helper_fmin_s, Two, false),
        FmaxS => (helper_fmax_s, Two, false),
        FeqS => (helper_feq_s, Two, true),
        FltS => (helper_flt_s, Two, true),
        FleS => (helper_fle_s, Two, true),
        FclassS => (helper_fclass_s, One, true),
        FcvtWS => (helper_fcvt_w_s, One, true),
        FcvtWuS => (helper_fcvt_wu_s, One, true),
        FcvtLS => (helper_fcvt_l_s, One, true),
        FcvtLuS => (helper_fcvt_lu_s, One, true),
        FcvtSW => (helper_fcvt_s_w, Int, false),
        FcvtSWu => (helper_fcvt_s_wu, Int, false),
        FcvtSL => (helper_fcvt_s_l, Int, false),
        FcvtSLu => (helper_fcvt_s_lu, Int, false),
        FcvtSD => (helper_fcvt_s_d, One, false),

        FaddD => (helper_fadd_d, Two, false),
        FsubD => (helper_fsub_d, Two, false),
        FmulD => (helper_fmul_d, Two, false),
        FdivD => (helper_fdiv_d, Two, false),
        FsqrtD => (helper_fsqrt_d, One, false),
        FmaddD => (helper_fmadd_d, Three, false),
        FmsubD => (helper_fmsub_d, Three, false),
        FnmsubD => (helper_fnmsub_d, Three, false),
        FnmaddD => (helper_fnmadd_d, Three, false),
        FsgnjD => (helper_fsgnj_d, Two, false),
        FsgnjnD => (helper_fsgnjn_d, Two, false),
        FsgnjxD => (helper_fsgnjx_d, Two, false),
        FminD => (helper_fmin_d, Two, false),
        FmaxD => (helper_fmax_d, Two, false),
        FeqD => (helper_feq_d, Two, true),
        FltD => (helper_flt_d, Two, true),
        FleD => (helper_fle_d, Two, true),
        FclassD => (helper_fclass_d, One, true),
        FcvtWD => (helper_fcvt_w_d, One, true),
        FcvtWuD => (helper_fcvt_wu_d, One, true),
        FcvtLD => (helper_fcvt_l_d, One, true),
        FcvtLuD => (helper_fcvt_lu_d, One, true),
        FcvtDW => (helper_fcvt_d_w, Int, false),
        FcvtDWu => (helper_fcvt_d_wu, Int, false),
        FcvtDL => (helper_fcvt_d_l, Int, false),
        FcvtDLu => (helper_fcvt_d_lu, Int, false),
        FcvtDS => (helper_fcvt_d_s, One, false),
        _ => return None,
    };
    Some(entry)
}

/// Every other F/D instruction: one helper call.
pub(super) fn gen_fp_op(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    let Some((helper, sources, int_dest)) = helper_for(insn.mnem) else {
        return Err(TranslateError::Unsupported {
            addr: insn.addr,
            mnemonic: insn.mnem,
        });
    };
    use HelperArg::{Fpr, Gpr, Unused};
    let operands = match sources {
        Sources::One => [Fpr(fs1(insn)), Unused, Unused],
        Sources::Two => [Fpr(fs1(insn)), Fpr(fs2(insn)), Unused],
        Sources::Three => [Fpr(fs1(insn)), Fpr(fs2(insn)), Fpr(fs3(insn))],
        Sources::Int => [Gpr(insn.rs1), Unused, Unused],
    };
    let [a, b, c] = operands;
    e.call_helper(helper as usize as u64, &[a, b, c, HelperArg::Imm(rm(insn))]);
    if int_dest {
        e.write(insn.rd, TMP0);
    } else {
        let base = e.mapping().base();
        emit_store(&mut e.buf, true, TMP0, base, fpr_offset(fd(insn)));
    }
    Ok(())
}
