//! Per-mnemonic host code generators.
//!
//! Every codec has the same shape: it reads its operands through the
//! emitter's register mapping, computes in the scratch registers and
//! writes the result back. Scratch registers never carry values from
//! one guest instruction to the next.

mod alu;
mod atomic;
mod control;
mod csr;
mod float;
mod mem;
mod muldiv;
mod system;

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::BlockEmitter;

/// Host code generator for one guest instruction.
pub type CodecFn = fn(&mut BlockEmitter<'_>, &GuestInstruction) -> Result<(), TranslateError>;

/// Codec for `mnem`, or `None` if the translator cannot express it.
pub fn lookup(mnem: Mnemonic) -> Option<CodecFn> {
    use Mnemonic::*;

    let gen: CodecFn = match mnem {
        Lui | Auipc => alu::gen_upper,
        Add | Sub | And | Or | Xor | Addw | Subw => alu::gen_arith,
        Addi | Andi | Ori | Xori | Addiw => alu::gen_arith_imm,
        Sll | Srl | Sra | Sllw | Srlw | Sraw => alu::gen_shift,
        Slli | Srli | Srai | Slliw | Srliw | Sraiw => alu::gen_shift_imm,
        Slt | Sltu | Slti | Sltiu => alu::gen_set_less,

        Mul | Mulw => muldiv::gen_mul,
        Mulh | Mulhu | Mulhsu => muldiv::gen_mul_high,
        Div | Divu | Rem | Remu | Divw | Divuw | Remw | Remuw => muldiv::gen_div_rem,

        Lb | Lh | Lw | Ld | Lbu | Lhu | Lwu => mem::gen_load,
        Sb | Sh | Sw | Sd => mem::gen_store,

        LrW | LrD => atomic::gen_lr,
        ScW | ScD => atomic::gen_sc,
        AmoswapW | AmoaddW | AmoxorW | AmoandW | AmoorW | AmominW | AmomaxW | AmominuW
        | AmomaxuW | AmoswapD | AmoaddD | AmoxorD | AmoandD | AmoorD | AmominD | AmomaxD
        | AmominuD | AmomaxuD => atomic::gen_amo,

        Beq | Bne | Blt | Bge | Bltu | Bgeu => control::gen_branch,
        Jal => control::gen_jal,
        Jalr => control::gen_jalr,
        Link => control::gen_link,

        Fence | FenceI => system::gen_fence,
        Ecall => system::gen_ecall,
        Ebreak => system::gen_ebreak,

        Csrrw | Csrrs | Csrrc | Csrrwi | Csrrsi | Csrrci => csr::gen_csr,

        Flw | Fld => float::gen_fp_load,
        Fsw | Fsd => float::gen_fp_store,
        FmvXW | FmvWX | FmvXD | FmvDX => float::gen_fp_move,
        FmaddS | FmsubS | FnmsubS | FnmaddS | FaddS | FsubS | FmulS | FdivS | FsqrtS | FsgnjS
        | FsgnjnS | FsgnjxS | FminS | FmaxS | FcvtWS | FcvtWuS | FcvtLS | FcvtLuS | FcvtSW
        | FcvtSWu | FcvtSL | FcvtSLu | FeqS | FltS | FleS | FclassS | FmaddD | FmsubD | FnmsubD
        | FnmaddD | FaddD | FsubD | FmulD | FdivD | FsqrtD | FsgnjD | FsgnjnD | FsgnjxD | FminD
        | FmaxD | FcvtWD | FcvtWuD | FcvtLD | FcvtLuD | FcvtDW | FcvtDWu | FcvtDL | FcvtDLu
        | FeqD | FltD | FleD | FclassD | FcvtSD | FcvtDS => float::gen_fp_op,

        Invalid => return None,
    };
    Some(gen)
}
