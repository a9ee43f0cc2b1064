//! Zicsr. Every access goes through [`helper_csr`]; the CSR address
//! and write permission are checked here, before any code is emitted.

use dbt_core::{GuestInstruction, Mnemonic, TranslateError};

use crate::emit::{BlockEmitter, HelperArg};
use crate::helper::csr::{self, helper_csr, CsrOp};
use crate::x86_64::regs::TMP0;

pub(super) fn gen_csr(
    e: &mut BlockEmitter<'_>,
    insn: &GuestInstruction,
) -> Result<(), TranslateError> {
    use Mnemonic::*;

    let addr = (insn.imm & 0xfff) as u16;
    let zimm = ((insn.raw >> 15) & 0x1f) as u64;
    let (op, src) = match insn.mnem {
        Csrrw => (CsrOp::Write, HelperArg::Gpr(insn.rs1)),
        Csrrs => (CsrOp::Set, HelperArg::Gpr(insn.rs1)),
        Csrrc => (CsrOp::Clear, HelperArg::Gpr(insn.rs1)),
        Csrrwi => (CsrOp::Write, HelperArg::Imm(zimm)),
        Csrrsi => (CsrOp::Set, HelperArg::Imm(zimm)),
        _ => (CsrOp::Clear, HelperArg::Imm(zimm)),
    };
    // Set/clear with x0 or a zero immediate only reads.
    let op = match (op, src) {
        (CsrOp::Set | CsrOp::Clear, HelperArg::Gpr(reg)) if reg.is_zero() => CsrOp::Read,
        (CsrOp::Set | CsrOp::Clear, HelperArg::Imm(0)) => CsrOp::Read,
        _ => op,
    };
    if !csr::is_known(addr) || (op != CsrOp::Read && csr::is_read_only(addr)) {
        return Err(TranslateError::Unsupported {
            addr: insn.addr,
            mnemonic: insn.mnem,
        });
    }

    e.call_helper(
        helper_csr as usize as u64,
        &[HelperArg::Imm(addr as u64), src, HelperArg::Imm(op as u64)],
    );
    e.write(insn.rd, TMP0);
    Ok(())
}
