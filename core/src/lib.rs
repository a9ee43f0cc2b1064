//! Shared types of the RISC-V block translator: guest registers,
//! decoded instructions, usage histograms, the register file and return
//! stack that translated code operates on, and the translation error taxonomy.

pub mod config;
pub mod error;
pub mod insn;
pub mod log;
pub mod mem;
pub mod reg;
pub mod regfile;
pub mod return_stack;
pub mod usage;

pub use config::TranslatorConfig;
pub use error::{EncodingError, TranslateError};
pub use insn::{GuestInstruction, Mnemonic, OpClass};
pub use mem::GuestMemory;
pub use reg::{GuestReg, NUM_GUEST_REGS};
pub use regfile::{
    fpr_offset, gpr_offset, RegisterFile, FCSR_OFFSET, FPR_OFFSET, GUEST_BASE_OFFSET,
    INSTRET_OFFSET, NUM_FP_REGS, PC_OFFSET,
};
pub use return_stack::{ReturnEntry, ReturnStack, RETURN_STACK_CAPACITY};
pub use usage::UsageHistogram;
