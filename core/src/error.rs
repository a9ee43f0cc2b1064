use thiserror::Error;

use crate::insn::Mnemonic;

/// Failure to translate one guest block.
///
/// Every variant is fatal for the block being translated; the
/// code cache is left untouched.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("unsupported instruction `{mnemonic}` at {addr:#x}")]
    Unsupported { addr: u64, mnemonic: Mnemonic },
    #[error("host encoding failed: {0}")]
    Encoding(#[from] EncodingError),
    #[error("failed to allocate executable memory")]
    Alloc(#[source] std::io::Error),
    #[error("instruction fetch outside guest memory at {addr:#x}")]
    Fetch { addr: u64 },
}

/// Internal error of the host instruction encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("label {0} referenced but never bound")]
    UnboundLabel(u32),
    #[error("label {0} bound twice")]
    LabelRebound(u32),
    #[error("branch displacement {0:#x} does not fit in 32 bits")]
    DisplacementOutOfRange(i64),
    #[error("immediate {0:#x} does not fit in 32 bits")]
    ImmediateOutOfRange(i64),
}
