//! x86-64 host backend: register allocation, per-instruction codecs,
//! block emission and executable code regions.

pub mod code_buffer;
pub mod codec;
pub mod disas;
pub mod emit;
pub mod helper;
pub mod regalloc;
pub mod region;
pub mod trampoline;
pub mod x86_64;

pub use code_buffer::{CodeBuffer, Label};
pub use emit::{
    BlockEmitter, NoReturnResolver, ReturnTargetResolver, Tail, EXIT_EBREAK, EXIT_ECALL,
    EXIT_NEXT, EXIT_RETURN_MISS,
};
pub use regalloc::{allocate, RegisterMapping};
pub use region::{finalize, CodeRegion};
pub use trampoline::Trampoline;
