//! RISC-V frontend: RV64 decoding and block formation.

pub mod block;
pub mod decode;

pub use block::{classify, Block, BlockBuilder, BlockExit, Classification};
pub use decode::decode;
