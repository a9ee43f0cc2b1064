//! Translator frontend: guest instruction decoding and basic
//! block formation.
//!
//! The block builder walks guest code from a start address,
//! folds direct jumps into the block, and stops at the first
//! instruction whose successor is only known at run time.

pub mod riscv;

pub use riscv::{decode, Block, BlockBuilder, BlockExit, Classification};
