//! `tracing` targets, one per log category.
//!
//! Filter on them with `RUST_LOG`, e.g. `RUST_LOG=rvdbt::cache=debug`.

/// Engine lifecycle and configuration.
pub const GENERAL: &str = "rvdbt::general";
/// Decoded guest instructions of each block.
pub const ASM_IN: &str = "rvdbt::asm_in";
/// Disassembly of emitted host code.
pub const ASM_OUT: &str = "rvdbt::asm_out";
/// Code cache and Return Stack activity.
pub const CACHE: &str = "rvdbt::cache";
/// Register file dumps at block boundaries.
pub const REGS: &str = "rvdbt::regs";
