//! Runtime helpers called from translated code.
//!
//! Translated code calls a helper with the register file in `rdi` and
//! operands in the following System V argument registers; the result
//! comes back in `rax`. Helpers may touch the register file, never
//! guest memory.

pub mod csr;
pub mod fpu;
