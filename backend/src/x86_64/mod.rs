pub mod emitter;
pub mod regs;

pub use regs::Reg;
