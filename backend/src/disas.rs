//! Host disassembly for the `asm_out` log category.

use dbt_core::log;
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};
use tracing::{enabled, trace, Level};

/// Disassemble `code` as if loaded at `ip`, one line per instruction.
pub fn disassemble(code: &[u8], ip: u64) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut insn = Instruction::default();
    let mut lines = Vec::new();
    while decoder.can_decode() {
        decoder.decode_out(&mut insn);
        let mut text = String::new();
        formatter.format(&insn, &mut text);
        lines.push(format!("{:#014x}: {text}", insn.ip()));
    }
    lines
}

pub(crate) fn log_code(code: &[u8], ip: u64) {
    if !enabled!(target: log::ASM_OUT, Level::TRACE) {
        return;
    }
    for line in disassemble(code, ip) {
        trace!(target: log::ASM_OUT, "  {line}");
    }
}
