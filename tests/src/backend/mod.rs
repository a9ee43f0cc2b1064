//! Host code emission tests. Emitted bytes are checked by decoding
//! them back with iced-x86.

mod block;
mod code_buffer;
mod regalloc;

use iced_x86::{Decoder, DecoderOptions, Instruction};

/// Decode every instruction in `code`, asserting nothing is left over.
fn decode_all(code: &[u8]) -> Vec<Instruction> {
    let mut decoder = Decoder::with_ip(64, code, 0, DecoderOptions::NONE);
    let mut out = Vec::new();
    while decoder.can_decode() {
        let insn = decoder.decode();
        assert!(!insn.is_invalid(), "invalid encoding in {code:02x?}");
        out.push(insn);
    }
    out
}

/// Decode exactly one instruction spanning all of `code`.
fn decode_one(code: &[u8]) -> Instruction {
    let insns = decode_all(code);
    assert_eq!(insns.len(), 1, "expected one instruction in {code:02x?}");
    insns[0]
}
