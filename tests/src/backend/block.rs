use dbt_backend::codec::lookup;
use dbt_backend::disas::disassemble;
use dbt_backend::{
    allocate, BlockEmitter, NoReturnResolver, RegisterMapping, ReturnTargetResolver,
};
use dbt_core::{
    fpr_offset, gpr_offset, GuestInstruction, GuestReg, Mnemonic, TranslateError,
    TranslatorConfig, INSTRET_OFFSET,
};
use dbt_frontend::{decode, BlockBuilder, BlockExit};
use iced_x86::{Instruction, Mnemonic as X86Mnemonic, Register};

use super::decode_all;
use crate::rv::*;

fn emit(
    insns: &[GuestInstruction],
    mapping: RegisterMapping,
    return_stack: Option<u64>,
    resolver: &mut dyn ReturnTargetResolver,
    fallthrough: Option<u64>,
) -> Vec<Instruction> {
    let mut emitter = BlockEmitter::new(mapping, return_stack, resolver);
    emitter.emit_block(insns, fallthrough).unwrap();
    let mut buf = emitter.finish();
    buf.resolve_links().unwrap();
    decode_all(buf.as_slice())
}

fn assert_exit(tail: &[Instruction], code: u64) {
    let [mov, ret] = tail else {
        panic!("expected a two-instruction exit");
    };
    if code == 0 {
        assert_eq!(mov.mnemonic(), X86Mnemonic::Xor);
    } else {
        assert_eq!(mov.mnemonic(), X86Mnemonic::Mov);
        assert_eq!(mov.immediate(1), code);
    }
    assert_eq!(mov.op0_register(), Register::EAX);
    assert_eq!(ret.mnemonic(), X86Mnemonic::Ret);
}

#[test]
fn test_codec_coverage() {
    assert!(lookup(Mnemonic::Invalid).is_none());
    for mnem in [
        Mnemonic::Addi,
        Mnemonic::Lui,
        Mnemonic::Mulhsu,
        Mnemonic::Remuw,
        Mnemonic::Ld,
        Mnemonic::Sb,
        Mnemonic::AmomaxuD,
        Mnemonic::ScW,
        Mnemonic::Bgeu,
        Mnemonic::Jal,
        Mnemonic::Jalr,
        Mnemonic::Link,
        Mnemonic::Fence,
        Mnemonic::Ecall,
        Mnemonic::Csrrs,
        Mnemonic::Csrrwi,
        Mnemonic::Flw,
        Mnemonic::Fsd,
        Mnemonic::FmvXW,
        Mnemonic::FnmaddS,
        Mnemonic::FcvtLuD,
        Mnemonic::FclassD,
        Mnemonic::FcvtDS,
    ] {
        assert!(lookup(mnem).is_some(), "{mnem} should be supported");
    }
}

#[test]
fn test_prologue_and_epilogue_move_mapped_registers() {
    let mem = image(
        &[addi(T0, T0, 1), addi(T0, T0, 1), addi(T0, T0, 1), ecall()],
        0x100,
    );
    let config = TranslatorConfig::default();
    let block = BlockBuilder::new(&mem, &config).build(0).unwrap();
    assert_eq!(block.exit, BlockExit::Terminator);
    let mapping = allocate(&block.usage, config.alloc_threshold);

    let code = emit(&block.insns, mapping, None, &mut NoReturnResolver, None);

    let load = &code[0];
    assert_eq!(load.mnemonic(), X86Mnemonic::Mov);
    assert_eq!(load.op0_register(), Register::R8);
    assert_eq!(load.memory_base(), Register::RBP);
    assert_eq!(load.memory_displacement64(), 40);

    let n = code.len();
    let store = &code[n - 3];
    assert_eq!(store.mnemonic(), X86Mnemonic::Mov);
    assert_eq!(store.memory_base(), Register::RBP);
    assert_eq!(store.memory_displacement64(), 40);
    assert_eq!(store.op1_register(), Register::R8);
    assert_exit(&code[n - 2..], 1);

    // Only the prologue touches t0's slot before the epilogue.
    let slot_accesses = code[1..n - 3]
        .iter()
        .filter(|i| i.memory_base() == Register::RBP && i.memory_displacement64() == 40)
        .count();
    assert_eq!(slot_accesses, 0);
}

#[test]
fn test_fallthrough_stores_successor_pc() {
    let insns = [decode(0x40, addi(A0, A0, 1))];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, Some(0x44));

    let n = code.len();
    let set_pc = &code[n - 3];
    assert_eq!(set_pc.memory_base(), Register::RBP);
    assert_eq!(set_pc.memory_displacement64(), 256);
    assert_eq!(set_pc.immediate(1), 0x44);
    assert_exit(&code[n - 2..], 0);
}

#[test]
fn test_ebreak_exit_code() {
    let insns = [decode(0x8, ebreak())];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, None);
    let n = code.len();
    assert_eq!(code[n - 3].immediate(1), 0x8);
    assert_exit(&code[n - 2..], 2);
}

#[test]
fn test_return_without_stack_exits_normally() {
    let insns = [decode(0x20, jalr(ZERO, RA, 0))];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, None);
    let n = code.len();
    assert_exit(&code[n - 2..], 0);
    assert!(code.iter().all(|i| i.mnemonic() != X86Mnemonic::Jmp));
}

struct Recorder(Vec<u64>);

impl ReturnTargetResolver for Recorder {
    fn resolve_return(&mut self, guest: u64) -> Option<u64> {
        self.0.push(guest);
        Some(0x7000_1000)
    }
}

#[test]
fn test_call_pushes_resolved_return_target() {
    const STACK: u64 = 0x5555_0000_0000;
    let insns = [decode(0x100, jalr(RA, A0, 0))];
    let mut recorder = Recorder(Vec::new());
    let code = emit(&insns, RegisterMapping::unmapped(), Some(STACK), &mut recorder, None);

    assert_eq!(recorder.0, vec![0x104]);
    let imms: Vec<u64> = code
        .iter()
        .filter(|i| i.mnemonic() == X86Mnemonic::Mov && i.op_count() == 2)
        .filter_map(|i| {
            matches!(
                i.op1_kind(),
                iced_x86::OpKind::Immediate32
                    | iced_x86::OpKind::Immediate64
                    | iced_x86::OpKind::Immediate32to64
            )
            .then(|| i.immediate(1))
        })
        .collect();
    assert!(imms.contains(&STACK));
    assert!(imms.contains(&0x104));
    assert!(imms.contains(&0x7000_1000));
}

#[test]
fn test_return_checks_stack() {
    const STACK: u64 = 0x5555_0000_0000;
    let insns = [decode(0x20, jalr(ZERO, RA, 0))];
    let code = emit(&insns, RegisterMapping::unmapped(), Some(STACK), &mut NoReturnResolver, None);

    // Hit path jumps through a register, miss path exits with code 3.
    assert!(code
        .iter()
        .any(|i| i.mnemonic() == X86Mnemonic::Jmp && i.op0_register() == Register::RAX));
    let n = code.len();
    assert_exit(&code[n - 2..], 3);
}

fn emit_err(insns: &[GuestInstruction]) -> TranslateError {
    let mut resolver = NoReturnResolver;
    let mut emitter = BlockEmitter::new(RegisterMapping::unmapped(), None, &mut resolver);
    emitter.emit_block(insns, None).unwrap_err()
}

#[test]
fn test_unsupported_instruction() {
    let insns = [decode(0, addi(A0, A0, 1)), decode(4, INVALID_WORD)];
    assert!(matches!(
        emit_err(&insns),
        TranslateError::Unsupported {
            addr: 4,
            mnemonic: Mnemonic::Invalid
        }
    ));
}

#[test]
fn test_csr_writes_to_counters_are_unsupported() {
    let insns = [decode(8, csrrw(A0, CSR_CYCLE, A1))];
    assert!(matches!(
        emit_err(&insns),
        TranslateError::Unsupported {
            addr: 8,
            mnemonic: Mnemonic::Csrrw
        }
    ));
    // Unknown CSRs are rejected even for reads.
    let insns = [decode(0, csrrs(A0, 0x300, ZERO))];
    assert!(matches!(emit_err(&insns), TranslateError::Unsupported { .. }));
}

#[test]
fn test_block_counts_retired_instructions() {
    let insns = [decode(0, addi(A0, A0, 1)), decode(4, addi(A0, A0, 1)), decode(8, ebreak())];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, None);
    let bump = code
        .iter()
        .find(|i| {
            i.mnemonic() == X86Mnemonic::Add
                && i.memory_base() == Register::RBP
                && i.memory_displacement64() == INSTRET_OFFSET as u64
        })
        .expect("instret update");
    assert_eq!(bump.immediate(1), 3);
}

/// Index of the first `call`, asserting the call is bracketed by
/// saves and restores of r8..r11.
fn helper_call(code: &[Instruction]) -> usize {
    let call = code
        .iter()
        .position(|i| i.mnemonic() == X86Mnemonic::Call)
        .expect("helper call");
    assert_eq!(code[call].op0_register(), Register::RAX);
    let pushes: Vec<Register> = code[..call]
        .iter()
        .filter(|i| i.mnemonic() == X86Mnemonic::Push)
        .map(|i| i.op0_register())
        .collect();
    assert_eq!(pushes, [Register::R8, Register::R9, Register::R10, Register::R11]);
    let pops: Vec<Register> = code[call + 1..call + 5].iter().map(|i| i.op0_register()).collect();
    assert!(code[call + 1..call + 5].iter().all(|i| i.mnemonic() == X86Mnemonic::Pop));
    assert_eq!(pops, [Register::R11, Register::R10, Register::R9, Register::R8]);
    assert!(code[..call].iter().any(|i| i.mnemonic() == X86Mnemonic::Mov
        && i.op0_register() == Register::RDI
        && i.op1_register() == Register::RBP));
    call
}

#[test]
fn test_fp_arithmetic_calls_helper() {
    let insns = [decode(0, fadd_d(1, 2, 3)), decode(4, ebreak())];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, None);
    let call = helper_call(&code);

    // Operands are loaded from the f-register slots into rsi and rdx,
    // the rounding mode into r8.
    let loads: Vec<(Register, u64)> = code[..call]
        .iter()
        .filter(|i| i.mnemonic() == X86Mnemonic::Mov && i.memory_base() == Register::RBP)
        .map(|i| (i.op0_register(), i.memory_displacement64()))
        .collect();
    assert!(loads.contains(&(Register::RSI, fpr_offset(2) as u64)));
    assert!(loads.contains(&(Register::RDX, fpr_offset(3) as u64)));
    assert!(code[..call]
        .iter()
        .any(|i| i.op0_register() == Register::R8D && i.immediate(1) == 7));

    let store = &code[call + 5];
    assert_eq!(store.memory_base(), Register::RBP);
    assert_eq!(store.memory_displacement64(), fpr_offset(1) as u64);
    assert_eq!(store.op1_register(), Register::RAX);
}

#[test]
fn test_fp_compare_writes_integer_register() {
    let mem = image(&[feq_d(A0, 1, 2), ebreak()], 0x100);
    let config = TranslatorConfig {
        alloc_threshold: 0,
        ..TranslatorConfig::default()
    };
    let block = BlockBuilder::new(&mem, &config).build(0).unwrap();
    let mapping = allocate(&block.usage, config.alloc_threshold);
    let code = emit(&block.insns, mapping, None, &mut NoReturnResolver, None);
    let call = helper_call(&code);
    // a0 lives in r8, which the pop restores before the result lands.
    let result = &code[call + 5];
    assert_eq!(result.mnemonic(), X86Mnemonic::Mov);
    assert_eq!(result.op0_register(), Register::R8);
    assert_eq!(result.op1_register(), Register::RAX);
}

#[test]
fn test_single_load_is_nan_boxed() {
    let insns = [decode(0, flw(1, S0, 4)), decode(4, ebreak())];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, None);
    assert!(code.iter().all(|i| i.mnemonic() != X86Mnemonic::Call));
    let load = code
        .iter()
        .position(|i| i.mnemonic() == X86Mnemonic::Mov && i.op0_register() == Register::EAX)
        .expect("32-bit load");
    assert_eq!(code[load].memory_displacement64(), 4);
    assert_eq!(code[load + 1].immediate(1), 0xffff_ffff_0000_0000);
    assert_eq!(code[load + 2].mnemonic(), X86Mnemonic::Or);
    assert_eq!(code[load + 3].memory_displacement64(), fpr_offset(1) as u64);
}

#[test]
fn test_csr_read_calls_helper() {
    let insns = [decode(0, csrrs(A0, CSR_TIME, ZERO)), decode(4, ebreak())];
    let code = emit(&insns, RegisterMapping::unmapped(), None, &mut NoReturnResolver, None);
    let call = helper_call(&code);
    assert!(code[..call]
        .iter()
        .any(|i| i.op0_register() == Register::ESI && i.immediate(1) == CSR_TIME as u64));
    let result = &code[call + 5];
    assert_eq!(result.memory_displacement64(), gpr_offset(GuestReg::A0) as u64);
}

#[test]
fn test_disassembly_lines() {
    let insns = [decode(0, addi(A0, A0, 1))];
    let mut resolver = NoReturnResolver;
    let mut emitter = BlockEmitter::new(RegisterMapping::unmapped(), None, &mut resolver);
    emitter.emit_block(&insns, None).unwrap();
    let buf = emitter.finish();
    let lines = disassemble(buf.as_slice(), 0x1000);
    assert_eq!(lines.len(), decode_all(buf.as_slice()).len());
    assert!(lines[0].starts_with("0x000000001000"));
    assert!(lines.last().unwrap().ends_with("ret"));
}
