//! Per-block host code emission.
//!
//! A translated block is an ordinary leaf function body: it is
//! `call`ed by the entry trampoline with `rbp` pointing at the guest
//! register file, loads the mapped guest registers, runs the body,
//! stores them back and returns an exit code in `rax`.

use dbt_core::return_stack::{
    RETURN_BACK_OFFSET, RETURN_ENTRIES_OFFSET, RETURN_ENTRY_SHIFT, RETURN_FRONT_OFFSET,
    RETURN_HITS_OFFSET, RETURN_STACK_CAPACITY, RETURN_STACK_MASK,
};
use dbt_core::{
    fpr_offset, gpr_offset, log, EncodingError, GuestInstruction, GuestReg, TranslateError,
    GUEST_BASE_OFFSET, INSTRET_OFFSET, PC_OFFSET,
};
use tracing::debug;

use crate::code_buffer::CodeBuffer;
use crate::codec;
use crate::regalloc::RegisterMapping;
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{Reg, CALLER_SAVED_POOL, CALL_ARG_REGS, TMP0, TMP1, TMP2, TMP3};

// ── Exit codes ───────────────────────────────────────────────────

/// `pc` holds the successor; look it up.
pub const EXIT_NEXT: u64 = 0;
/// `pc` holds the address of an ECALL.
pub const EXIT_ECALL: u64 = 1;
/// `pc` holds the address of an EBREAK.
pub const EXIT_EBREAK: u64 = 2;
/// A return-site prediction failed; `pc` holds the return target.
pub const EXIT_RETURN_MISS: u64 = 3;

/// How a block's host code hands control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Store registers and return `EXIT_NEXT`.
    Next,
    Ecall,
    Ebreak,
    /// Look up `pc` in the return stack; exit only on a miss.
    Return,
}

/// One argument of a helper call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HelperArg {
    Gpr(GuestReg),
    /// Raw bits of an f-register.
    Fpr(u32),
    Imm(u64),
    /// Leave the argument register as it is.
    Unused,
}

/// Supplies the host entry for a call site's return address while the
/// call site is being emitted.
pub trait ReturnTargetResolver {
    /// Host entry of the block starting at `guest`, or `None` if it
    /// is not (and cannot now be) translated.
    fn resolve_return(&mut self, guest: u64) -> Option<u64>;
}

/// Resolver for contexts that never translate ahead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReturnResolver;

impl ReturnTargetResolver for NoReturnResolver {
    fn resolve_return(&mut self, _guest: u64) -> Option<u64> {
        None
    }
}

/// Translation context for one block.
pub struct BlockEmitter<'r> {
    pub(crate) buf: CodeBuffer,
    mapping: RegisterMapping,
    /// Host address of the return stack; `None` disables push/pop code.
    return_stack: Option<u64>,
    resolver: &'r mut dyn ReturnTargetResolver,
    /// Emit nothing for instructions the codecs reject.
    skip_unsupported: bool,
    pub(crate) tail: Option<Tail>,
}

impl<'r> BlockEmitter<'r> {
    pub fn new(
        mapping: RegisterMapping,
        return_stack: Option<u64>,
        resolver: &'r mut dyn ReturnTargetResolver,
    ) -> Self {
        Self {
            buf: CodeBuffer::with_capacity(256),
            mapping,
            return_stack,
            resolver,
            skip_unsupported: false,
            tail: None,
        }
    }

    /// Drop unsupported instructions from the block instead of
    /// failing it. The guest may then run into undefined state.
    pub fn skip_unsupported(mut self, skip: bool) -> Self {
        self.skip_unsupported = skip;
        self
    }

    pub fn mapping(&self) -> &RegisterMapping {
        &self.mapping
    }

    pub fn return_stack_enabled(&self) -> bool {
        self.return_stack.is_some()
    }

    /// Emit a whole block: prologue, one codec per instruction, then
    /// the exit path. `fallthrough` is the successor of a block that
    /// was cut short rather than ended by a terminator.
    pub fn emit_block(
        &mut self,
        insns: &[GuestInstruction],
        fallthrough: Option<u64>,
    ) -> Result<(), TranslateError> {
        self.emit_prologue();
        let base = self.mapping.base();
        emit_arith_mi(&mut self.buf, ArithOp::Add, true, base, INSTRET_OFFSET, insns.len() as i32);
        for insn in insns {
            let result = match codec::lookup(insn.mnem) {
                Some(gen) => gen(self, insn),
                None => Err(TranslateError::Unsupported {
                    addr: insn.addr,
                    mnemonic: insn.mnem,
                }),
            };
            match result {
                Err(TranslateError::Unsupported { .. }) if self.skip_unsupported => {
                    debug!(target: log::ASM_OUT, "skipping unsupported {insn}");
                }
                other => other?,
            }
        }

        let tail = match (fallthrough, self.tail) {
            (Some(pc), _) => {
                self.set_pc(pc);
                Tail::Next
            }
            (None, Some(tail)) => tail,
            (None, None) => {
                let pc = insns.last().map_or(0, |i| i.next_addr());
                self.set_pc(pc);
                Tail::Next
            }
        };
        self.emit_epilogue();
        match tail {
            Tail::Next => self.emit_exit(EXIT_NEXT),
            Tail::Ecall => self.emit_exit(EXIT_ECALL),
            Tail::Ebreak => self.emit_exit(EXIT_EBREAK),
            Tail::Return => self.emit_return_pop()?,
        }
        Ok(())
    }

    /// Hand the finished code to the finalizer.
    pub fn finish(self) -> CodeBuffer {
        self.buf
    }

    // ── Prologue / epilogue ─────────────────────────────────────

    fn emit_prologue(&mut self) {
        let base = self.mapping.base();
        for (guest, host) in self.mapping.mapped() {
            emit_load(&mut self.buf, true, host, base, gpr_offset(guest));
        }
    }

    fn emit_epilogue(&mut self) {
        let base = self.mapping.base();
        for (guest, host) in self.mapping.mapped() {
            emit_store(&mut self.buf, true, host, base, gpr_offset(guest));
        }
    }

    fn emit_exit(&mut self, code: u64) {
        emit_mov_ri(&mut self.buf, false, Reg::Rax, code);
        emit_ret(&mut self.buf);
    }

    // ── Guest operand access ────────────────────────────────────

    /// Register holding `reg`'s value: its host register if mapped,
    /// otherwise `scratch` loaded from the register file.
    pub(crate) fn read(&mut self, reg: GuestReg, scratch: Reg) -> Reg {
        match self.mapping.host(reg) {
            Some(host) => host,
            None => {
                self.load_to(reg, scratch);
                scratch
            }
        }
    }

    /// Copy `reg`'s value into `dst`.
    pub(crate) fn load_to(&mut self, reg: GuestReg, dst: Reg) {
        if reg.is_zero() {
            emit_mov_ri(&mut self.buf, false, dst, 0);
        } else if let Some(host) = self.mapping.host(reg) {
            if host != dst {
                emit_mov_rr(&mut self.buf, true, dst, host);
            }
        } else {
            let base = self.mapping.base();
            emit_load(&mut self.buf, true, dst, base, gpr_offset(reg));
        }
    }

    /// Write `src` to guest register `reg`. Writes to x0 vanish.
    pub(crate) fn write(&mut self, reg: GuestReg, src: Reg) {
        if reg.is_zero() {
            return;
        }
        match self.mapping.host(reg) {
            Some(host) if host == src => {}
            Some(host) => emit_mov_rr(&mut self.buf, true, host, src),
            None => {
                let base = self.mapping.base();
                emit_store(&mut self.buf, true, src, base, gpr_offset(reg));
            }
        }
    }

    /// Write a constant to guest register `reg`.
    pub(crate) fn write_imm(&mut self, reg: GuestReg, val: u64) {
        if reg.is_zero() {
            return;
        }
        match self.mapping.host(reg) {
            Some(host) => emit_mov_ri(&mut self.buf, true, host, val),
            None => {
                emit_mov_ri(&mut self.buf, true, TMP0, val);
                self.write(reg, TMP0);
            }
        }
    }

    /// Host address of `rs1 + offset` in `dst`, minus the offset, which
    /// callers fold into the memory operand's displacement.
    pub(crate) fn guest_address(&mut self, rs1: GuestReg, dst: Reg) {
        self.load_to(rs1, dst);
        let base = self.mapping.base();
        emit_arith_rm(&mut self.buf, ArithOp::Add, true, dst, base, GUEST_BASE_OFFSET);
    }

    /// Store a constant guest `pc`.
    pub(crate) fn set_pc(&mut self, pc: u64) {
        let base = self.mapping.base();
        if let Ok(imm) = i32::try_from(pc as i64) {
            emit_store_imm(&mut self.buf, true, base, PC_OFFSET, imm);
        } else {
            emit_mov_ri(&mut self.buf, true, TMP0, pc);
            emit_store(&mut self.buf, true, TMP0, base, PC_OFFSET);
        }
    }

    /// Store a computed guest `pc` held in `src`.
    pub(crate) fn set_pc_reg(&mut self, src: Reg) {
        let base = self.mapping.base();
        emit_store(&mut self.buf, true, src, base, PC_OFFSET);
    }

    // ── Helper calls ────────────────────────────────────────────

    /// Call `helper` with the register file as first argument and
    /// `args` after it; the result is left in `rax`.
    ///
    /// `Gpr` arguments may only take the first three slots, whose
    /// registers are outside the allocation pool. Clobbers the scratch
    /// registers and the flags.
    pub(crate) fn call_helper(&mut self, helper: u64, args: &[HelperArg]) {
        debug_assert!(args.len() < CALL_ARG_REGS.len());
        for &reg in &CALLER_SAVED_POOL {
            emit_push(&mut self.buf, reg);
        }
        // Guest registers first: later slots overwrite pool registers.
        for (i, arg) in args.iter().enumerate() {
            if let HelperArg::Gpr(reg) = *arg {
                debug_assert!(i < 3);
                self.load_to(reg, CALL_ARG_REGS[i + 1]);
            }
        }
        let base = self.mapping.base();
        for (i, arg) in args.iter().enumerate() {
            let dst = CALL_ARG_REGS[i + 1];
            match *arg {
                HelperArg::Fpr(n) => emit_load(&mut self.buf, true, dst, base, fpr_offset(n)),
                HelperArg::Imm(val) => emit_mov_ri(&mut self.buf, true, dst, val),
                HelperArg::Gpr(_) | HelperArg::Unused => {}
            }
        }
        emit_mov_rr(&mut self.buf, true, CALL_ARG_REGS[0], base);
        emit_mov_ri64(&mut self.buf, TMP0, helper);
        emit_call_reg(&mut self.buf, TMP0);
        for &reg in CALLER_SAVED_POOL.iter().rev() {
            emit_pop(&mut self.buf, reg);
        }
    }

    // ── Return stack ────────────────────────────────────────────

    /// Record that the callee should return to `ret_guest`.
    ///
    /// Clobbers the scratch registers and the flags.
    pub(crate) fn emit_return_push(&mut self, ret_guest: u64) -> Result<(), TranslateError> {
        let Some(stack) = self.return_stack else {
            return Ok(());
        };
        let host = self.resolver.resolve_return(ret_guest).unwrap_or(0);
        debug!(
            target: log::CACHE,
            "return stack push {ret_guest:#x} -> host {host:#x}"
        );

        let buf = &mut self.buf;
        let done = buf.new_label();
        emit_mov_ri64(buf, TMP3, stack);
        emit_load(buf, true, TMP0, TMP3, RETURN_BACK_OFFSET);
        // rcx = (back & mask) << shift
        emit_mov_rr(buf, false, TMP1, TMP0);
        emit_arith_ri(buf, ArithOp::And, false, TMP1, RETURN_STACK_MASK as i32);
        emit_shift_ri(buf, ShiftOp::Shl, false, TMP1, RETURN_ENTRY_SHIFT);
        emit_mov_ri(buf, true, TMP2, ret_guest);
        emit_store_sib(buf, true, TMP2, TMP3, TMP1, 0, RETURN_ENTRIES_OFFSET);
        emit_mov_ri(buf, true, TMP2, host);
        emit_store_sib(buf, true, TMP2, TMP3, TMP1, 0, RETURN_ENTRIES_OFFSET + 8);
        emit_arith_ri(buf, ArithOp::Add, true, TMP0, 1);
        emit_store(buf, true, TMP0, TMP3, RETURN_BACK_OFFSET);
        // Full before the push means back - front is now capacity + 1.
        emit_arith_rm(buf, ArithOp::Sub, true, TMP0, TMP3, RETURN_FRONT_OFFSET);
        emit_arith_ri(buf, ArithOp::Cmp, true, TMP0, RETURN_STACK_CAPACITY as i32);
        emit_jcc(buf, X86Cond::Jbe, done);
        emit_arith_mi(buf, ArithOp::Add, true, TMP3, RETURN_FRONT_OFFSET, 1);
        buf.bind(done)?;
        Ok(())
    }

    /// Return-site exit: jump straight to the predicted host code if
    /// the top entry matches `pc`, otherwise exit with
    /// `EXIT_RETURN_MISS`. Mapped registers must already be stored.
    fn emit_return_pop(&mut self) -> Result<(), TranslateError> {
        let Some(stack) = self.return_stack else {
            self.emit_exit(EXIT_NEXT);
            return Ok(());
        };
        let base = self.mapping.base();
        let buf = &mut self.buf;
        let miss = buf.new_label();

        emit_load(buf, true, TMP2, base, PC_OFFSET);
        emit_mov_ri64(buf, TMP3, stack);
        emit_load(buf, true, TMP0, TMP3, RETURN_BACK_OFFSET);
        emit_arith_rm(buf, ArithOp::Cmp, true, TMP0, TMP3, RETURN_FRONT_OFFSET);
        emit_jcc(buf, X86Cond::Je, miss);
        emit_arith_ri(buf, ArithOp::Sub, true, TMP0, 1);
        emit_store(buf, true, TMP0, TMP3, RETURN_BACK_OFFSET);
        emit_arith_ri(buf, ArithOp::And, false, TMP0, RETURN_STACK_MASK as i32);
        emit_shift_ri(buf, ShiftOp::Shl, false, TMP0, RETURN_ENTRY_SHIFT);
        emit_load_sib(buf, true, TMP1, TMP3, TMP0, 0, RETURN_ENTRIES_OFFSET);
        emit_arith_rr(buf, ArithOp::Cmp, true, TMP1, TMP2);
        emit_jcc(buf, X86Cond::Jne, miss);
        emit_load_sib(buf, true, TMP0, TMP3, TMP0, 0, RETURN_ENTRIES_OFFSET + 8);
        emit_test_rr(buf, true, TMP0, TMP0);
        emit_jcc(buf, X86Cond::Je, miss);
        emit_arith_mi(buf, ArithOp::Add, true, TMP3, RETURN_HITS_OFFSET, 1);
        emit_jmp_reg(buf, TMP0);

        buf.bind(miss)?;
        self.emit_exit(EXIT_RETURN_MISS);
        Ok(())
    }
}

/// Narrow a guest immediate to a 32-bit host immediate.
pub(crate) fn imm32(imm: i64) -> Result<i32, EncodingError> {
    i32::try_from(imm).map_err(|_| EncodingError::ImmediateOutOfRange(imm))
}
