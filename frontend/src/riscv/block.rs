//! Basic block formation.

use dbt_core::{
    log, GuestInstruction, GuestMemory, Mnemonic, OpClass, TranslateError, TranslatorConfig,
    UsageHistogram,
};
use tracing::debug;

use super::decode::decode;

/// How one instruction affects block formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Keep decoding at the next sequential address.
    Continue,
    /// Direct jump: fold it into the block and keep decoding at the
    /// target.
    InlineJump(u64),
    /// The successor depends on run-time state; this instruction is
    /// the last in the block.
    TerminateBlock,
}

/// Classify `insn` for block formation.
pub fn classify(insn: &GuestInstruction) -> Classification {
    match (insn.class, insn.mnem) {
        (OpClass::Branch, _) => Classification::TerminateBlock,
        (OpClass::Jump, Mnemonic::Jal) => Classification::InlineJump(insn.target()),
        (OpClass::Jump, _) => Classification::TerminateBlock,
        (OpClass::System, _) => Classification::TerminateBlock,
        _ => Classification::Continue,
    }
}

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockExit {
    /// The last instruction (branch, indirect jump, ECALL/EBREAK)
    /// decides the successor at run time.
    Terminator,
    /// The block was cut short (length limit, direct jump back into
    /// the block, fetch fault); execution resumes at this address.
    Fallthrough(u64),
}

/// A formed basic block, ready for register allocation.
#[derive(Debug, Clone)]
pub struct Block {
    /// Guest address of the first instruction.
    pub start: u64,
    /// Instructions in execution order, direct jumps rewritten to
    /// their link-only form.
    pub insns: Vec<GuestInstruction>,
    /// Register reference counts over `insns`.
    pub usage: UsageHistogram,
    pub exit: BlockExit,
}

impl Block {
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Whether an instruction at `addr` is already part of the block.
    pub fn contains(&self, addr: u64) -> bool {
        self.insns.iter().any(|insn| insn.addr == addr)
    }
}

/// Forms blocks from guest memory.
pub struct BlockBuilder<'a, M: GuestMemory + ?Sized> {
    mem: &'a M,
    config: &'a TranslatorConfig,
}

impl<'a, M: GuestMemory + ?Sized> BlockBuilder<'a, M> {
    pub fn new(mem: &'a M, config: &'a TranslatorConfig) -> Self {
        Self { mem, config }
    }

    /// Decode from `start` until a block terminator.
    ///
    /// Fails only if `start` itself cannot be fetched.
    pub fn build(&self, start: u64) -> Result<Block, TranslateError> {
        let limit = self.config.block_limit() as usize;
        let mut block = Block {
            start,
            insns: Vec::new(),
            usage: UsageHistogram::new(),
            exit: BlockExit::Terminator,
        };
        let mut pc = start;

        block.exit = loop {
            if block.len() >= limit {
                break BlockExit::Fallthrough(pc);
            }
            let Some(raw) = self.mem.fetch_insn(pc) else {
                if block.is_empty() {
                    return Err(TranslateError::Fetch { addr: pc });
                }
                break BlockExit::Fallthrough(pc);
            };

            let insn = decode(pc, raw);
            block.usage.record_instruction(&insn);
            block.insns.push(insn);

            match classify(&insn) {
                Classification::Continue => pc = insn.next_addr(),
                // Single-stepped JALs keep their jump and end the block.
                Classification::InlineJump(_) if self.config.single_step => {
                    break BlockExit::Terminator
                }
                Classification::InlineJump(target) => {
                    if let Some(last) = block.insns.last_mut() {
                        last.make_link_only();
                    }
                    // A jump back into the block would inline forever.
                    if block.contains(target) {
                        break BlockExit::Fallthrough(target);
                    }
                    pc = target;
                }
                Classification::TerminateBlock => break BlockExit::Terminator,
            }
        };

        debug!(
            target: log::ASM_IN,
            insns = block.len(),
            exit = ?block.exit,
            "formed block at {:#x}",
            block.start
        );
        for insn in &block.insns {
            debug!(target: log::ASM_IN, "  {insn}");
        }
        Ok(block)
    }
}
