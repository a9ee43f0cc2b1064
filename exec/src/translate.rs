//! Guest block to cached host code: build, allocate, emit, finalize.

use dbt_backend::{allocate, finalize, BlockEmitter, RegisterMapping, ReturnTargetResolver};
use dbt_core::{log, GuestMemory, TranslateError};
use dbt_frontend::{BlockBuilder, BlockExit};
use tracing::debug;

use crate::ExecEnv;

/// Drives translations for one dispatcher lookup, including the
/// return-target blocks its call sites translate ahead of time.
pub(crate) struct Translator<'e, M: GuestMemory + ?Sized> {
    env: &'e mut ExecEnv,
    mem: &'e M,
    /// Start addresses being translated, outermost first.
    in_flight: Vec<u64>,
}

impl<'e, M: GuestMemory + ?Sized> Translator<'e, M> {
    pub(crate) fn new(env: &'e mut ExecEnv, mem: &'e M) -> Self {
        Self {
            env,
            mem,
            in_flight: Vec::new(),
        }
    }

    /// Translate the block at `start` and insert it into the cache.
    pub(crate) fn translate(&mut self, start: u64) -> Result<u64, TranslateError> {
        self.in_flight.push(start);
        let result = self.translate_block(start);
        self.in_flight.pop();
        result
    }

    fn translate_block(&mut self, start: u64) -> Result<u64, TranslateError> {
        let block = BlockBuilder::new(self.mem, &self.env.config).build(start)?;
        let mapping = if self.env.config.allocates_registers() {
            allocate(&block.usage, self.env.config.alloc_threshold)
        } else {
            RegisterMapping::unmapped()
        };
        let return_stack = self.env.return_stack_addr();
        let fail_silently = self.env.config.fail_silently;
        let fallthrough = match block.exit {
            BlockExit::Fallthrough(pc) => Some(pc),
            BlockExit::Terminator => None,
        };

        let buf = {
            let mut emitter = BlockEmitter::new(mapping, return_stack, &mut *self)
                .skip_unsupported(fail_silently);
            emitter.emit_block(&block.insns, fallthrough)?;
            emitter.finish()
        };
        let region = finalize(buf)?;
        let host = self.env.cache.insert(start, region, block.len());
        self.env.stats.translations += 1;
        Ok(host)
    }
}

impl<M: GuestMemory + ?Sized> ReturnTargetResolver for Translator<'_, M> {
    fn resolve_return(&mut self, guest: u64) -> Option<u64> {
        if let Some(host) = self.env.cache.lookup(guest) {
            return Some(host);
        }
        let depth = self.in_flight.len().saturating_sub(1);
        if self.in_flight.contains(&guest) || depth >= self.env.config.eager_return_depth as usize {
            debug!(target: log::CACHE, depth, "return target {guest:#x} left unresolved");
            return None;
        }
        match self.translate(guest) {
            Ok(host) => {
                self.env.stats.eager_translations += 1;
                Some(host)
            }
            Err(err) => {
                debug!(target: log::CACHE, %err, "eager translation of {guest:#x} failed");
                None
            }
        }
    }
}
