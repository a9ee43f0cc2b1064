//! Execution engine: code cache, translation pipeline and the
//! dispatcher loop that runs translated blocks.

pub mod code_cache;
pub mod exec_loop;
pub mod stats;
mod translate;

pub use code_cache::{CacheEntry, CodeCache};
pub use exec_loop::{cpu_exec_loop, ExitReason};
pub use stats::ExecStats;

use std::ptr::NonNull;

use dbt_backend::Trampoline;
use dbt_core::{log, GuestMemory, ReturnStack, TranslateError, TranslatorConfig};
use tracing::info;

use crate::translate::Translator;

/// Execution environment holding all translation state of one guest
/// thread.
pub struct ExecEnv {
    pub config: TranslatorConfig,
    pub cache: CodeCache,
    stats: ExecStats,
    /// Heap-pinned: translated code holds its address.
    return_stack: NonNull<ReturnStack>,
    trampoline: Trampoline,
}

impl ExecEnv {
    pub fn new(config: TranslatorConfig) -> Result<Self, TranslateError> {
        let trampoline = Trampoline::new()?;
        info!(target: log::GENERAL, ?config, "execution environment ready");
        Ok(Self {
            config,
            cache: CodeCache::new(),
            stats: ExecStats::default(),
            return_stack: NonNull::from(Box::leak(Box::new(ReturnStack::new()))),
            trampoline,
        })
    }

    /// Host entry of the block at `pc`, translating it on a miss.
    pub fn lookup_or_translate<M: GuestMemory + ?Sized>(
        &mut self,
        mem: &M,
        pc: u64,
    ) -> Result<u64, TranslateError> {
        self.stats.lookups += 1;
        if let Some(host) = self.cache.lookup(pc) {
            self.stats.cache_hits += 1;
            return Ok(host);
        }
        Translator::new(self, mem).translate(pc)
    }

    /// Counters so far.
    pub fn stats(&self) -> ExecStats {
        ExecStats {
            return_hits: self.return_stack().hits(),
            ..self.stats.clone()
        }
    }

    pub fn return_stack(&self) -> &ReturnStack {
        // SAFETY: owned by `self`; translated code only runs inside
        // `cpu_exec_loop`, which holds `&mut self`.
        unsafe { self.return_stack.as_ref() }
    }

    /// Address baked into translated code, if the return stack is on.
    fn return_stack_addr(&self) -> Option<u64> {
        self.config
            .uses_return_stack()
            .then(|| self.return_stack.as_ptr() as u64)
    }
}

impl Drop for ExecEnv {
    fn drop(&mut self) {
        // SAFETY: allocated by Box in `new` and never freed elsewhere.
        unsafe { drop(Box::from_raw(self.return_stack.as_ptr())) };
    }
}
