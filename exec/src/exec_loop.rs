use dbt_backend::{EXIT_EBREAK, EXIT_ECALL, EXIT_NEXT, EXIT_RETURN_MISS};
use dbt_core::{log, GuestMemory, RegisterFile, TranslateError};
use tracing::{debug, trace};

use crate::ExecEnv;

/// Reason the execution loop handed control back to the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `pc` points at an ECALL. The embedder services it and advances
    /// `pc` past it before re-entering.
    Ecall,
    /// `pc` points at an EBREAK.
    Ebreak,
    /// A block returned an exit code the dispatcher does not know.
    Exit(u64),
}

/// Main dispatch loop.
///
/// Repeatedly looks up (translating on a miss) the block at `regs.pc`
/// and runs it, until a block traps to the embedder or translation
/// fails.
///
/// # Safety
/// `mem` must describe the memory the guest program accesses: its
/// `host_base` must stay valid for every address the guest loads from
/// or stores to, since translated code does not bounds-check them.
pub unsafe fn cpu_exec_loop<M: GuestMemory + ?Sized>(
    env: &mut ExecEnv,
    regs: &mut RegisterFile,
    mem: &M,
) -> Result<ExitReason, TranslateError> {
    regs.guest_base = mem.host_base();
    loop {
        let pc = regs.pc;
        let host = env.lookup_or_translate(mem, pc)?;
        trace!(target: log::REGS, "enter {pc:#x}\n{regs:?}");

        let code = env.trampoline.enter(regs.as_mut_ptr(), host as *const u8);
        env.stats.block_entries += 1;

        match code {
            EXIT_NEXT => {}
            EXIT_RETURN_MISS => {
                env.stats.return_misses += 1;
                debug!(target: log::CACHE, "return stack miss, target {:#x}", regs.pc);
            }
            EXIT_ECALL => {
                env.stats.ecalls += 1;
                return Ok(ExitReason::Ecall);
            }
            EXIT_EBREAK => return Ok(ExitReason::Ebreak),
            other => return Ok(ExitReason::Exit(other)),
        }
    }
}
