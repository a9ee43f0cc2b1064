use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dbt_core::{log, GuestReg, RegisterFile, TranslatorConfig};
use dbt_exec::{cpu_exec_loop, ExecEnv, ExitReason};
use dbt_linux_user::guest_space::GuestSpace;
use dbt_linux_user::loader::{code_segments, load_elf};
use dbt_linux_user::syscall::{handle_syscall, SyscallResult, SyscallState};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a static RISC-V RV64 Linux executable on x86-64 by dynamic
/// binary translation.
#[derive(Debug, Parser)]
#[command(name = "rvdbt", version)]
struct Cli {
    /// Be more verbose (same as -gioc, without register dumps).
    #[arg(short = 'v', long)]
    verbose: bool,
    /// Log engine lifecycle and configuration.
    #[arg(short = 'g', long)]
    log_general: bool,
    /// Log decoded guest instructions of each block.
    #[arg(short = 'i', long)]
    log_asm_in: bool,
    /// Log disassembly of the emitted x86-64 code.
    #[arg(short = 'o', long)]
    log_asm_out: bool,
    /// Dump the register file at block boundaries.
    #[arg(short = 'r', long)]
    log_regs: bool,
    /// Log code cache and return stack activity.
    #[arg(short = 'c', long)]
    log_cache: bool,
    /// Fail silently: skip unsupported instructions and answer unknown
    /// syscalls with -ENOSYS. The guest may enter undefined states.
    #[arg(short = 's', long)]
    fail_silently: bool,
    /// Translate one guest instruction per block.
    #[arg(short = 'd', long)]
    single_step: bool,
    /// Optimize block translation: register allocation and the
    /// return stack.
    #[arg(short = 'm', long)]
    optimize: bool,
    /// With -m, keep register allocation but skip the return stack.
    #[arg(long)]
    no_return_stack: bool,
    /// Upper bound on guest instructions per block.
    #[arg(long, default_value_t = TranslatorConfig::default().max_block_insns)]
    max_block_insns: u32,
    /// List the instructions of every executable segment, then exit.
    #[arg(short = 'a', long)]
    analyze: bool,
    /// Time guest execution, excluding loading.
    #[arg(short = 'b', long)]
    benchmark: bool,
    /// Print execution statistics at exit (also RVDBT_STATS).
    #[arg(long)]
    stats: bool,
    /// Guest executable.
    program: PathBuf,
    /// Arguments passed to the guest.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn config(&self) -> TranslatorConfig {
        TranslatorConfig {
            max_block_insns: self.max_block_insns,
            single_step: self.single_step,
            optimize: self.optimize,
            return_stack: !self.no_return_stack,
            fail_silently: self.fail_silently,
            ..TranslatorConfig::default()
        }
    }

    /// Default log filter; `RUST_LOG` replaces it entirely.
    fn log_filter(&self) -> String {
        let mut directives = vec!["warn".to_string()];
        let categories = [
            (self.verbose || self.log_general, log::GENERAL, "debug"),
            (self.verbose || self.log_asm_in, log::ASM_IN, "debug"),
            (self.verbose || self.log_asm_out, log::ASM_OUT, "trace"),
            (self.log_regs, log::REGS, "trace"),
            (self.verbose || self.log_cache, log::CACHE, "debug"),
        ];
        for (enabled, target, level) in categories {
            if enabled {
                directives.push(format!("{target}={level}"));
            }
        }
        directives.join(",")
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn analyze(path: &Path) -> Result<()> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let segments = code_segments(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut histogram: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut unsupported = 0u64;
    for seg in &segments {
        println!("segment {:#x} ({} bytes)", seg.vaddr, seg.bytes.len());
        for (i, word) in seg.bytes.chunks_exact(4).enumerate() {
            let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            let insn = dbt_frontend::decode(seg.vaddr + 4 * i as u64, raw);
            let translatable = dbt_backend::codec::lookup(insn.mnem).is_some();
            if !translatable {
                unsupported += 1;
            }
            *histogram.entry(insn.mnem.name()).or_default() += 1;
            println!("  {insn}{}", if translatable { "" } else { "  [unsupported]" });
        }
    }

    println!("mnemonics:");
    for (name, count) in &histogram {
        println!("  {name:<12} {count}");
    }
    println!("unsupported: {unsupported}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.analyze {
        return analyze(&cli.program);
    }

    let program = cli.program.display().to_string();
    let guest_argv: Vec<&str> = std::iter::once(program.as_str())
        .chain(cli.args.iter().map(String::as_str))
        .collect();

    let mut space = GuestSpace::new().context("failed to reserve guest address space")?;
    let info = load_elf(&cli.program, &mut space, &guest_argv, &[])
        .with_context(|| format!("failed to load {program}"))?;
    info!(target: log::GENERAL, ?info, "loaded {program}");

    let mut regs = RegisterFile::new();
    regs.pc = info.entry;
    regs.set(GuestReg::SP, info.sp);
    let mut syscalls = SyscallState::new(info.brk, cli.fail_silently);

    let mut env = ExecEnv::new(cli.config())
        .context("failed to set up the execution environment")?;

    let started = Instant::now();
    let exit_code = loop {
        // SAFETY: `space` backs every guest address and outlives `env`'s
        // use of it.
        let reason = unsafe { cpu_exec_loop(&mut env, &mut regs, &space) };
        let reason = reason.with_context(|| format!("translation failed (pc {:#x})", regs.pc))?;
        match reason {
            ExitReason::Ecall => match handle_syscall(&mut space, &regs, &mut syscalls) {
                SyscallResult::Continue(ret) => {
                    regs.set(GuestReg::A0, ret);
                    regs.pc += 4;
                }
                SyscallResult::Exit(code) => break code,
                SyscallResult::Unsupported(nr) => {
                    bail!("unsupported syscall {nr} at pc {:#x} (-s to ignore)", regs.pc)
                }
            },
            ExitReason::Ebreak => {
                eprintln!("ebreak at pc={:#x}", regs.pc);
                break 1;
            }
            ExitReason::Exit(v) => bail!("unexpected block exit {v} at pc {:#x}", regs.pc),
        }
    };

    if cli.benchmark {
        eprintln!("execution time: {:.6} s", started.elapsed().as_secs_f64());
    }
    if cli.stats || std::env::var_os("RVDBT_STATS").is_some() {
        eprint!("{}", env.stats());
        eprintln!(
            "  code cache          {} blocks, {} bytes",
            env.cache.len(),
            env.cache.code_size()
        );
    }
    process::exit(exit_code);
}
