use std::fs;
use std::io;
use std::path::Path;

use goblin::elf::header::{EM_RISCV, ET_EXEC};
use goblin::elf::program_header::{ProgramHeader, PF_R, PF_W, PF_X, PT_LOAD, PT_PHDR};
use goblin::elf::Elf;
use thiserror::Error;
use tracing::debug;

use crate::guest_space::*;

// Auxiliary vector tags.
pub const AT_NULL: u64 = 0;
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_PAGESZ: u64 = 6;
pub const AT_ENTRY: u64 = 9;
pub const AT_RANDOM: u64 = 25;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    #[error("ELF: {0}")]
    Parse(#[from] goblin::error::Error),
    #[error("unsupported executable: {0}")]
    UnsupportedTarget(String),
    #[error("no PT_LOAD segment")]
    NoLoadSegment,
    #[error("segment {vaddr:#x}+{memsz:#x} outside the guest space")]
    SegmentOutOfRange { vaddr: u64, memsz: u64 },
    #[error("segment data at file offset {offset:#x} is truncated")]
    Truncated { offset: u64 },
}

/// Result of loading an ELF binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfInfo {
    pub entry: u64,
    pub phdr: u64,
    pub phnum: u16,
    pub phent: u16,
    /// Initial stack pointer, 16-byte aligned.
    pub sp: u64,
    pub brk: u64,
}

/// Executable bytes of one PT_LOAD segment.
#[derive(Debug, Clone)]
pub struct CodeSegment {
    pub vaddr: u64,
    pub bytes: Vec<u8>,
}

/// Parse `data` and reject anything that is not a static
/// little-endian RV64 executable.
fn parse_riscv64(data: &[u8]) -> Result<Elf<'_>, LoadError> {
    let elf = Elf::parse(data)?;
    if elf.header.e_machine != EM_RISCV {
        return Err(LoadError::UnsupportedTarget(format!(
            "e_machine {:#x} is not RISC-V",
            elf.header.e_machine
        )));
    }
    if !elf.is_64 || !elf.little_endian {
        return Err(LoadError::UnsupportedTarget(
            "only little-endian RV64 is supported".into(),
        ));
    }
    if elf.header.e_type != ET_EXEC {
        return Err(LoadError::UnsupportedTarget(format!(
            "e_type {} is not ET_EXEC",
            elf.header.e_type
        )));
    }
    if let Some(interp) = elf.interpreter {
        return Err(LoadError::UnsupportedTarget(format!(
            "dynamically linked (interpreter {interp})"
        )));
    }
    Ok(elf)
}

fn segment_data<'d>(data: &'d [u8], ph: &ProgramHeader) -> Result<&'d [u8], LoadError> {
    let start = ph.p_offset as usize;
    start
        .checked_add(ph.p_filesz as usize)
        .and_then(|end| data.get(start..end))
        .ok_or(LoadError::Truncated {
            offset: ph.p_offset,
        })
}

/// Convert ELF p_flags to mmap prot flags.
fn elf_to_prot(flags: u32) -> i32 {
    let mut prot = 0;
    if flags & PF_R != 0 {
        prot |= libc::PROT_READ;
    }
    if flags & PF_W != 0 {
        prot |= libc::PROT_WRITE;
    }
    if flags & PF_X != 0 {
        prot |= libc::PROT_EXEC;
    }
    prot
}

/// Load a static RISC-V 64-bit ELF executable from disk.
pub fn load_elf(
    path: &Path,
    space: &mut GuestSpace,
    argv: &[&str],
    envp: &[&str],
) -> Result<ElfInfo, LoadError> {
    let data = fs::read(path)?;
    load_elf_bytes(&data, space, argv, envp)
}

/// Load an in-memory ELF image and build the initial stack.
pub fn load_elf_bytes(
    data: &[u8],
    space: &mut GuestSpace,
    argv: &[&str],
    envp: &[&str],
) -> Result<ElfInfo, LoadError> {
    let elf = parse_riscv64(data)?;
    let loads: Vec<&ProgramHeader> = elf
        .program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD)
        .collect();
    let Some(first) = loads.first() else {
        return Err(LoadError::NoLoadSegment);
    };

    // PT_PHDR if present, else the headers inside the first PT_LOAD.
    let phdr = elf
        .program_headers
        .iter()
        .find(|ph| ph.p_type == PT_PHDR)
        .map(|ph| ph.p_vaddr)
        .unwrap_or(first.p_vaddr.wrapping_sub(first.p_offset) + elf.header.e_phoff);

    let stack_base = GUEST_STACK_TOP - GUEST_STACK_SIZE as u64;
    let mut brk: u64 = 0;
    for ph in loads {
        let out_of_range = LoadError::SegmentOutOfRange {
            vaddr: ph.p_vaddr,
            memsz: ph.p_memsz,
        };
        let Some((end, aligned_end)) = ph
            .p_vaddr
            .checked_add(ph.p_memsz)
            .and_then(|end| Some((end, page_align_up(end)?)))
        else {
            return Err(out_of_range);
        };
        let aligned_start = page_align_down(ph.p_vaddr);
        if aligned_end > stack_base {
            return Err(out_of_range);
        }
        let aligned_size = (aligned_end - aligned_start) as usize;
        let bytes = segment_data(data, ph)?;

        // Map RW first for the copy.
        space.mmap_fixed(
            aligned_start,
            aligned_size,
            libc::PROT_READ | libc::PROT_WRITE,
        )?;
        unsafe {
            space.write_bytes(ph.p_vaddr, bytes);
        }

        let prot = elf_to_prot(ph.p_flags);
        if prot != (libc::PROT_READ | libc::PROT_WRITE) {
            space.mprotect(aligned_start, aligned_size, prot)?;
        }
        debug!(
            target: dbt_core::log::GENERAL,
            "PT_LOAD {:#x}..{:#x} prot={prot:#x}",
            ph.p_vaddr,
            end
        );

        brk = brk.max(aligned_end);
    }
    space.set_brk(brk);

    let phnum = elf.header.e_phnum;
    let phent = elf.header.e_phentsize;
    let entry = elf.header.e_entry;
    let sp = setup_stack(space, entry, phdr, phnum, phent, argv, envp)?;

    Ok(ElfInfo {
        entry,
        phdr,
        phnum,
        phent,
        sp,
        brk,
    })
}

/// Contents of every executable PT_LOAD segment, without mapping
/// anything.
pub fn code_segments(data: &[u8]) -> Result<Vec<CodeSegment>, LoadError> {
    let elf = parse_riscv64(data)?;
    elf.program_headers
        .iter()
        .filter(|ph| ph.p_type == PT_LOAD && ph.p_flags & PF_X != 0)
        .map(|ph| {
            Ok(CodeSegment {
                vaddr: ph.p_vaddr,
                bytes: segment_data(data, ph)?.to_vec(),
            })
        })
        .collect()
}

/// Build the initial stack per the Linux ABI:
/// argc, argv, NULL, envp, NULL, auxv, AT_NULL.
fn setup_stack(
    space: &mut GuestSpace,
    entry: u64,
    phdr: u64,
    phnum: u16,
    phent: u16,
    argv: &[&str],
    envp: &[&str],
) -> Result<u64, LoadError> {
    let stack_top = GUEST_STACK_TOP;
    let stack_base = stack_top - GUEST_STACK_SIZE as u64;

    space.mmap_fixed(
        stack_base,
        GUEST_STACK_SIZE,
        libc::PROT_READ | libc::PROT_WRITE,
    )?;

    let mut pos = stack_top;

    // AT_RANDOM bytes, fixed so runs are reproducible.
    pos -= 16;
    let random_addr = pos;
    let random_data: [u8; 16] = [
        0x52, 0x56, 0x44, 0x42, 0x54, 0x2d, 0x72, 0x6e, 0x67, 0x2d, 0x73, 0x65,
        0x65, 0x64, 0x30, 0x31,
    ];
    unsafe {
        space.write_bytes(random_addr, &random_data);
    }

    // Strings are NUL-terminated by the zero-filled mapping.
    let mut push_strings = |strings: &[&str]| {
        let mut addrs: Vec<u64> = strings
            .iter()
            .rev()
            .map(|s| {
                pos -= (s.len() + 1) as u64;
                unsafe { space.write_bytes(pos, s.as_bytes()) };
                pos
            })
            .collect();
        addrs.reverse();
        addrs
    };
    let envp_addrs = push_strings(envp);
    let argv_addrs = push_strings(argv);

    let auxv: [(u64, u64); 7] = [
        (AT_PHDR, phdr),
        (AT_PHENT, phent as u64),
        (AT_PHNUM, phnum as u64),
        (AT_PAGESZ, page_size() as u64),
        (AT_ENTRY, entry),
        (AT_RANDOM, random_addr),
        (AT_NULL, 0),
    ];

    let frame_u64s =
        1 + argv_addrs.len() + 1 + envp_addrs.len() + 1 + auxv.len() * 2;
    pos &= !15;
    pos -= (frame_u64s * 8) as u64;
    pos &= !15;

    let sp = pos;
    let words = std::iter::once(argv_addrs.len() as u64)
        .chain(argv_addrs.iter().copied())
        .chain(std::iter::once(0))
        .chain(envp_addrs.iter().copied())
        .chain(std::iter::once(0))
        .chain(auxv.iter().flat_map(|&(tag, val)| [tag, val]));
    for (i, word) in words.enumerate() {
        unsafe { space.write_u64(sp + 8 * i as u64, word) };
    }

    Ok(sp)
}
