use dbt_core::{log, GuestReg, RegisterFile};
use tracing::{debug, warn};

use crate::guest_space::{page_align_up, page_size, GuestSpace};

// RISC-V Linux syscall numbers
const SYS_READ: u64 = 63;
const SYS_WRITE: u64 = 64;
const SYS_WRITEV: u64 = 66;
const SYS_EXIT: u64 = 93;
const SYS_EXIT_GROUP: u64 = 94;
const SYS_BRK: u64 = 214;
const SYS_MMAP: u64 = 222;
const SYS_MPROTECT: u64 = 226;
const SYS_MUNMAP: u64 = 215;
const SYS_SET_TID_ADDRESS: u64 = 96;
const SYS_SET_ROBUST_LIST: u64 = 99;
const SYS_PRLIMIT64: u64 = 261;
const SYS_GETRANDOM: u64 = 278;
const SYS_RSEQ: u64 = 293;
const SYS_RT_SIGACTION: u64 = 134;
const SYS_RT_SIGPROCMASK: u64 = 135;
const SYS_GETPID: u64 = 172;
const SYS_GETTID: u64 = 178;
const SYS_UNAME: u64 = 160;
const SYS_READLINKAT: u64 = 78;
const SYS_IOCTL: u64 = 29;
const SYS_CLOSE: u64 = 57;
const SYS_FSTAT: u64 = 80;
const SYS_CLOCK_GETTIME: u64 = 113;
const SYS_MADVISE: u64 = 233;

const fn neg_errno(e: i32) -> u64 {
    (-(e as i64)) as u64
}

const ENOSYS: u64 = neg_errno(libc::ENOSYS);
const EFAULT: u64 = neg_errno(libc::EFAULT);
const ENOMEM: u64 = neg_errno(libc::ENOMEM);
const EINVAL: u64 = neg_errno(libc::EINVAL);

/// Gap left between the program break and the first anonymous mmap.
const MMAP_GAP: u64 = 0x1000_0000;

/// Syscall dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    /// Continue execution (return value in a0).
    Continue(u64),
    /// Program exited with given code.
    Exit(i32),
    /// Syscall number the emulation does not know; execution stops.
    Unsupported(u64),
}

/// State the syscall layer keeps between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallState {
    /// Next address handed out to a mapping without MAP_FIXED.
    pub mmap_next: u64,
    /// Answer unknown syscalls with -ENOSYS instead of stopping.
    pub fail_silently: bool,
}

impl SyscallState {
    /// Place the mmap cursor a fixed gap above the initial break.
    pub fn new(brk: u64, fail_silently: bool) -> Self {
        let mmap_next = page_align_up(brk)
            .and_then(|b| b.checked_add(MMAP_GAP))
            .unwrap_or(u64::MAX);
        Self {
            mmap_next,
            fail_silently,
        }
    }
}

/// Syscall argument `n` (a0-a5).
fn arg(regs: &RegisterFile, n: u8) -> u64 {
    regs.get(GuestReg::new(10 + n))
}

/// Host result of a libc call, as the guest sees it.
fn host_ret(ret: isize) -> u64 {
    if ret < 0 {
        let e = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        neg_errno(e)
    } else {
        ret as u64
    }
}

/// Handle a RISC-V Linux syscall.
///
/// Syscall number in a7, args in a0-a5. The caller writes a
/// `Continue` value to a0 and steps `pc` past the ECALL.
pub fn handle_syscall(
    space: &mut GuestSpace,
    regs: &RegisterFile,
    state: &mut SyscallState,
) -> SyscallResult {
    let nr = regs.get(GuestReg::A7);
    let (a0, a1, a2) = (arg(regs, 0), arg(regs, 1), arg(regs, 2));
    debug!(target: log::GENERAL, nr, a0, a1, a2, "syscall");

    let ret = match nr {
        SYS_READ | SYS_WRITE => {
            let Some(buf) = space.host_range(a1, a2) else {
                return SyscallResult::Continue(EFAULT);
            };
            let fd = a0 as i32;
            let len = a2 as usize;
            let ret = unsafe {
                if nr == SYS_READ {
                    libc::read(fd, buf as *mut libc::c_void, len)
                } else {
                    libc::write(fd, buf as *const libc::c_void, len)
                }
            };
            host_ret(ret)
        }
        SYS_WRITEV => sys_writev(space, a0 as i32, a1, a2),
        SYS_EXIT | SYS_EXIT_GROUP => return SyscallResult::Exit(a0 as i32),
        SYS_BRK => sys_brk(space, a0),
        SYS_MMAP => sys_mmap(
            space,
            state,
            Mmap {
                addr: a0,
                len: a1,
                prot: a2 as i32,
                flags: arg(regs, 3) as i32,
                fd: arg(regs, 4) as i32,
                offset: arg(regs, 5),
            },
        ),
        SYS_MUNMAP => sys_munmap(space, a0, a1),
        SYS_MPROTECT => match page_span(a0, a1) {
            Some(size) => match space.mprotect(a0, size, a2 as i32) {
                Ok(()) => 0,
                Err(_) => ENOMEM,
            },
            None => EINVAL,
        },
        // Stubs that return success
        SYS_SET_ROBUST_LIST | SYS_RT_SIGACTION | SYS_RT_SIGPROCMASK | SYS_MADVISE
        | SYS_CLOSE => 0,
        // Fake TID/PID
        SYS_SET_TID_ADDRESS | SYS_GETPID | SYS_GETTID => 1,
        SYS_GETRANDOM => {
            // Zero-filled, deterministic.
            let Some(host) = space.host_range(a0, a1) else {
                return SyscallResult::Continue(EFAULT);
            };
            unsafe {
                std::ptr::write_bytes(host, 0, a1 as usize);
            }
            a1
        }
        // Known to the C library, which copes with -ENOSYS.
        SYS_RSEQ | SYS_PRLIMIT64 | SYS_UNAME | SYS_READLINKAT | SYS_IOCTL
        | SYS_FSTAT | SYS_CLOCK_GETTIME => {
            debug!(target: log::GENERAL, nr, "unimplemented syscall -> -ENOSYS");
            ENOSYS
        }
        _ if state.fail_silently => ENOSYS,
        _ => {
            warn!(target: log::GENERAL, nr, "unknown syscall");
            return SyscallResult::Unsupported(nr);
        }
    };
    SyscallResult::Continue(ret)
}

/// Arguments of an mmap call.
#[derive(Debug, Clone, Copy)]
struct Mmap {
    addr: u64,
    len: u64,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: u64,
}

/// Page-rounded size of `[addr, addr + len)`, if `addr` is page
/// aligned and the length is nonzero and does not overflow.
fn page_span(addr: u64, len: u64) -> Option<usize> {
    if len == 0 || addr % page_size() as u64 != 0 {
        return None;
    }
    let size = page_align_up(len)?;
    addr.checked_add(size)?;
    usize::try_from(size).ok()
}

fn sys_mmap(space: &mut GuestSpace, state: &mut SyscallState, req: Mmap) -> u64 {
    if req.len == 0 || req.offset % page_size() as u64 != 0 {
        return EINVAL;
    }
    let Some(size) = page_align_up(req.len) else {
        return ENOMEM;
    };

    // Without MAP_FIXED the address is only a hint; placement always
    // comes from the cursor.
    let fixed = req.flags & libc::MAP_FIXED != 0;
    let guest_addr = if fixed {
        if req.addr % page_size() as u64 != 0 {
            return EINVAL;
        }
        req.addr
    } else {
        state.mmap_next
    };
    let Some(end) = guest_addr.checked_add(size).filter(|&end| end <= space.size()) else {
        return ENOMEM;
    };

    let mapped = if req.flags & libc::MAP_ANONYMOUS != 0 {
        space.mmap_fixed(guest_addr, size as usize, req.prot)
    } else {
        let shared = req.flags & libc::MAP_SHARED != 0;
        space.mmap_file(
            guest_addr,
            size as usize,
            req.prot,
            shared,
            req.fd,
            req.offset as i64,
        )
    };
    match mapped {
        Ok(()) => {
            if !fixed {
                state.mmap_next = end;
            }
            guest_addr
        }
        Err(e) => neg_errno(e.raw_os_error().unwrap_or(libc::ENOMEM)),
    }
}

fn sys_munmap(space: &mut GuestSpace, addr: u64, len: u64) -> u64 {
    let Some(size) = page_span(addr, len) else {
        return EINVAL;
    };
    match space.unmap(addr, size) {
        Ok(()) => 0,
        Err(_) => EINVAL,
    }
}

fn sys_brk(space: &mut GuestSpace, want: u64) -> u64 {
    let old = space.brk();
    if want <= old {
        return old;
    }
    let (Some(old_aligned), Some(new_aligned)) = (page_align_up(old), page_align_up(want)) else {
        return old;
    };
    if new_aligned > old_aligned {
        let size = (new_aligned - old_aligned) as usize;
        if space
            .mmap_fixed(old_aligned, size, libc::PROT_READ | libc::PROT_WRITE)
            .is_err()
        {
            return old;
        }
    }
    space.set_brk(want);
    want
}

fn sys_writev(space: &GuestSpace, fd: i32, iov: u64, iovcnt: u64) -> u64 {
    let mut total: u64 = 0;
    for i in 0..iovcnt {
        let entry = iov + i * 16;
        if !space.contains(entry, 16) {
            return EFAULT;
        }
        // SAFETY: inside the reservation; the guest owns the iovec.
        let (base, len) = unsafe { (space.read_u64(entry), space.read_u64(entry + 8)) };
        let Some(buf) = space.host_range(base, len) else {
            return EFAULT;
        };
        let ret = unsafe { libc::write(fd, buf as *const libc::c_void, len as usize) };
        if ret < 0 {
            return host_ret(ret);
        }
        total += ret as u64;
    }
    total
}
