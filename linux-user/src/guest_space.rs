use std::io;
use std::ops::Range;
use std::ptr::{self, NonNull};

use dbt_core::GuestMemory;

/// Guest address space size: 1 GiB.
const GUEST_SPACE_SIZE: usize = 1 << 30;

/// Default guest stack top address.
pub const GUEST_STACK_TOP: u64 = 0x3FFF_0000;

/// Default guest stack size: 8 MiB.
pub const GUEST_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Flat guest address space backed by one host reservation.
///
/// Guest address `a` lives at host `base + a`, which is exactly the
/// `guest_base` translated loads and stores add to their effective
/// addresses. The reservation starts out PROT_NONE; the loader and
/// the mmap/brk syscalls map pieces of it on demand.
pub struct GuestSpace {
    base: NonNull<u8>,
    size: usize,
    brk: u64,
    /// Ranges mapped readable or executable. Instruction fetch only
    /// succeeds inside one of these.
    readable: RangeSet,
}

/// Sorted, disjoint, coalesced set of guest address ranges.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct RangeSet(Vec<Range<u64>>);

impl RangeSet {
    fn covers(&self, start: u64, end: u64) -> bool {
        let i = self.0.partition_point(|r| r.end < end);
        self.0.get(i).is_some_and(|r| r.start <= start && end <= r.end)
    }

    /// Punch `cut` out of every range it overlaps.
    fn remove(&mut self, cut: &Range<u64>) {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        for r in self.0.drain(..) {
            if r.end <= cut.start || cut.end <= r.start {
                out.push(r);
                continue;
            }
            if r.start < cut.start {
                out.push(r.start..cut.start);
            }
            if cut.end < r.end {
                out.push(cut.end..r.end);
            }
        }
        self.0 = out;
    }

    fn insert(&mut self, range: Range<u64>) {
        self.remove(&range);
        let at = self.0.partition_point(|r| r.start < range.start);
        self.0.insert(at, range);

        let mut merged: Vec<Range<u64>> = Vec::with_capacity(self.0.len());
        for r in self.0.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end == r.start => last.end = r.end,
                _ => merged.push(r),
            }
        }
        self.0 = merged;
    }
}

// SAFETY: the reservation is owned exclusively by this value.
unsafe impl Send for GuestSpace {}

impl GuestSpace {
    /// Reserve a 1 GiB guest address space.
    pub fn new() -> io::Result<Self> {
        // SAFETY: anonymous PROT_NONE reservation, nothing is aliased.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                GUEST_SPACE_SIZE,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;
        Ok(Self {
            base,
            size: GUEST_SPACE_SIZE,
            brk: 0,
            readable: RangeSet::default(),
        })
    }

    /// Size of the reservation in bytes.
    pub fn size(&self) -> u64 {
        self.size as u64
    }

    /// Whether `[addr, addr + len)` lies inside the reservation.
    pub fn contains(&self, addr: u64, len: u64) -> bool {
        addr.checked_add(len).is_some_and(|end| end <= self.size())
    }

    /// Whether `[addr, addr + len)` lies inside one readable mapping.
    pub fn is_mapped(&self, addr: u64, len: u64) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        self.readable.covers(addr, end)
    }

    /// Host pointer for a guest buffer, if all of it is inside the
    /// reservation.
    pub fn host_range(&self, guest_addr: u64, len: u64) -> Option<*mut u8> {
        // SAFETY: the offset stays inside the reservation.
        self.contains(guest_addr, len)
            .then(|| unsafe { self.base.as_ptr().add(guest_addr as usize) })
    }

    fn host_range_or_einval(&self, guest_addr: u64, len: usize) -> io::Result<*mut u8> {
        self.host_range(guest_addr, len as u64)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))
    }

    /// Current program break (guest address).
    #[inline]
    pub fn brk(&self) -> u64 {
        self.brk
    }

    #[inline]
    pub fn set_brk(&mut self, brk: u64) {
        self.brk = brk;
    }

    /// Map a fixed, zero-filled region within the guest space.
    pub fn mmap_fixed(&mut self, guest_addr: u64, size: usize, prot: i32) -> io::Result<()> {
        let host = self.host_range_or_einval(guest_addr, size)?;
        // SAFETY: MAP_FIXED over part of our own reservation.
        let ret = unsafe {
            libc::mmap(
                host.cast(),
                size,
                prot,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
                -1,
                0,
            )
        };
        if ret == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        self.track(guest_addr..guest_addr + size as u64, prot);
        Ok(())
    }

    /// Change protection on a guest region.
    pub fn mprotect(&mut self, guest_addr: u64, size: usize, prot: i32) -> io::Result<()> {
        let host = self.host_range_or_einval(guest_addr, size)?;
        // SAFETY: the range is inside our reservation.
        if unsafe { libc::mprotect(host.cast(), size, prot) } != 0 {
            return Err(io::Error::last_os_error());
        }
        self.track(guest_addr..guest_addr + size as u64, prot);
        Ok(())
    }

    /// Map `size` bytes of the open host file `fd` at `offset` over a
    /// guest region, private or shared as the guest asked.
    pub fn mmap_file(
        &mut self,
        guest_addr: u64,
        size: usize,
        prot: i32,
        shared: bool,
        fd: i32,
        offset: i64,
    ) -> io::Result<()> {
        let host = self.host_range_or_einval(guest_addr, size)?;
        let sharing = if shared {
            libc::MAP_SHARED
        } else {
            libc::MAP_PRIVATE
        };
        // SAFETY: MAP_FIXED over part of our own reservation.
        let ret = unsafe {
            libc::mmap(
                host.cast(),
                size,
                prot,
                sharing | libc::MAP_FIXED,
                fd,
                offset as libc::off_t,
            )
        };
        if ret == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        self.track(guest_addr..guest_addr + size as u64, prot);
        Ok(())
    }

    /// Give a guest region back: it reverts to an inaccessible part of
    /// the reservation.
    pub fn unmap(&mut self, guest_addr: u64, size: usize) -> io::Result<()> {
        let host = self.host_range_or_einval(guest_addr, size)?;
        // SAFETY: MAP_FIXED over part of our own reservation.
        let ret = unsafe {
            libc::mmap(
                host.cast(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_FIXED,
                -1,
                0,
            )
        };
        if ret == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        self.track(guest_addr..guest_addr + size as u64, libc::PROT_NONE);
        Ok(())
    }

    fn track(&mut self, range: Range<u64>, prot: i32) {
        if prot & (libc::PROT_READ | libc::PROT_EXEC) != 0 {
            self.readable.insert(range);
        } else {
            self.readable.remove(&range);
        }
    }

    /// Copy `data` to a guest address.
    ///
    /// # Safety
    /// The guest range must be mapped writable.
    pub unsafe fn write_bytes(&self, guest_addr: u64, data: &[u8]) {
        let dst = self.host_ptr(guest_addr, data.len());
        ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }

    /// # Safety
    /// The guest range must be mapped writable.
    pub unsafe fn write_u64(&self, guest_addr: u64, val: u64) {
        self.host_ptr(guest_addr, 8).cast::<u64>().write_unaligned(val.to_le());
    }

    /// # Safety
    /// The guest range must be mapped readable.
    pub unsafe fn read_u64(&self, guest_addr: u64) -> u64 {
        u64::from_le(self.host_ptr(guest_addr, 8).cast::<u64>().read_unaligned())
    }

    fn host_ptr(&self, guest_addr: u64, len: usize) -> *mut u8 {
        match self.host_range(guest_addr, len as u64) {
            Some(p) => p,
            None => panic!("guest range {guest_addr:#x}+{len:#x} outside the guest space"),
        }
    }
}

impl GuestMemory for GuestSpace {
    fn fetch_insn(&self, addr: u64) -> Option<u32> {
        if !self.is_mapped(addr, 4) {
            return None;
        }
        let host = self.host_range(addr, 4)?;
        // SAFETY: inside a readable mapping.
        let word = unsafe { host.cast::<u32>().read_unaligned() };
        Some(u32::from_le(word))
    }

    fn host_base(&self) -> u64 {
        self.base.as_ptr() as u64
    }
}

impl Drop for GuestSpace {
    fn drop(&mut self) {
        // SAFETY: unmaps exactly the reservation made in `new`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.size);
        }
    }
}

pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

/// Round `addr` up to a page boundary, or `None` if that overflows.
pub fn page_align_up(addr: u64) -> Option<u64> {
    let mask = page_size() as u64 - 1;
    addr.checked_add(mask).map(|a| a & !mask)
}

pub fn page_align_down(addr: u64) -> u64 {
    addr & !(page_size() as u64 - 1)
}
