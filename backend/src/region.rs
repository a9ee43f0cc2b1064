use std::io;
use std::ptr;

use dbt_core::{log, TranslateError};
use tracing::debug;

use crate::code_buffer::CodeBuffer;
use crate::disas;

/// An executable copy of one finalized block.
///
/// The mapping is read+write only while the code is copied in and
/// read+execute from then on; it is never writable and executable at
/// the same time.
pub struct CodeRegion {
    ptr: *mut u8,
    size: usize,
    len: usize,
}

impl CodeRegion {
    /// Map a region sized for `code` (rounded up to pages), copy the
    /// code in and make it executable.
    pub fn new(code: &[u8]) -> io::Result<Self> {
        let page_size = page_size();
        let size = (code.len().max(1) + page_size - 1) & !(page_size - 1);

        // SAFETY: mmap with MAP_ANONYMOUS | MAP_PRIVATE, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        // Dropping `region` on an error path unmaps it.
        let region = Self {
            ptr: ptr as *mut u8,
            size,
            len: code.len(),
        };
        // SAFETY: the mapping is writable and at least code.len() bytes.
        unsafe { ptr::copy_nonoverlapping(code.as_ptr(), region.ptr, code.len()) };
        region.protect(libc::PROT_READ | libc::PROT_EXEC)?;
        flush_icache(region.ptr, region.len);
        Ok(region)
    }

    fn protect(&self, prot: libc::c_int) -> io::Result<()> {
        let ret = unsafe { libc::mprotect(self.ptr as *mut libc::c_void, self.size, prot) };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Host entry point.
    #[inline]
    pub fn entry(&self) -> *const u8 {
        self.ptr as *const u8
    }

    /// Length of the code, not of the mapping.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mapped size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+len was written in `new` and stays mapped.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl Drop for CodeRegion {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

impl std::fmt::Debug for CodeRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeRegion")
            .field("entry", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: CodeRegion owns its mmap'd memory exclusively and never
// writes to it after construction.
unsafe impl Send for CodeRegion {}

fn page_size() -> usize {
    // SAFETY: sysconf is always safe to call.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// x86-64 keeps instruction fetch coherent with stores, and the
/// mprotect above is serializing; only the compiler must not move the
/// copy past the first call into the region.
fn flush_icache(_ptr: *const u8, _len: usize) {
    std::sync::atomic::compiler_fence(std::sync::atomic::Ordering::SeqCst);
}

/// Resolve labels and copy `buf` into a fresh executable region.
///
/// On error nothing stays mapped.
pub fn finalize(mut buf: CodeBuffer) -> Result<CodeRegion, TranslateError> {
    buf.resolve_links()?;
    let region = CodeRegion::new(buf.as_slice()).map_err(TranslateError::Alloc)?;
    debug!(
        target: log::ASM_OUT,
        "finalized {} bytes at {:p}",
        region.len(),
        region.entry()
    );
    disas::log_code(region.as_slice(), region.entry() as u64);
    Ok(region)
}
