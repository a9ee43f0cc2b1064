/// Guest memory as seen by the translator.
pub trait GuestMemory {
    /// Read the 32-bit instruction word at `addr`, or `None` if the
    /// address is not backed by guest memory.
    fn fetch_insn(&self, addr: u64) -> Option<u32>;

    /// Host address of guest address 0. Translated loads and stores
    /// add this to every effective address.
    fn host_base(&self) -> u64;
}

impl GuestMemory for [u8] {
    fn fetch_insn(&self, addr: u64) -> Option<u32> {
        let start = usize::try_from(addr).ok()?;
        let bytes = self.get(start..start.checked_add(4)?)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn host_base(&self) -> u64 {
        self.as_ptr() as u64
    }
}

impl GuestMemory for Vec<u8> {
    fn fetch_insn(&self, addr: u64) -> Option<u32> {
        self.as_slice().fetch_insn(addr)
    }

    fn host_base(&self) -> u64 {
        self.as_ptr() as u64
    }
}
