use std::fmt;

/// Number of guest integer registers (x0-x31).
pub const NUM_GUEST_REGS: usize = 32;

/// ABI names, indexed by register number.
const ABI_NAMES: [&str; NUM_GUEST_REGS] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1",
    "a2", "a3", "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// A guest integer register id (x0-x31).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GuestReg(u8);

impl GuestReg {
    /// Hard-wired zero register.
    pub const ZERO: GuestReg = GuestReg(0);
    /// Return address (x1).
    pub const RA: GuestReg = GuestReg(1);
    /// Stack pointer (x2).
    pub const SP: GuestReg = GuestReg(2);
    /// Alternate link register (x5).
    pub const T0: GuestReg = GuestReg(5);
    /// First argument / return value (x10).
    pub const A0: GuestReg = GuestReg(10);
    /// Syscall number register (x17).
    pub const A7: GuestReg = GuestReg(17);

    pub const fn new(id: u8) -> Self {
        assert!((id as usize) < NUM_GUEST_REGS, "guest register out of range");
        Self(id)
    }

    /// Build from a 5-bit instruction field.
    #[inline]
    pub const fn from_field(bits: u32) -> Self {
        Self((bits & 0x1f) as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `ra` or `t0`: the registers the calling convention
    /// uses for return addresses.
    #[inline]
    pub const fn is_link(self) -> bool {
        self.0 == 1 || self.0 == 5
    }

    pub fn abi_name(self) -> &'static str {
        ABI_NAMES[self.index()]
    }

    /// All registers in ascending id order.
    pub fn all() -> impl Iterator<Item = GuestReg> {
        (0..NUM_GUEST_REGS as u8).map(GuestReg)
    }
}

impl fmt::Display for GuestReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abi_name())
    }
}
