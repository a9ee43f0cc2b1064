use crate::insn::GuestInstruction;
use crate::reg::{GuestReg, NUM_GUEST_REGS};

/// Per-block register reference counts.
///
/// Zero-initialized on creation; a register that was never
/// referenced in the block has a count of exactly zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageHistogram {
    counts: [u32; NUM_GUEST_REGS],
}

impl UsageHistogram {
    pub fn new() -> Self {
        Self {
            counts: [0; NUM_GUEST_REGS],
        }
    }

    /// Count one reference to `reg`. References to x0 are ignored.
    #[inline]
    pub fn record(&mut self, reg: GuestReg) {
        if !reg.is_zero() {
            self.counts[reg.index()] += 1;
        }
    }

    /// Count every register operand of `insn`.
    pub fn record_instruction(&mut self, insn: &GuestInstruction) {
        for reg in insn.operands() {
            self.record(reg);
        }
    }

    #[inline]
    pub fn count(&self, reg: GuestReg) -> u32 {
        self.counts[reg.index()]
    }

    /// Raw counts, indexed by register id.
    pub fn counts(&self) -> &[u32; NUM_GUEST_REGS] {
        &self.counts
    }

    /// Registers referenced at least once, ascending id order.
    pub fn live(&self) -> impl Iterator<Item = (GuestReg, u32)> + '_ {
        GuestReg::all()
            .map(|r| (r, self.count(r)))
            .filter(|&(_, n)| n > 0)
    }
}

impl Default for UsageHistogram {
    fn default() -> Self {
        Self::new()
    }
}
