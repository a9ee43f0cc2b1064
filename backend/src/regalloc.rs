//! Usage-driven static register allocation.
//!
//! Each block gets one fixed guest-to-host mapping for its whole
//! body: the most referenced guest registers live in host registers,
//! everything else is accessed through the register file.

use std::fmt;

use dbt_core::{log, GuestReg, UsageHistogram, NUM_GUEST_REGS};
use tracing::trace;

use crate::x86_64::regs::{Reg, ALLOC_POOL, REGFILE_BASE};

/// Guest-to-host register mapping for one block.
///
/// Invariants: `x0` is never mapped, no host register backs two guest
/// registers, and every mapped host register comes from the pool.
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterMapping {
    map: [Option<Reg>; NUM_GUEST_REGS],
    base: Reg,
}

impl RegisterMapping {
    /// Mapping with every guest register in memory.
    pub fn unmapped() -> Self {
        Self {
            map: [None; NUM_GUEST_REGS],
            base: REGFILE_BASE,
        }
    }

    /// Host register holding `reg`, if it is mapped.
    #[inline]
    pub fn host(&self, reg: GuestReg) -> Option<Reg> {
        self.map[reg.index()]
    }

    #[inline]
    pub fn is_mapped(&self, reg: GuestReg) -> bool {
        self.host(reg).is_some()
    }

    /// Host register holding the register file base address.
    #[inline]
    pub fn base(&self) -> Reg {
        self.base
    }

    /// Mapped pairs in guest register order.
    pub fn mapped(&self) -> impl Iterator<Item = (GuestReg, Reg)> + '_ {
        GuestReg::all().filter_map(|g| self.host(g).map(|h| (g, h)))
    }

    pub fn mapped_count(&self) -> usize {
        self.map.iter().flatten().count()
    }

    fn assign(&mut self, guest: GuestReg, host: Reg) {
        debug_assert!(!guest.is_zero());
        debug_assert!(!self.map.contains(&Some(host)));
        self.map[guest.index()] = Some(host);
    }
}

impl Default for RegisterMapping {
    fn default() -> Self {
        Self::unmapped()
    }
}

impl fmt::Debug for RegisterMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (g, h) in self.mapped() {
            m.entry(&g.abi_name(), &h.name());
        }
        m.finish()
    }
}

/// Choose host registers for the hottest guest registers.
///
/// Guest registers are ranked by reference count (ties keep the lower
/// register number first). Walking that order, every register other
/// than `x0` whose count exceeds `threshold` takes the next free pool
/// slot until the pool runs out.
pub fn allocate(usage: &UsageHistogram, threshold: u32) -> RegisterMapping {
    let mut order: Vec<GuestReg> = GuestReg::all().collect();
    order.sort_by_key(|&r| std::cmp::Reverse(usage.count(r)));

    let mut mapping = RegisterMapping::unmapped();
    let mut pool = ALLOC_POOL.iter().copied();
    for guest in order {
        if guest.is_zero() || usage.count(guest) <= threshold {
            continue;
        }
        let Some(host) = pool.next() else {
            break;
        };
        mapping.assign(guest, host);
    }

    trace!(target: log::REGS, ?mapping, "register allocation");
    mapping
}
