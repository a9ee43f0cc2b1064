//! Return address prediction shared between translated code and the
//! dispatcher.
//!
//! Call sites push `(guest return address, host entry)` pairs and
//! return sites pop them, so a return whose target is already
//! translated jumps straight to the host code without a round trip
//! through the dispatcher. Translated code manipulates the ring
//! directly through the field offsets exported here.

use std::fmt;

/// Number of entries. Must be a power of two.
pub const RETURN_STACK_CAPACITY: usize = 64;

/// `index & RETURN_STACK_MASK` maps a cursor to a slot.
pub const RETURN_STACK_MASK: u64 = RETURN_STACK_CAPACITY as u64 - 1;

/// log2 of the entry size, for scaled indexing.
pub const RETURN_ENTRY_SHIFT: u8 = 4;

pub const RETURN_ENTRIES_OFFSET: i32 = 0;
pub const RETURN_FRONT_OFFSET: i32 = (RETURN_STACK_CAPACITY * 16) as i32;
pub const RETURN_BACK_OFFSET: i32 = RETURN_FRONT_OFFSET + 8;
pub const RETURN_HITS_OFFSET: i32 = RETURN_BACK_OFFSET + 8;

const _: () = assert!(RETURN_STACK_CAPACITY.is_power_of_two());
const _: () = assert!(std::mem::size_of::<ReturnEntry>() == 1 << RETURN_ENTRY_SHIFT);
const _: () = assert!(std::mem::offset_of!(ReturnStack, front) == RETURN_FRONT_OFFSET as usize);
const _: () = assert!(std::mem::offset_of!(ReturnStack, back) == RETURN_BACK_OFFSET as usize);
const _: () = assert!(std::mem::offset_of!(ReturnStack, hits) == RETURN_HITS_OFFSET as usize);

/// One predicted return.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnEntry {
    /// Guest address the callee is expected to return to.
    pub guest: u64,
    /// Host entry of the block at `guest`, or 0 if it was not
    /// translated when the call site was.
    pub host: u64,
}

/// Bounded LIFO of predicted returns with monotonically advancing
/// cursors. `back - front` never exceeds the capacity; pushing onto a
/// full stack drops the oldest entry.
#[repr(C)]
pub struct ReturnStack {
    entries: [ReturnEntry; RETURN_STACK_CAPACITY],
    front: u64,
    back: u64,
    /// Pops that jumped straight into host code.
    hits: u64,
}

impl ReturnStack {
    pub fn new() -> Self {
        Self {
            entries: [ReturnEntry::default(); RETURN_STACK_CAPACITY],
            front: 0,
            back: 0,
            hits: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        RETURN_STACK_CAPACITY
    }

    pub fn len(&self) -> usize {
        (self.back - self.front) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.back == self.front
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn push(&mut self, guest: u64, host: u64) {
        self.entries[(self.back & RETURN_STACK_MASK) as usize] = ReturnEntry { guest, host };
        self.back += 1;
        if self.back - self.front > RETURN_STACK_CAPACITY as u64 {
            self.front = self.back - RETURN_STACK_CAPACITY as u64;
        }
    }

    /// Remove the most recent entry.
    pub fn pop(&mut self) -> Option<ReturnEntry> {
        if self.is_empty() {
            return None;
        }
        self.back -= 1;
        Some(self.entries[(self.back & RETURN_STACK_MASK) as usize])
    }

    /// Pop and check the prediction against the actual return target.
    /// Returns the host entry on a hit; the entry is consumed either way.
    pub fn pop_match(&mut self, target: u64) -> Option<u64> {
        let entry = self.pop()?;
        if entry.guest != target || entry.host == 0 {
            return None;
        }
        self.hits += 1;
        Some(entry.host)
    }

    pub fn clear(&mut self) {
        self.front = 0;
        self.back = 0;
    }
}

impl Default for ReturnStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReturnStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnStack")
            .field("front", &self.front)
            .field("back", &self.back)
            .field("hits", &self.hits)
            .finish()
    }
}
