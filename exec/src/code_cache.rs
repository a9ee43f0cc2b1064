use std::collections::HashMap;

use dbt_backend::CodeRegion;
use dbt_core::log;
use tracing::debug;

/// Number of direct-mapped jump cache slots.
const JUMP_CACHE_SIZE: usize = 4096;

/// A translated block.
#[derive(Debug)]
pub struct CacheEntry {
    /// Guest address of the first instruction.
    pub guest: u64,
    /// Guest instructions covered, inlined jump targets included.
    pub guest_insns: usize,
    region: CodeRegion,
}

impl CacheEntry {
    /// Host entry point.
    #[inline]
    pub fn host(&self) -> u64 {
        self.region.entry() as u64
    }

    pub fn host_len(&self) -> usize {
        self.region.len()
    }
}

/// Direct-mapped `pc -> entry index` cache in front of the hash map.
struct JumpCache {
    entries: Box<[Option<usize>; JUMP_CACHE_SIZE]>,
}

impl JumpCache {
    fn new() -> Self {
        Self {
            entries: Box::new([None; JUMP_CACHE_SIZE]),
        }
    }

    fn index(pc: u64) -> usize {
        (pc as usize >> 2) & (JUMP_CACHE_SIZE - 1)
    }

    fn lookup(&self, pc: u64) -> Option<usize> {
        self.entries[Self::index(pc)]
    }

    fn insert(&mut self, pc: u64, idx: usize) {
        self.entries[Self::index(pc)] = Some(idx);
    }
}

/// Guest block address to host code.
///
/// Entries are permanent: once a block is inserted its host code is
/// neither moved, patched nor freed until the cache is dropped.
pub struct CodeCache {
    map: HashMap<u64, usize>,
    entries: Vec<CacheEntry>,
    jump_cache: JumpCache,
}

impl CodeCache {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            entries: Vec::new(),
            jump_cache: JumpCache::new(),
        }
    }

    /// Host entry for `pc`, if translated.
    pub fn lookup(&mut self, pc: u64) -> Option<u64> {
        if let Some(idx) = self.jump_cache.lookup(pc) {
            let entry = &self.entries[idx];
            if entry.guest == pc {
                return Some(entry.host());
            }
        }
        let idx = *self.map.get(&pc)?;
        self.jump_cache.insert(pc, idx);
        Some(self.entries[idx].host())
    }

    pub fn get(&self, pc: u64) -> Option<&CacheEntry> {
        self.map.get(&pc).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, pc: u64) -> bool {
        self.map.contains_key(&pc)
    }

    /// Record the translation of the block at `guest` and return its
    /// host entry. If `guest` is already present the existing entry
    /// wins and `region` is released.
    pub fn insert(&mut self, guest: u64, region: CodeRegion, guest_insns: usize) -> u64 {
        if let Some(&idx) = self.map.get(&guest) {
            debug!(target: log::CACHE, "{guest:#x} already cached, keeping first translation");
            return self.entries[idx].host();
        }
        let idx = self.entries.len();
        self.entries.push(CacheEntry {
            guest,
            guest_insns,
            region,
        });
        self.map.insert(guest, idx);
        self.jump_cache.insert(guest, idx);
        let host = self.entries[idx].host();
        debug!(
            target: log::CACHE,
            "insert {guest:#x} -> {host:#x} ({guest_insns} insns, {} bytes)",
            self.entries[idx].host_len()
        );
        host
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in translation order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    /// Total bytes of host code.
    pub fn code_size(&self) -> usize {
        self.entries.iter().map(CacheEntry::host_len).sum()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::new()
    }
}
