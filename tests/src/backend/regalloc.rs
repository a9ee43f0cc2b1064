use std::collections::HashSet;

use dbt_backend::x86_64::regs::ALLOC_POOL;
use dbt_backend::x86_64::Reg;
use dbt_backend::{allocate, RegisterMapping};
use dbt_core::{GuestReg, UsageHistogram};
use proptest::prelude::*;

fn histogram(counts: &[(u8, u32)]) -> UsageHistogram {
    let mut usage = UsageHistogram::new();
    for &(reg, n) in counts {
        for _ in 0..n {
            usage.record(GuestReg::new(reg));
        }
    }
    usage
}

#[test]
fn test_only_hot_registers_mapped() {
    // t0 = 3, a0 = 2: a0 sits exactly at the threshold.
    let usage = histogram(&[(5, 3), (10, 2), (6, 1)]);
    let mapping = allocate(&usage, 2);
    assert_eq!(mapping.mapped_count(), 1);
    assert_eq!(mapping.host(GuestReg::T0), Some(Reg::R8));
    assert!(!mapping.is_mapped(GuestReg::A0));
    assert_eq!(mapping.base(), Reg::Rbp);
}

#[test]
fn test_hotter_register_gets_first_slot() {
    let usage = histogram(&[(10, 4), (11, 9), (12, 4)]);
    let mapping = allocate(&usage, 2);
    let pairs: Vec<(GuestReg, Reg)> = mapping.mapped().collect();
    assert_eq!(
        pairs,
        vec![
            (GuestReg::new(10), Reg::R9),
            (GuestReg::new(11), Reg::R8),
            (GuestReg::new(12), Reg::R10),
        ]
    );
}

#[test]
fn test_pool_exhaustion() {
    let counts: Vec<(u8, u32)> = (1..=12).map(|r| (r, 20 - r as u32)).collect();
    let mapping = allocate(&histogram(&counts), 2);
    assert_eq!(mapping.mapped_count(), ALLOC_POOL.len());
    // The four coldest candidates stay in memory.
    for r in 9..=12 {
        assert!(!mapping.is_mapped(GuestReg::new(r)));
    }
}

#[test]
fn test_empty_histogram() {
    let mapping = allocate(&UsageHistogram::new(), 2);
    assert_eq!(mapping, RegisterMapping::unmapped());
    assert_eq!(mapping.mapped().count(), 0);
}

proptest! {
    #[test]
    fn prop_allocation_invariants(
        counts in prop::collection::vec(0u32..12, 32),
        threshold in 0u32..6,
    ) {
        let pairs: Vec<(u8, u32)> = counts
            .iter()
            .enumerate()
            .map(|(r, &n)| (r as u8, n))
            .collect();
        let usage = histogram(&pairs);
        let mapping = allocate(&usage, threshold);

        prop_assert!(!mapping.is_mapped(GuestReg::ZERO));
        prop_assert!(mapping.mapped_count() <= ALLOC_POOL.len());

        let hosts: HashSet<Reg> = mapping.mapped().map(|(_, h)| h).collect();
        prop_assert_eq!(hosts.len(), mapping.mapped_count());
        prop_assert!(hosts.iter().all(|h| ALLOC_POOL.contains(h)));

        for (guest, _) in mapping.mapped() {
            prop_assert!(usage.count(guest) > threshold);
        }

        // Any unmapped candidate means the pool is full of registers
        // used at least as often.
        let coldest_mapped = mapping.mapped().map(|(g, _)| usage.count(g)).min();
        for guest in GuestReg::all().filter(|g| !g.is_zero()) {
            if usage.count(guest) > threshold && !mapping.is_mapped(guest) {
                prop_assert_eq!(mapping.mapped_count(), ALLOC_POOL.len());
                prop_assert!(coldest_mapped.unwrap_or(0) >= usage.count(guest));
            }
        }
    }
}
