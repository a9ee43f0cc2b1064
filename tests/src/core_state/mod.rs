use dbt_core::{
    gpr_offset, GuestReg, RegisterFile, ReturnStack, TranslatorConfig, UsageHistogram,
    PC_OFFSET, RETURN_STACK_CAPACITY,
};
use dbt_frontend::decode;
use proptest::prelude::*;

use crate::rv::*;

// ── Usage histogram ───────────────────────────────────────────

#[test]
fn test_histogram_starts_zeroed() {
    let usage = UsageHistogram::new();
    assert!(usage.counts().iter().all(|&n| n == 0));
    assert_eq!(usage.live().count(), 0);
}

#[test]
fn test_histogram_counts_reads_and_writes() {
    let mut usage = UsageHistogram::new();
    // t0 read and written, t1 read.
    usage.record_instruction(&decode(0, addi(T0, T0, 1)));
    usage.record_instruction(&decode(4, blt(T0, T1, -4)));
    usage.record(GuestReg::ZERO);

    assert_eq!(usage.count(GuestReg::new(T0 as u8)), 3);
    assert_eq!(usage.count(GuestReg::new(T1 as u8)), 1);
    assert_eq!(usage.count(GuestReg::ZERO), 0);
    assert_eq!(
        usage.live().collect::<Vec<_>>(),
        vec![(GuestReg::new(5), 3), (GuestReg::new(6), 1)]
    );
}

// ── Register file ─────────────────────────────────────────────

#[test]
fn test_regfile_layout() {
    assert_eq!(gpr_offset(GuestReg::A0), 80);
    assert_eq!(PC_OFFSET, 256);
    let mut regs = RegisterFile::new();
    regs.set(GuestReg::ZERO, 7);
    regs.set(GuestReg::A0, 7);
    assert_eq!(regs.get(GuestReg::ZERO), 0);
    assert_eq!(regs.gpr[10], 7);
}

#[test]
fn test_config_block_limit() {
    let config = TranslatorConfig::default();
    assert_eq!(config.block_limit(), 512);
    assert!(config.return_stack);
    assert_eq!(config.alloc_threshold, 2);

    let single = TranslatorConfig {
        single_step: true,
        ..config.clone()
    };
    assert_eq!(single.block_limit(), 1);

    let zero = TranslatorConfig {
        max_block_insns: 0,
        ..config
    };
    assert_eq!(zero.block_limit(), 1);
}

#[test]
fn test_config_optimize_gates_allocation_and_return_stack() {
    let config = TranslatorConfig::default();
    assert!(config.allocates_registers());
    assert!(config.uses_return_stack());
    assert!(!config.fail_silently);

    let plain = TranslatorConfig {
        optimize: false,
        ..config.clone()
    };
    assert!(!plain.allocates_registers());
    assert!(!plain.uses_return_stack());

    let no_stack = TranslatorConfig {
        return_stack: false,
        ..config
    };
    assert!(no_stack.allocates_registers());
    assert!(!no_stack.uses_return_stack());
}

// ── Return stack ──────────────────────────────────────────────

#[test]
fn test_return_stack_empty_pop() {
    let mut rs = ReturnStack::new();
    assert!(rs.is_empty());
    assert_eq!(rs.pop(), None);
    assert_eq!(rs.pop_match(0x100), None);
    assert_eq!(rs.hits(), 0);
}

#[test]
fn test_return_stack_pop_match() {
    let mut rs = ReturnStack::new();
    rs.push(0x100, 0xdead_0000);
    rs.push(0x200, 0);
    rs.push(0x300, 0xbeef_0000);

    // Wrong target: consumed, no hit.
    assert_eq!(rs.pop_match(0x304), None);
    // Right target but never translated: no hit.
    assert_eq!(rs.pop_match(0x200), None);
    assert_eq!(rs.pop_match(0x100), Some(0xdead_0000));
    assert_eq!(rs.hits(), 1);
    assert!(rs.is_empty());
}

#[test]
fn test_return_stack_clear() {
    let mut rs = ReturnStack::new();
    rs.push(1, 2);
    rs.clear();
    assert!(rs.is_empty());
    assert_eq!(rs.capacity(), RETURN_STACK_CAPACITY);
}

proptest! {
    #[test]
    fn prop_return_stack_lifo(
        entries in prop::collection::vec((any::<u64>(), any::<u64>()), 0..=RETURN_STACK_CAPACITY)
    ) {
        let mut rs = ReturnStack::new();
        for &(g, h) in &entries {
            rs.push(g, h);
        }
        prop_assert_eq!(rs.len(), entries.len());
        for &(g, h) in entries.iter().rev() {
            let e = rs.pop().unwrap();
            prop_assert_eq!((e.guest, e.host), (g, h));
        }
        prop_assert!(rs.pop().is_none());
    }

    #[test]
    fn prop_return_stack_overflow_evicts_oldest(extra in 1usize..200) {
        let total = RETURN_STACK_CAPACITY + extra;
        let mut rs = ReturnStack::new();
        for i in 0..total as u64 {
            rs.push(i, i + 1);
        }
        prop_assert_eq!(rs.len(), RETURN_STACK_CAPACITY);

        // The newest `capacity` entries come back, newest first.
        for i in (extra as u64..total as u64).rev() {
            prop_assert_eq!(rs.pop().map(|e| e.guest), Some(i));
        }
        // Evicted entries are never popped.
        prop_assert!(rs.pop().is_none());
    }
}
