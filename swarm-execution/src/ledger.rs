//! Node slot accounting

use tracing::warn;

/// Counts reserved node slots against a fixed maximum.
///
/// The ledger is a plain counter; callers that share it across tasks guard
/// it with a lock (see [`crate::AdmissionControl`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityLedger {
    max_slots: usize,
    reserved_slots: usize,
}

impl CapacityLedger {
    pub fn new(max_slots: usize) -> Self {
        Self {
            max_slots,
            reserved_slots: 0,
        }
    }

    /// Reserve `n` slots if they all fit. Never reserves partially.
    pub fn reserve(&mut self, n: usize) -> bool {
        match self.reserved_slots.checked_add(n) {
            Some(total) if total <= self.max_slots => {
                self.reserved_slots = total;
                true
            }
            _ => false,
        }
    }

    /// Return `n` slots. Releasing more than is reserved clamps at zero.
    pub fn release(&mut self, n: usize) {
        if n > self.reserved_slots {
            warn!(
                requested = n,
                reserved = self.reserved_slots,
                "Releasing more slots than are reserved, clamping to zero"
            );
        }
        self.reserved_slots = self.reserved_slots.saturating_sub(n);
    }

    pub fn available(&self) -> usize {
        self.max_slots - self.reserved_slots
    }

    pub fn reserved(&self) -> usize {
        self.reserved_slots
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reserve_and_release() {
        let mut ledger = CapacityLedger::new(10);
        assert!(ledger.reserve(4));
        assert!(ledger.reserve(6));
        assert_eq!(ledger.available(), 0);

        assert!(!ledger.reserve(1));
        assert_eq!(ledger.reserved(), 10);

        ledger.release(4);
        assert_eq!(ledger.available(), 4);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut ledger = CapacityLedger::new(10);
        assert!(ledger.reserve(7));
        assert!(!ledger.reserve(4));
        assert_eq!(ledger.reserved(), 7);
    }

    #[test]
    fn test_over_release_clamps() {
        let mut ledger = CapacityLedger::new(5);
        assert!(ledger.reserve(2));
        ledger.release(3);
        assert_eq!(ledger.reserved(), 0);
        assert_eq!(ledger.available(), 5);
    }

    #[test]
    fn test_reserve_overflow_is_rejected() {
        let mut ledger = CapacityLedger::new(5);
        assert!(ledger.reserve(1));
        assert!(!ledger.reserve(usize::MAX));
        assert_eq!(ledger.reserved(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(usize),
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..20).prop_map(Op::Reserve),
            (0usize..20).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn capacity_invariant_holds(max_slots in 1usize..40, ops in prop::collection::vec(op(), 0..100)) {
            let mut ledger = CapacityLedger::new(max_slots);

            for op in ops {
                let before = ledger.reserved();
                match op {
                    Op::Reserve(n) => {
                        let fits = before + n <= max_slots;
                        prop_assert_eq!(ledger.reserve(n), fits);
                        let expected = if fits { before + n } else { before };
                        prop_assert_eq!(ledger.reserved(), expected);
                    }
                    Op::Release(n) => {
                        ledger.release(n);
                        prop_assert_eq!(ledger.reserved(), before.saturating_sub(n));
                    }
                }
                prop_assert!(ledger.reserved() <= max_slots);
                prop_assert_eq!(ledger.available(), max_slots - ledger.reserved());
            }
        }
    }
}
