//! Property-based tests for document number formatting.
//!
//! - Formatted numbers keep the prefix and parse back to the counter
//! - Successive numbers of one counter are distinct and sort in order

use proptest::prelude::*;
use tally_shared::types::{PeriodId, TenantId};

use super::{format_number, SequenceScope, VoucherSequence};
use crate::ledger::voucher::VoucherType;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The counter survives formatting and the width is at least the padding.
    #[test]
    fn prop_format_round_trip(prefix in "[A-Z]{1,5}-", n in 0u64..10_000_000, padding in 0u8..10) {
        let formatted = format_number(&prefix, n, padding);
        prop_assert!(formatted.starts_with(&prefix));
        let digits = &formatted[prefix.len()..];
        prop_assert!(digits.len() >= usize::from(padding));
        prop_assert_eq!(digits.parse::<u64>().ok(), Some(n));
    }

    /// Numbers within the padding width sort lexically in counter order.
    #[test]
    fn prop_advance_strictly_increasing(start in 0u64..9_000, steps in 1usize..50) {
        let scope = SequenceScope::new(TenantId::new(), VoucherType::General, PeriodId::new());
        let mut seq = VoucherSequence::new(scope, "GEN-2024Q1-".into(), 5);
        seq.last_number = start;

        let mut issued = Vec::with_capacity(steps);
        for _ in 0..steps {
            issued.push(seq.advance().unwrap());
        }
        for pair in issued.windows(2) {
            prop_assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        prop_assert_eq!(seq.last_number, start + steps as u64);
    }
}
