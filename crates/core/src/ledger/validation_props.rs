//! Property-based tests for voucher line validation.
//!
//! - Balanced, positive lines are always accepted
//! - Any imbalance, however small, is rejected
//! - Non-positive amounts are rejected with their position

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::AccountId;

use super::error::ValidationError;
use super::types::{DrCr, LineInput};
use super::validation::{totals_of, validate_amounts, validate_balanced};

/// Strategy to generate a positive amount from 0.01 to 1,000,000.00.
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate a zero or negative amount.
fn non_positive_amount() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(-cents, 2))
}

fn side() -> impl Strategy<Value = DrCr> {
    prop_oneof![Just(DrCr::Debit), Just(DrCr::Credit)]
}

fn line(dr_cr: DrCr, amount: Decimal) -> LineInput {
    LineInput {
        account_id: AccountId::new(),
        dr_cr,
        amount,
        narration: String::new(),
    }
}

/// Splits one total into several debit lines mirrored by one credit line.
fn balanced_lines(amounts: &[Decimal]) -> Vec<LineInput> {
    let total: Decimal = amounts.iter().copied().sum();
    let mut lines: Vec<LineInput> = amounts.iter().map(|a| line(DrCr::Debit, *a)).collect();
    lines.push(line(DrCr::Credit, total));
    lines
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Balanced lines with positive amounts validate and report their totals.
    #[test]
    fn prop_balanced_lines_accepted(amounts in prop::collection::vec(positive_amount(), 1..8)) {
        let lines = balanced_lines(&amounts);
        let totals = validate_balanced(&lines);
        prop_assert!(totals.is_ok(), "expected balanced, got {:?}", totals);
        let totals = totals.unwrap();
        prop_assert_eq!(totals.debit, totals.credit);
        prop_assert_eq!(totals.debit, amounts.iter().copied().sum::<Decimal>());
    }

    /// Shifting a single cent anywhere breaks the balance.
    #[test]
    fn prop_off_by_one_cent_rejected(
        amounts in prop::collection::vec(positive_amount(), 1..8),
        extra_side in side(),
    ) {
        let mut lines = balanced_lines(&amounts);
        lines.push(line(extra_side, Decimal::new(1, 2)));
        let result = validate_balanced(&lines);
        prop_assert!(
            matches!(result, Err(ValidationError::Unbalanced { .. })),
            "expected Unbalanced, got {:?}",
            result
        );
    }

    /// A non-positive amount is reported at its one-based position.
    #[test]
    fn prop_non_positive_amount_rejected(
        amounts in prop::collection::vec(positive_amount(), 1..6),
        bad in non_positive_amount(),
        position in 0usize..6,
        bad_side in side(),
    ) {
        let mut lines = balanced_lines(&amounts);
        let idx = position.min(lines.len());
        lines.insert(idx, line(bad_side, bad));
        let result = validate_amounts(&lines);
        prop_assert_eq!(
            result,
            Err(ValidationError::NonPositiveAmount { line: idx + 1, amount: bad })
        );
    }

    /// Totals never depend on line order.
    #[test]
    fn prop_totals_order_independent(
        raw in prop::collection::vec((side(), positive_amount()), 0..12),
    ) {
        let lines: Vec<LineInput> = raw.iter().map(|(s, a)| line(*s, *a)).collect();
        let mut reversed = lines.clone();
        reversed.reverse();
        prop_assert_eq!(totals_of(&lines), totals_of(&reversed));
    }
}
