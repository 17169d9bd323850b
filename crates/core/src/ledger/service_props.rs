//! Property-based tests for the sign rule and delta planning.
//!
//! - Apply then Reverse nets to exactly zero per account
//! - A balanced voucher moves debit-natured and credit-natured totals in step

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::AccountId;

use super::balance::{effective_delta, SyncDirection};
use super::service::LedgerService;
use super::types::{AccountNature, AccountType, DrCr};

fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn side() -> impl Strategy<Value = DrCr> {
    prop_oneof![Just(DrCr::Debit), Just(DrCr::Credit)]
}

fn nature() -> impl Strategy<Value = AccountNature> {
    prop_oneof![Just(AccountNature::Debit), Just(AccountNature::Credit)]
}

fn account_type() -> impl Strategy<Value = AccountType> {
    prop::sample::select(AccountType::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The sign rule only ever flips the sign, never the magnitude.
    #[test]
    fn prop_delta_magnitude_is_amount(n in nature(), s in side(), amount in positive_amount()) {
        prop_assert_eq!(effective_delta(n, s, amount).abs(), amount);
    }

    /// Opposite sides cancel on any account.
    #[test]
    fn prop_opposite_sides_cancel(n in nature(), s in side(), amount in positive_amount()) {
        prop_assert_eq!(
            effective_delta(n, s, amount) + effective_delta(n, s.opposite(), amount),
            Decimal::ZERO
        );
    }

    /// Applying then reversing a plan leaves every account unchanged.
    #[test]
    fn prop_apply_reverse_round_trip(
        raw in prop::collection::vec((0usize..4, account_type(), side(), positive_amount()), 1..16),
    ) {
        let accounts: Vec<AccountId> = (0..4).map(|_| AccountId::new()).collect();
        let lines: Vec<_> = raw
            .iter()
            .map(|(idx, t, s, a)| (accounts[*idx], t.nature(), *s, *a))
            .collect();

        let apply = LedgerService::plan_deltas(lines.clone(), SyncDirection::Apply).unwrap();
        let reverse = LedgerService::plan_deltas(lines, SyncDirection::Reverse).unwrap();
        prop_assert_eq!(apply.len(), reverse.len());
        for (a, r) in apply.iter().zip(reverse.iter()) {
            prop_assert_eq!(a.account_id, r.account_id);
            prop_assert_eq!(a.delta + r.delta, Decimal::ZERO);
        }
    }

    /// For a balanced voucher, the net change on debit-natured accounts
    /// equals the net change on credit-natured accounts.
    #[test]
    fn prop_balanced_voucher_keeps_equation(
        debits in prop::collection::vec((account_type(), positive_amount()), 1..6),
        credit_type in account_type(),
    ) {
        let total: Decimal = debits.iter().map(|(_, a)| *a).sum();
        let mut lines: Vec<_> = debits
            .iter()
            .map(|(t, a)| (AccountId::new(), t.nature(), DrCr::Debit, *a))
            .collect();
        lines.push((AccountId::new(), credit_type.nature(), DrCr::Credit, total));

        let debit_side: Decimal = lines
            .iter()
            .filter(|l| l.1 == AccountNature::Debit)
            .map(|l| effective_delta(l.1, l.2, l.3))
            .sum();
        let credit_side: Decimal = lines
            .iter()
            .filter(|l| l.1 == AccountNature::Credit)
            .map(|l| effective_delta(l.1, l.2, l.3))
            .sum();
        prop_assert_eq!(debit_side, credit_side);
    }
}
