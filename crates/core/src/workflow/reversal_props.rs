//! Property-based tests for reversing vouchers.
//!
//! - Original and reversal net every account to exactly zero
//! - A reversal of a balanced voucher is balanced with the same total

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, PeriodId, TenantId, UserId};

use crate::ledger::balance::SyncDirection;
use crate::ledger::service::LedgerService;
use crate::ledger::types::{AccountType, DrCr, LineInput};
use crate::ledger::validation::totals_of;
use crate::ledger::voucher::{line_totals, Voucher, VoucherLine, VoucherType};
use crate::workflow::reversal::{ReversalRequest, ReversalService};
use crate::workflow::types::VoucherStatus;

fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn account_type() -> impl Strategy<Value = AccountType> {
    prop::sample::select(AccountType::ALL.to_vec())
}

fn posted() -> Voucher {
    let mut v = Voucher::draft(
        TenantId::new(),
        VoucherType::General,
        PeriodId::new(),
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default(),
        UserId::new(),
    );
    v.status = VoucherStatus::Posted;
    v.voucher_number = Some("GEN-2024Q1-0001".into());
    v
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Posting the original and its reversal leaves every account unchanged.
    #[test]
    fn prop_original_plus_reversal_nets_zero(
        debits in prop::collection::vec((0usize..4, positive_amount()), 1..8),
        types in prop::collection::vec(account_type(), 5),
    ) {
        let accounts: Vec<AccountId> = (0..5).map(|_| AccountId::new()).collect();
        let total: Decimal = debits.iter().map(|(_, a)| *a).sum();
        let mut inputs: Vec<LineInput> = debits
            .iter()
            .map(|(idx, a)| LineInput::debit(accounts[*idx], *a))
            .collect();
        inputs.push(LineInput::credit(accounts[4], total));

        let original = posted();
        let lines: Vec<VoucherLine> = inputs.iter().map(|i| VoucherLine::from_input(original.id, i)).collect();
        let draft = ReversalService::build(&original, &lines, &ReversalRequest::default()).unwrap();

        let nature_of = |id: AccountId| {
            let idx = accounts.iter().position(|a| *a == id).unwrap_or(0);
            types[idx].nature()
        };
        let mut combined: Vec<(AccountId, _, DrCr, Decimal)> = lines
            .iter()
            .map(|l| (l.account_id, nature_of(l.account_id), l.dr_cr, l.amount))
            .collect();
        combined.extend(
            draft.lines.iter().map(|l| (l.account_id, nature_of(l.account_id), l.dr_cr, l.amount)),
        );

        for delta in LedgerService::plan_deltas(combined, SyncDirection::Apply).unwrap() {
            prop_assert_eq!(delta.delta, Decimal::ZERO);
        }
    }

    /// The reversal is balanced and moves the same total.
    #[test]
    fn prop_reversal_balanced(amounts in prop::collection::vec(positive_amount(), 1..8)) {
        let total: Decimal = amounts.iter().copied().sum();
        let original = posted();
        let mut lines: Vec<VoucherLine> = amounts
            .iter()
            .map(|a| VoucherLine::from_input(original.id, &LineInput::credit(AccountId::new(), *a)))
            .collect();
        lines.push(VoucherLine::from_input(original.id, &LineInput::debit(AccountId::new(), total)));

        let draft = ReversalService::build(&original, &lines, &ReversalRequest::default()).unwrap();
        let reversed = totals_of(&draft.lines).unwrap();
        let before = line_totals(&lines).unwrap();
        prop_assert!(reversed.is_balanced());
        prop_assert_eq!(reversed.debit, before.credit);
        prop_assert_eq!(reversed.credit, before.debit);
    }
}
