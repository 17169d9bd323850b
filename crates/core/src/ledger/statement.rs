//! Account statements: opening balance, running balance, closing balance.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, VoucherId};

use super::balance::{balance_side, effective_delta};
use super::error::ValidationError;
use super::types::{AccountNature, DrCr};

/// A posted line as seen from one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedLine {
    /// Source voucher.
    pub voucher_id: VoucherId,
    /// Source voucher number.
    pub voucher_number: Option<String>,
    /// Voucher date.
    pub date: NaiveDate,
    /// Debit or credit.
    pub dr_cr: DrCr,
    /// Line amount.
    pub amount: Decimal,
    /// Line narration, falling back to the voucher narration.
    pub narration: String,
    /// Whether the voucher's effects are already in the balance cache.
    #[serde(default)]
    pub balances_applied: bool,
}

/// One row of an account statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementEntry {
    /// The posted line.
    pub line: PostedLine,
    /// Signed change applied by the line.
    pub delta: Decimal,
    /// Balance after the line.
    pub running_balance: Decimal,
    /// Side the running balance sits on.
    pub balance_side: Option<DrCr>,
}

/// Chronological activity of an account over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatement {
    /// The account.
    pub account_id: AccountId,
    /// Balance of all posted lines before the range.
    pub opening_balance: Decimal,
    /// Lines in the range with running balance.
    pub entries: Vec<StatementEntry>,
    /// Balance after the last line in the range.
    pub closing_balance: Decimal,
    /// Total debits in the range.
    pub total_debit: Decimal,
    /// Total credits in the range.
    pub total_credit: Decimal,
}

impl AccountStatement {
    /// Builds a statement from an opening balance and the lines in range.
    ///
    /// Lines are ordered by date, then voucher number, before the running
    /// balance is accumulated.
    ///
    /// # Errors
    ///
    /// Returns `AmountOverflow` if a running balance or total leaves the
    /// decimal range.
    pub fn build(
        account_id: AccountId,
        nature: AccountNature,
        opening_balance: Decimal,
        mut lines: Vec<PostedLine>,
    ) -> Result<Self, ValidationError> {
        lines.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.voucher_number.cmp(&b.voucher_number))
        });

        let mut running = opening_balance;
        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            let delta = effective_delta(nature, line.dr_cr, line.amount);
            running = running.checked_add(delta).ok_or(ValidationError::AmountOverflow)?;
            let total = match line.dr_cr {
                DrCr::Debit => &mut total_debit,
                DrCr::Credit => &mut total_credit,
            };
            *total = total.checked_add(line.amount).ok_or(ValidationError::AmountOverflow)?;
            entries.push(StatementEntry {
                line,
                delta,
                running_balance: running,
                balance_side: balance_side(nature, running),
            });
        }

        Ok(Self {
            account_id,
            opening_balance,
            entries,
            closing_balance: running,
            total_debit,
            total_credit,
        })
    }
}
