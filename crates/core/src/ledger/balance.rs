//! Signed balance effects of voucher lines.
//!
//! A line moves an account's balance up when its side matches the
//! account's nature and down otherwise:
//!
//! - Debit line on a debit-natured account: `+amount`
//! - Credit line on a credit-natured account: `+amount`
//! - Any other combination: `-amount`

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::AccountId;

use super::types::{AccountNature, DrCr};

/// Returns the signed change a line applies to an account's balance.
#[must_use]
pub fn effective_delta(nature: AccountNature, dr_cr: DrCr, amount: Decimal) -> Decimal {
    if nature.increasing_side() == dr_cr {
        amount
    } else {
        -amount
    }
}

/// Sums the signed effects of `(side, amount)` pairs against one account.
///
/// Returns `None` if the sum leaves the decimal range.
#[must_use]
pub fn net_effect<I>(nature: AccountNature, lines: I) -> Option<Decimal>
where
    I: IntoIterator<Item = (DrCr, Decimal)>,
{
    lines.into_iter().try_fold(Decimal::ZERO, |sum, (dr_cr, amount)| {
        sum.checked_add(effective_delta(nature, dr_cr, amount))
    })
}

/// Returns the side a balance sits on, or `None` when it is zero.
///
/// A positive balance sits on the account's natural side; a negative one
/// sits on the opposite side.
#[must_use]
pub fn balance_side(nature: AccountNature, balance: Decimal) -> Option<DrCr> {
    if balance.is_zero() {
        None
    } else if balance.is_sign_positive() {
        Some(nature.increasing_side())
    } else {
        Some(nature.increasing_side().opposite())
    }
}

/// Direction in which a set of line effects is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Apply the effects of a newly posted voucher.
    Apply,
    /// Undo the effects of a voucher leaving the Posted state.
    Reverse,
}

impl SyncDirection {
    /// Adjusts a line delta for this direction.
    #[must_use]
    pub fn orient(self, delta: Decimal) -> Decimal {
        match self {
            Self::Apply => delta,
            Self::Reverse => -delta,
        }
    }
}

/// Aggregated balance change for one account within one voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDelta {
    /// Target account.
    pub account_id: AccountId,
    /// Net signed change.
    pub delta: Decimal,
}

/// Difference between the cached and the recomputed balance of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    /// Account checked.
    pub account_id: AccountId,
    /// Value held in the balance cache.
    pub cached: Decimal,
    /// Value recomputed from posted lines.
    pub computed: Decimal,
}

impl BalanceDrift {
    /// Returns `computed - cached`.
    #[must_use]
    pub fn drift(&self) -> Decimal {
        self.computed - self.cached
    }

    /// Returns true if cache and ground truth agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.cached == self.computed
    }
}
