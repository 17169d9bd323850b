//! Validation errors raised before any voucher state changes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tally_shared::types::AccountId;

/// Structural problems with a voucher or its lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A non-draft voucher needs at least one line.
    #[error("Voucher must have at least one line")]
    NoLines,

    /// Debits and credits differ.
    #[error("Voucher is unbalanced. Debit: {debit}, Credit: {credit}")]
    Unbalanced {
        /// Total debit amount.
        debit: Decimal,
        /// Total credit amount.
        credit: Decimal,
    },

    /// Both sides total zero.
    #[error("Voucher total must not be zero")]
    ZeroTotal,

    /// A line amount is zero or negative.
    #[error("Line {line}: amount must be greater than zero, got {amount}")]
    NonPositiveAmount {
        /// One-based line position.
        line: usize,
        /// Offending amount.
        amount: Decimal,
    },

    /// A line amount carries more decimal places than the ledger stores.
    #[error("Line {line}: amount {amount} has more than {max_scale} decimal places")]
    AmountScale {
        /// One-based line position.
        line: usize,
        /// Offending amount.
        amount: Decimal,
        /// Largest accepted scale.
        max_scale: u32,
    },

    /// A line amount is larger than the largest storable amount.
    #[error("Line {line}: amount {amount} exceeds the maximum of {max}")]
    AmountOutOfRange {
        /// One-based line position.
        line: usize,
        /// Offending amount.
        amount: Decimal,
        /// Largest accepted amount.
        max: Decimal,
    },

    /// A total of amounts left the representable range.
    #[error("Amount total is out of range")]
    AmountOverflow,

    /// The account does not exist within the acting tenant.
    #[error("Line {line}: account {account_id} not found for this tenant")]
    AccountNotFound {
        /// One-based line position.
        line: usize,
        /// Missing account.
        account_id: AccountId,
    },

    /// The account belongs to a different tenant.
    #[error("Line {line}: account {account_id} belongs to another tenant")]
    CrossTenantAccount {
        /// One-based line position.
        line: usize,
        /// Foreign account.
        account_id: AccountId,
    },

    /// The account is inactive.
    #[error("Line {line}: account {account_id} is inactive")]
    AccountInactive {
        /// One-based line position.
        line: usize,
        /// Inactive account.
        account_id: AccountId,
    },

    /// The account is a control account.
    #[error("Line {line}: account {account_id} does not allow direct posting")]
    AccountNotPostable {
        /// One-based line position.
        line: usize,
        /// Control account.
        account_id: AccountId,
    },

    /// No accounting period covers the voucher date.
    #[error("No accounting period found for date {0}")]
    NoPeriodForDate(NaiveDate),

    /// A rejection must explain itself.
    #[error("Rejection comment is required")]
    CommentRequired,

    /// The voucher to reverse has no lines.
    #[error("Nothing to reverse: voucher has no lines")]
    NothingToReverse,
}

impl ValidationError {
    /// Returns the error code for callers surfacing this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoLines => "NO_LINES",
            Self::Unbalanced { .. } => "UNBALANCED_VOUCHER",
            Self::ZeroTotal => "ZERO_TOTAL",
            Self::NonPositiveAmount { .. } => "NON_POSITIVE_AMOUNT",
            Self::AmountScale { .. } => "AMOUNT_SCALE",
            Self::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            Self::CrossTenantAccount { .. } => "CROSS_TENANT_REFERENCE",
            Self::AccountInactive { .. } => "ACCOUNT_INACTIVE",
            Self::AccountNotPostable { .. } => "ACCOUNT_NOT_POSTABLE",
            Self::NoPeriodForDate(_) => "NO_ACCOUNTING_PERIOD",
            Self::CommentRequired => "COMMENT_REQUIRED",
            Self::NothingToReverse => "NOTHING_TO_REVERSE",
        }
    }
}
