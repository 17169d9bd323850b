//! Double-entry bookkeeping rules.
//!
//! - Account types, natures and the sign rule
//! - Vouchers and voucher lines
//! - Line validation and balance-delta planning
//! - Account statements with running balance

pub mod balance;
pub mod error;
pub mod service;
pub mod statement;
pub mod types;
pub mod validation;
pub mod voucher;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod validation_props;

pub use balance::{balance_side, effective_delta, net_effect, AccountDelta, BalanceDrift, SyncDirection};
pub use error::ValidationError;
pub use service::{LedgerService, ResolvedLine};
pub use statement::{AccountStatement, PostedLine, StatementEntry};
pub use types::{Account, AccountNature, AccountType, DrCr, LineInput, VoucherTotals};
pub use voucher::{line_totals, NewVoucher, Voucher, VoucherLine, VoucherType, VoucherUpdate};
