//! Accounting period management.

pub mod period;

pub use period::{period_for_date, quarter_of, AccountingPeriod};
