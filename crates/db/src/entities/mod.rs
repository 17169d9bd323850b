//! `SeaORM` entities for the ledger tables.

pub mod accounting_periods;
pub mod accounts;
pub mod sea_orm_active_enums;
pub mod tenants;
pub mod voucher_approvals;
pub mod voucher_lines;
pub mod voucher_sequences;
pub mod vouchers;
