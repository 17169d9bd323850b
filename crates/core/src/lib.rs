//! Core business logic for Tally.
//!
//! This crate contains pure business logic with ZERO database or runtime
//! dependencies. All domain types, validation rules, and state transitions
//! live here; the `tally-db` crate supplies storage, locking and the
//! stateful services built on top.
//!
//! # Modules
//!
//! - `ledger` - Double-entry bookkeeping: accounts, vouchers, the sign rule
//! - `fiscal` - Accounting periods
//! - `sequence` - Document number prefixes and formatting
//! - `workflow` - Voucher lifecycle, permissions, reversals, events
//! - `tenant` - Tenants and the active-tenant context

pub mod fiscal;
pub mod ledger;
pub mod sequence;
pub mod tenant;
pub mod workflow;
