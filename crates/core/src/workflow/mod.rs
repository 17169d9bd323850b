//! Voucher workflow management.
//!
//! This module implements the voucher lifecycle state machine, role-based
//! permission checks, reversing vouchers and the domain events emitted
//! after each transition.
//!
//! # Modules
//!
//! - `types` - Workflow domain types (VoucherStatus, WorkflowAction)
//! - `error` - Transition error taxonomy
//! - `service` - State transition logic
//! - `permission` - Roles and the permission checker
//! - `reversal` - Reversing voucher construction
//! - `event` - Domain events

pub mod error;
pub mod event;
pub mod permission;
pub mod reversal;
pub mod service;
pub mod types;

#[cfg(test)]
mod reversal_props;
#[cfg(test)]
mod service_props;

pub use error::WorkflowError;
pub use event::LedgerEvent;
pub use permission::{Actor, PermissionChecker, Role, RolePermissions};
pub use reversal::{ReversalRequest, ReversalService};
pub use service::WorkflowService;
pub use types::{ApprovalAction, VoucherAction, VoucherApproval, VoucherStatus, WorkflowAction};
