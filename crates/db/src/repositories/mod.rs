//! Stateful ledger services.
//!
//! Each service owns an `Arc` of a [`LedgerStore`](crate::store::LedgerStore)
//! and runs its operations as units of work against it. Services that need
//! to compose with others inside one unit of work expose `*_in` variants
//! taking the caller's transaction.

pub mod balance;
pub mod ledger;
pub mod reconcile;
pub mod sequence;
pub mod workflow;

pub use balance::BalanceSynchronizer;
pub use ledger::{LedgerQuery, LedgerQueryError};
pub use reconcile::{ReconcileReport, Reconciler, ResyncReport};
pub use sequence::SequenceAllocator;
pub use workflow::VoucherWorkflow;
