//! Database layer with `SeaORM` entities, storage and ledger services.
//!
//! This crate provides:
//! - `SeaORM` entity definitions and the schema migration
//! - The transactional [`LedgerStore`] with PostgreSQL and in-process backends
//! - Stateful services: sequence allocation, balance sync, workflow,
//!   ledger queries and reconciliation
//! - The deferred balance worker

pub mod entities;
pub mod migration;
pub mod repositories;
pub mod rls;
pub mod store;
pub mod worker;

pub use repositories::{
    BalanceSynchronizer, LedgerQuery, LedgerQueryError, Reconciler, SequenceAllocator,
    VoucherWorkflow,
};
pub use store::{LedgerStore, LedgerTx, MemoryStore, PgStore, RecordScope, StoreError};
pub use worker::{spawn_balance_worker, BalanceDispatcher, BalanceJob};

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tally_shared::config::DatabaseConfig;

/// Establishes a connection pool to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    Database::connect(options).await
}
