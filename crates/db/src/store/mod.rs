//! Transactional storage for the ledger.
//!
//! Every read and write takes the acting tenant explicitly. A unit of work
//! is a [`LedgerTx`] obtained from [`LedgerStore::begin`]; nothing it wrote
//! is visible to others until [`LedgerTx::commit`], and dropping it without
//! committing discards all of it.
//!
//! Row locks (`lock_*`) are exclusive and held until commit or rollback.
//! Callers take them in a fixed order to stay deadlock free:
//! voucher, then sequence, then accounts sorted by id.
//!
//! Two implementations exist: [`PgStore`] on PostgreSQL (`SELECT ... FOR
//! UPDATE`) and [`MemoryStore`] in process, with the same locking rules.

mod convert;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_core::fiscal::AccountingPeriod;
use tally_core::ledger::{Account, PostedLine, Voucher, VoucherLine};
use tally_core::sequence::{SequenceScope, VoucherSequence};
use tally_core::tenant::Tenant;
use tally_core::workflow::{VoucherApproval, WorkflowError};
use tally_shared::types::{AccountId, PeriodId, TenantId, VoucherId};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which vouchers a read may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    /// Only vouchers that are not soft-deleted.
    Active,
    /// Soft-deleted vouchers too.
    All,
}

impl RecordScope {
    /// Returns true if a voucher with this deletion marker is in scope.
    #[must_use]
    pub const fn includes(self, deleted_at: Option<DateTime<Utc>>) -> bool {
        match self {
            Self::Active => deleted_at.is_none(),
            Self::All => true,
        }
    }
}

/// Errors raised by a store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A row expected to exist is missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness or consistency constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row lock could not be taken.
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        Self::Database(err.to_string())
    }
}

/// Source of units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// The unit of work type.
    type Tx: LedgerTx;

    /// Starts a unit of work.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One unit of work against the ledger tables.
#[async_trait]
pub trait LedgerTx: Send {
    /// Returns a tenant.
    async fn find_tenant(&mut self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError>;

    /// Returns every tenant.
    async fn list_tenants(&mut self) -> Result<Vec<Tenant>, StoreError>;

    /// Returns a period of the tenant.
    async fn find_period(
        &mut self,
        tenant_id: TenantId,
        period_id: PeriodId,
    ) -> Result<Option<AccountingPeriod>, StoreError>;

    /// Returns the tenant's period containing `date`.
    async fn find_period_for_date(
        &mut self,
        tenant_id: TenantId,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, StoreError>;

    /// Returns an account of the tenant.
    async fn find_account(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Locks and returns an account of the tenant.
    async fn lock_account(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Overwrites the cached balance of a locked account.
    async fn update_account_balance(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
        balance: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Returns the tenant's chart of accounts ordered by id.
    async fn accounts(&mut self, tenant_id: TenantId) -> Result<Vec<Account>, StoreError>;

    /// Returns a voucher of the tenant.
    async fn find_voucher(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Option<Voucher>, StoreError>;

    /// Locks and returns a voucher of the tenant.
    async fn lock_voucher(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Option<Voucher>, StoreError>;

    /// Inserts a voucher.
    async fn insert_voucher(&mut self, voucher: &Voucher) -> Result<(), StoreError>;

    /// Updates a locked voucher.
    async fn update_voucher(&mut self, voucher: &Voucher) -> Result<(), StoreError>;

    /// Returns the lines of a voucher of the tenant.
    async fn voucher_lines(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<Vec<VoucherLine>, StoreError>;

    /// Replaces every line of a voucher of the tenant.
    async fn replace_lines(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        lines: &[VoucherLine],
    ) -> Result<(), StoreError>;

    /// Locks and returns the counter of a scope, if it exists.
    async fn lock_sequence(
        &mut self,
        scope: SequenceScope,
    ) -> Result<Option<VoucherSequence>, StoreError>;

    /// Inserts a counter unless one exists for the scope already.
    async fn insert_sequence(&mut self, sequence: &VoucherSequence) -> Result<(), StoreError>;

    /// Saves a locked counter.
    async fn update_sequence(&mut self, sequence: &VoucherSequence) -> Result<(), StoreError>;

    /// Appends an audit log entry.
    async fn append_approval(&mut self, approval: &VoucherApproval) -> Result<(), StoreError>;

    /// Returns the audit log of a voucher, oldest first.
    async fn approvals(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<Vec<VoucherApproval>, StoreError>;

    /// Returns lines of live Posted vouchers on an account, optionally
    /// bounded by voucher date (inclusive).
    async fn posted_lines(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PostedLine>, StoreError>;

    /// Returns vouchers flagged for manual reconciliation.
    async fn flagged_vouchers(&mut self, tenant_id: TenantId) -> Result<Vec<Voucher>, StoreError>;

    /// Returns vouchers whose `balances_updated` flag disagrees with being a
    /// live Posted voucher, ordered by id.
    async fn unsynced_vouchers(&mut self, tenant_id: TenantId) -> Result<Vec<Voucher>, StoreError>;

    /// Makes every write of this unit of work visible and releases its locks.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discards every write of this unit of work and releases its locks.
    async fn rollback(self) -> Result<(), StoreError>;
}
