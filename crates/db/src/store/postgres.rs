//! PostgreSQL ledger store on `SeaORM`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    TransactionTrait,
};
use uuid::Uuid;

use tally_core::fiscal::AccountingPeriod;
use tally_core::ledger::{Account, PostedLine, Voucher, VoucherLine};
use tally_core::sequence::{SequenceScope, VoucherSequence};
use tally_core::tenant::Tenant;
use tally_core::workflow::VoucherApproval;
use tally_shared::types::{AccountId, PeriodId, TenantId, VoucherId};

use super::{convert, LedgerStore, LedgerTx, RecordScope, StoreError};
use crate::entities::{
    accounting_periods, accounts, sea_orm_active_enums as db_enums, tenants, voucher_approvals,
    voucher_lines, voucher_sequences, vouchers,
};
use crate::rls::set_rls_context;

/// Ledger store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    /// Creates a new store.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let txn = self.db.begin().await?;
        Ok(PgTx {
            txn,
            rls_tenant: None,
        })
    }
}

/// Unit of work of a [`PgStore`]: one database transaction.
#[derive(Debug)]
pub struct PgTx {
    txn: DatabaseTransaction,
    rls_tenant: Option<TenantId>,
}

impl PgTx {
    /// Points the RLS policies at `tenant_id` for the rest of the transaction.
    async fn scope(&mut self, tenant_id: TenantId) -> Result<(), StoreError> {
        if self.rls_tenant != Some(tenant_id) {
            set_rls_context(&self.txn, tenant_id).await?;
            self.rls_tenant = Some(tenant_id);
        }
        Ok(())
    }

    fn voucher_query(
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> sea_orm::Select<vouchers::Entity> {
        let query = vouchers::Entity::find_by_id(Uuid::from(voucher_id))
            .filter(vouchers::Column::TenantId.eq(Uuid::from(tenant_id)));
        match scope {
            RecordScope::Active => query.filter(vouchers::Column::DeletedAt.is_null()),
            RecordScope::All => query,
        }
    }

    fn account_query(tenant_id: TenantId, account_id: AccountId) -> sea_orm::Select<accounts::Entity> {
        accounts::Entity::find_by_id(Uuid::from(account_id))
            .filter(accounts::Column::TenantId.eq(Uuid::from(tenant_id)))
    }
}

#[derive(Debug, FromQueryResult)]
struct PostedLineRow {
    voucher_id: Uuid,
    dr_cr: db_enums::DrCr,
    amount: Decimal,
    narration: String,
    voucher_number: Option<String>,
    voucher_date: NaiveDate,
    voucher_narration: String,
    balances_updated: bool,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn find_tenant(&mut self, tenant_id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let model = tenants::Entity::find_by_id(Uuid::from(tenant_id))
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::tenant))
    }

    async fn list_tenants(&mut self) -> Result<Vec<Tenant>, StoreError> {
        let models = tenants::Entity::find()
            .order_by_asc(tenants::Column::Code)
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(convert::tenant).collect())
    }

    async fn find_period(
        &mut self,
        tenant_id: TenantId,
        period_id: PeriodId,
    ) -> Result<Option<AccountingPeriod>, StoreError> {
        self.scope(tenant_id).await?;
        let model = accounting_periods::Entity::find_by_id(Uuid::from(period_id))
            .filter(accounting_periods::Column::TenantId.eq(Uuid::from(tenant_id)))
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::period))
    }

    async fn find_period_for_date(
        &mut self,
        tenant_id: TenantId,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, StoreError> {
        self.scope(tenant_id).await?;
        let model = accounting_periods::Entity::find()
            .filter(accounting_periods::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(accounting_periods::Column::StartDate.lte(date))
            .filter(accounting_periods::Column::EndDate.gte(date))
            .order_by_asc(accounting_periods::Column::StartDate)
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::period))
    }

    async fn find_account(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        self.scope(tenant_id).await?;
        let model = Self::account_query(tenant_id, account_id)
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::account))
    }

    async fn lock_account(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        self.scope(tenant_id).await?;
        let model = Self::account_query(tenant_id, account_id)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::account))
    }

    async fn update_account_balance(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
        balance: Decimal,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.scope(tenant_id).await?;
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::CurrentBalance, Expr::value(balance))
            .col_expr(
                accounts::Column::BalanceLastUpdated,
                Expr::value(updated_at.fixed_offset()),
            )
            .filter(accounts::Column::Id.eq(Uuid::from(account_id)))
            .filter(accounts::Column::TenantId.eq(Uuid::from(tenant_id)))
            .exec(&self.txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("account {account_id}")));
        }
        Ok(())
    }

    async fn accounts(&mut self, tenant_id: TenantId) -> Result<Vec<Account>, StoreError> {
        self.scope(tenant_id).await?;
        let models = accounts::Entity::find()
            .filter(accounts::Column::TenantId.eq(Uuid::from(tenant_id)))
            .order_by_asc(accounts::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(convert::account).collect())
    }

    async fn find_voucher(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Option<Voucher>, StoreError> {
        self.scope(tenant_id).await?;
        let model = Self::voucher_query(tenant_id, voucher_id, scope)
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::voucher))
    }

    async fn lock_voucher(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        scope: RecordScope,
    ) -> Result<Option<Voucher>, StoreError> {
        self.scope(tenant_id).await?;
        let model = Self::voucher_query(tenant_id, voucher_id, scope)
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        Ok(model.map(convert::voucher))
    }

    async fn insert_voucher(&mut self, voucher: &Voucher) -> Result<(), StoreError> {
        self.scope(voucher.tenant_id).await?;
        vouchers::Entity::insert(convert::voucher_active(voucher))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn update_voucher(&mut self, voucher: &Voucher) -> Result<(), StoreError> {
        self.scope(voucher.tenant_id).await?;
        convert::voucher_active(voucher).update(&self.txn).await?;
        Ok(())
    }

    async fn voucher_lines(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<Vec<VoucherLine>, StoreError> {
        self.scope(tenant_id).await?;
        let models = voucher_lines::Entity::find()
            .filter(voucher_lines::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(voucher_lines::Column::VoucherId.eq(Uuid::from(voucher_id)))
            .order_by_asc(voucher_lines::Column::LineNumber)
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(convert::line).collect())
    }

    async fn replace_lines(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
        lines: &[VoucherLine],
    ) -> Result<(), StoreError> {
        if self
            .find_voucher(tenant_id, voucher_id, RecordScope::All)
            .await?
            .is_none()
        {
            return Err(StoreError::NotFound(format!("voucher {voucher_id}")));
        }

        voucher_lines::Entity::delete_many()
            .filter(voucher_lines::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(voucher_lines::Column::VoucherId.eq(Uuid::from(voucher_id)))
            .exec(&self.txn)
            .await?;

        if lines.is_empty() {
            return Ok(());
        }
        let models = lines
            .iter()
            .enumerate()
            .map(|(idx, line)| convert::line_active(tenant_id, idx, line))
            .collect::<Result<Vec<_>, _>>()?;
        voucher_lines::Entity::insert_many(models)
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn lock_sequence(
        &mut self,
        scope: SequenceScope,
    ) -> Result<Option<VoucherSequence>, StoreError> {
        self.scope(scope.tenant_id).await?;
        let model = voucher_sequences::Entity::find()
            .filter(voucher_sequences::Column::TenantId.eq(Uuid::from(scope.tenant_id)))
            .filter(
                voucher_sequences::Column::VoucherType
                    .eq(db_enums::VoucherType::from(scope.voucher_type)),
            )
            .filter(voucher_sequences::Column::AccountingPeriodId.eq(Uuid::from(scope.period_id)))
            .lock_exclusive()
            .one(&self.txn)
            .await?;
        model.map(convert::sequence).transpose()
    }

    async fn insert_sequence(&mut self, sequence: &VoucherSequence) -> Result<(), StoreError> {
        self.scope(sequence.tenant_id).await?;
        voucher_sequences::Entity::insert(convert::sequence_active(sequence)?)
            .on_conflict(
                OnConflict::columns([
                    voucher_sequences::Column::TenantId,
                    voucher_sequences::Column::VoucherType,
                    voucher_sequences::Column::AccountingPeriodId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn update_sequence(&mut self, sequence: &VoucherSequence) -> Result<(), StoreError> {
        self.scope(sequence.tenant_id).await?;
        convert::sequence_active(sequence)?.update(&self.txn).await?;
        Ok(())
    }

    async fn append_approval(&mut self, approval: &VoucherApproval) -> Result<(), StoreError> {
        self.scope(approval.tenant_id).await?;
        voucher_approvals::Entity::insert(convert::approval_active(approval))
            .exec_without_returning(&self.txn)
            .await?;
        Ok(())
    }

    async fn approvals(
        &mut self,
        tenant_id: TenantId,
        voucher_id: VoucherId,
    ) -> Result<Vec<VoucherApproval>, StoreError> {
        self.scope(tenant_id).await?;
        let models = voucher_approvals::Entity::find()
            .filter(voucher_approvals::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(voucher_approvals::Column::VoucherId.eq(Uuid::from(voucher_id)))
            .order_by_asc(voucher_approvals::Column::CreatedAt)
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(convert::approval).collect())
    }

    async fn posted_lines(
        &mut self,
        tenant_id: TenantId,
        account_id: AccountId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PostedLine>, StoreError> {
        self.scope(tenant_id).await?;
        let mut query = voucher_lines::Entity::find()
            .select_only()
            .column(voucher_lines::Column::VoucherId)
            .column(voucher_lines::Column::DrCr)
            .column(voucher_lines::Column::Amount)
            .column(voucher_lines::Column::Narration)
            .column_as(vouchers::Column::VoucherNumber, "voucher_number")
            .column_as(vouchers::Column::VoucherDate, "voucher_date")
            .column_as(vouchers::Column::Narration, "voucher_narration")
            .column_as(vouchers::Column::BalancesUpdated, "balances_updated")
            .join(JoinType::InnerJoin, voucher_lines::Relation::Vouchers.def())
            .filter(voucher_lines::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(voucher_lines::Column::AccountId.eq(Uuid::from(account_id)))
            .filter(vouchers::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(vouchers::Column::Status.eq(db_enums::VoucherStatus::Posted))
            .filter(vouchers::Column::DeletedAt.is_null());

        if let Some(start) = start {
            query = query.filter(vouchers::Column::VoucherDate.gte(start));
        }
        if let Some(end) = end {
            query = query.filter(vouchers::Column::VoucherDate.lte(end));
        }

        let rows: Vec<PostedLineRow> = query
            .order_by_asc(vouchers::Column::VoucherDate)
            .order_by_asc(vouchers::Column::VoucherNumber)
            .order_by_asc(voucher_lines::Column::LineNumber)
            .into_model::<PostedLineRow>()
            .all(&self.txn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PostedLine {
                voucher_id: row.voucher_id.into(),
                voucher_number: row.voucher_number,
                date: row.voucher_date,
                dr_cr: row.dr_cr.into(),
                amount: row.amount,
                narration: if row.narration.is_empty() {
                    row.voucher_narration
                } else {
                    row.narration
                },
                balances_applied: row.balances_updated,
            })
            .collect())
    }

    async fn flagged_vouchers(&mut self, tenant_id: TenantId) -> Result<Vec<Voucher>, StoreError> {
        self.scope(tenant_id).await?;
        let models = vouchers::Entity::find()
            .filter(vouchers::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(vouchers::Column::NeedsReconciliation.eq(true))
            .order_by_asc(vouchers::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(convert::voucher).collect())
    }

    async fn unsynced_vouchers(&mut self, tenant_id: TenantId) -> Result<Vec<Voucher>, StoreError> {
        self.scope(tenant_id).await?;
        let live_posted = Condition::all()
            .add(vouchers::Column::Status.eq(db_enums::VoucherStatus::Posted))
            .add(vouchers::Column::DeletedAt.is_null());
        let models = vouchers::Entity::find()
            .filter(vouchers::Column::TenantId.eq(Uuid::from(tenant_id)))
            .filter(
                Condition::any()
                    .add(
                        live_posted
                            .clone()
                            .add(vouchers::Column::BalancesUpdated.eq(false)),
                    )
                    .add(
                        Condition::all()
                            .add(live_posted.not())
                            .add(vouchers::Column::BalancesUpdated.eq(true)),
                    ),
            )
            .order_by_asc(vouchers::Column::Id)
            .all(&self.txn)
            .await?;
        Ok(models.into_iter().map(convert::voucher).collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.txn.rollback().await?;
        Ok(())
    }
}
