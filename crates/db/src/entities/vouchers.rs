//! `SeaORM` Entity for vouchers table.

use super::sea_orm_active_enums::{VoucherStatus, VoucherType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub voucher_type: VoucherType,
    pub accounting_period_id: Uuid,
    pub voucher_date: Date,
    pub party_id: Option<Uuid>,
    pub status: VoucherStatus,
    pub voucher_number: Option<String>,
    pub balances_updated: bool,
    pub needs_reconciliation: bool,
    #[sea_orm(column_type = "Text")]
    pub narration: String,
    pub reference: Option<String>,
    pub is_reversed: bool,
    pub reversed_by_voucher: Option<Uuid>,
    pub is_reversal_for: Option<Uuid>,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTimeWithTimeZone>,
    pub posted_by: Option<Uuid>,
    pub posted_at: Option<DateTimeWithTimeZone>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenants::Entity",
        from = "Column::TenantId",
        to = "super::tenants::Column::Id"
    )]
    Tenants,
    #[sea_orm(
        belongs_to = "super::accounting_periods::Entity",
        from = "Column::AccountingPeriodId",
        to = "super::accounting_periods::Column::Id"
    )]
    AccountingPeriods,
    #[sea_orm(has_many = "super::voucher_lines::Entity")]
    VoucherLines,
    #[sea_orm(has_many = "super::voucher_approvals::Entity")]
    VoucherApprovals,
}

impl Related<super::tenants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenants.def()
    }
}

impl Related<super::accounting_periods::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccountingPeriods.def()
    }
}

impl Related<super::voucher_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VoucherLines.def()
    }
}

impl Related<super::voucher_approvals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VoucherApprovals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
