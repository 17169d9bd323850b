//! Mapping between entity models and ledger types.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::Set;

use tally_core::fiscal::AccountingPeriod;
use tally_core::ledger::{Account, AccountType, DrCr, Voucher, VoucherLine, VoucherType};
use tally_core::sequence::VoucherSequence;
use tally_core::tenant::Tenant;
use tally_core::workflow::{ApprovalAction, VoucherApproval, VoucherStatus};
use tally_shared::types::TenantId;

use super::StoreError;
use crate::entities::{
    accounting_periods, accounts, sea_orm_active_enums as db_enums, tenants, voucher_approvals,
    voucher_lines, voucher_sequences, vouchers,
};

fn utc(ts: DateTime<FixedOffset>) -> DateTime<Utc> {
    ts.with_timezone(&Utc)
}

fn fixed(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.fixed_offset()
}

impl From<db_enums::AccountType> for AccountType {
    fn from(value: db_enums::AccountType) -> Self {
        match value {
            db_enums::AccountType::Asset => Self::Asset,
            db_enums::AccountType::Liability => Self::Liability,
            db_enums::AccountType::Equity => Self::Equity,
            db_enums::AccountType::Income => Self::Income,
            db_enums::AccountType::Expense => Self::Expense,
            db_enums::AccountType::Cogs => Self::Cogs,
        }
    }
}

impl From<AccountType> for db_enums::AccountType {
    fn from(value: AccountType) -> Self {
        match value {
            AccountType::Asset => Self::Asset,
            AccountType::Liability => Self::Liability,
            AccountType::Equity => Self::Equity,
            AccountType::Income => Self::Income,
            AccountType::Expense => Self::Expense,
            AccountType::Cogs => Self::Cogs,
        }
    }
}

impl From<db_enums::DrCr> for DrCr {
    fn from(value: db_enums::DrCr) -> Self {
        match value {
            db_enums::DrCr::Debit => Self::Debit,
            db_enums::DrCr::Credit => Self::Credit,
        }
    }
}

impl From<DrCr> for db_enums::DrCr {
    fn from(value: DrCr) -> Self {
        match value {
            DrCr::Debit => Self::Debit,
            DrCr::Credit => Self::Credit,
        }
    }
}

impl From<db_enums::VoucherType> for VoucherType {
    fn from(value: db_enums::VoucherType) -> Self {
        match value {
            db_enums::VoucherType::General => Self::General,
            db_enums::VoucherType::Sales => Self::Sales,
            db_enums::VoucherType::Purchase => Self::Purchase,
            db_enums::VoucherType::Receipt => Self::Receipt,
            db_enums::VoucherType::Payment => Self::Payment,
            db_enums::VoucherType::Contra => Self::Contra,
        }
    }
}

impl From<VoucherType> for db_enums::VoucherType {
    fn from(value: VoucherType) -> Self {
        match value {
            VoucherType::General => Self::General,
            VoucherType::Sales => Self::Sales,
            VoucherType::Purchase => Self::Purchase,
            VoucherType::Receipt => Self::Receipt,
            VoucherType::Payment => Self::Payment,
            VoucherType::Contra => Self::Contra,
        }
    }
}

impl From<db_enums::VoucherStatus> for VoucherStatus {
    fn from(value: db_enums::VoucherStatus) -> Self {
        match value {
            db_enums::VoucherStatus::Draft => Self::Draft,
            db_enums::VoucherStatus::PendingApproval => Self::PendingApproval,
            db_enums::VoucherStatus::Posted => Self::Posted,
            db_enums::VoucherStatus::Rejected => Self::Rejected,
            db_enums::VoucherStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<VoucherStatus> for db_enums::VoucherStatus {
    fn from(value: VoucherStatus) -> Self {
        match value {
            VoucherStatus::Draft => Self::Draft,
            VoucherStatus::PendingApproval => Self::PendingApproval,
            VoucherStatus::Posted => Self::Posted,
            VoucherStatus::Rejected => Self::Rejected,
            VoucherStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<db_enums::ApprovalAction> for ApprovalAction {
    fn from(value: db_enums::ApprovalAction) -> Self {
        match value {
            db_enums::ApprovalAction::Submitted => Self::Submitted,
            db_enums::ApprovalAction::Approved => Self::Approved,
            db_enums::ApprovalAction::Rejected => Self::Rejected,
            db_enums::ApprovalAction::Cancelled => Self::Cancelled,
            db_enums::ApprovalAction::Commented => Self::Commented,
        }
    }
}

impl From<ApprovalAction> for db_enums::ApprovalAction {
    fn from(value: ApprovalAction) -> Self {
        match value {
            ApprovalAction::Submitted => Self::Submitted,
            ApprovalAction::Approved => Self::Approved,
            ApprovalAction::Rejected => Self::Rejected,
            ApprovalAction::Cancelled => Self::Cancelled,
            ApprovalAction::Commented => Self::Commented,
        }
    }
}

pub(super) fn tenant(model: tenants::Model) -> Tenant {
    Tenant {
        id: model.id.into(),
        code: model.code,
        name: model.name,
        is_active: model.is_active,
    }
}

pub(super) fn period(model: accounting_periods::Model) -> AccountingPeriod {
    AccountingPeriod {
        id: model.id.into(),
        tenant_id: model.tenant_id.into(),
        name: model.name,
        start_date: model.start_date,
        end_date: model.end_date,
        fiscal_year: model.fiscal_year,
        locked: model.is_locked,
    }
}

pub(super) fn account(model: accounts::Model) -> Account {
    Account {
        id: model.id.into(),
        tenant_id: model.tenant_id.into(),
        number: model.number,
        name: model.name,
        account_type: model.account_type.into(),
        currency: model.currency,
        is_active: model.is_active,
        allow_direct_posting: model.allow_direct_posting,
        current_balance: model.current_balance,
        balance_last_updated: model.balance_last_updated.map(utc),
    }
}

pub(super) fn voucher(model: vouchers::Model) -> Voucher {
    Voucher {
        id: model.id.into(),
        tenant_id: model.tenant_id.into(),
        voucher_type: model.voucher_type.into(),
        accounting_period_id: model.accounting_period_id.into(),
        date: model.voucher_date,
        party_id: model.party_id.map(Into::into),
        status: model.status.into(),
        voucher_number: model.voucher_number,
        balances_updated: model.balances_updated,
        needs_reconciliation: model.needs_reconciliation,
        narration: model.narration,
        reference: model.reference,
        is_reversed: model.is_reversed,
        reversed_by_voucher: model.reversed_by_voucher.map(Into::into),
        is_reversal_for: model.is_reversal_for.map(Into::into),
        created_by: model.created_by.into(),
        approved_by: model.approved_by.map(Into::into),
        approved_at: model.approved_at.map(utc),
        posted_by: model.posted_by.map(Into::into),
        posted_at: model.posted_at.map(utc),
        deleted_at: model.deleted_at.map(utc),
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    }
}

pub(super) fn voucher_active(v: &Voucher) -> vouchers::ActiveModel {
    vouchers::ActiveModel {
        id: Set(v.id.into()),
        tenant_id: Set(v.tenant_id.into()),
        voucher_type: Set(v.voucher_type.into()),
        accounting_period_id: Set(v.accounting_period_id.into()),
        voucher_date: Set(v.date),
        party_id: Set(v.party_id.map(Into::into)),
        status: Set(v.status.into()),
        voucher_number: Set(v.voucher_number.clone()),
        balances_updated: Set(v.balances_updated),
        needs_reconciliation: Set(v.needs_reconciliation),
        narration: Set(v.narration.clone()),
        reference: Set(v.reference.clone()),
        is_reversed: Set(v.is_reversed),
        reversed_by_voucher: Set(v.reversed_by_voucher.map(Into::into)),
        is_reversal_for: Set(v.is_reversal_for.map(Into::into)),
        created_by: Set(v.created_by.into()),
        approved_by: Set(v.approved_by.map(Into::into)),
        approved_at: Set(v.approved_at.map(fixed)),
        posted_by: Set(v.posted_by.map(Into::into)),
        posted_at: Set(v.posted_at.map(fixed)),
        deleted_at: Set(v.deleted_at.map(fixed)),
        created_at: Set(fixed(v.created_at)),
        updated_at: Set(fixed(v.updated_at)),
    }
}

pub(super) fn line(model: voucher_lines::Model) -> VoucherLine {
    VoucherLine {
        id: model.id.into(),
        voucher_id: model.voucher_id.into(),
        account_id: model.account_id.into(),
        dr_cr: model.dr_cr.into(),
        amount: model.amount,
        narration: model.narration,
    }
}

pub(super) fn line_active(
    tenant_id: TenantId,
    position: usize,
    line: &VoucherLine,
) -> Result<voucher_lines::ActiveModel, StoreError> {
    let line_number = i32::try_from(position + 1)
        .map_err(|_| StoreError::Conflict(format!("too many lines on voucher {}", line.voucher_id)))?;
    Ok(voucher_lines::ActiveModel {
        id: Set(line.id.into()),
        tenant_id: Set(tenant_id.into()),
        voucher_id: Set(line.voucher_id.into()),
        line_number: Set(line_number),
        account_id: Set(line.account_id.into()),
        dr_cr: Set(line.dr_cr.into()),
        amount: Set(line.amount),
        narration: Set(line.narration.clone()),
    })
}

pub(super) fn sequence(model: voucher_sequences::Model) -> Result<VoucherSequence, StoreError> {
    let padding_digits = u8::try_from(model.padding_digits)
        .map_err(|_| StoreError::Database(format!("sequence {} has invalid padding", model.id)))?;
    let last_number = u64::try_from(model.last_number)
        .map_err(|_| StoreError::Database(format!("sequence {} has a negative counter", model.id)))?;
    Ok(VoucherSequence {
        id: model.id.into(),
        tenant_id: model.tenant_id.into(),
        voucher_type: model.voucher_type.into(),
        accounting_period_id: model.accounting_period_id.into(),
        prefix: model.prefix,
        padding_digits,
        last_number,
    })
}

pub(super) fn sequence_active(
    seq: &VoucherSequence,
) -> Result<voucher_sequences::ActiveModel, StoreError> {
    let last_number = i64::try_from(seq.last_number)
        .map_err(|_| StoreError::Conflict(format!("sequence {} overflowed", seq.id)))?;
    Ok(voucher_sequences::ActiveModel {
        id: Set(seq.id.into()),
        tenant_id: Set(seq.tenant_id.into()),
        voucher_type: Set(seq.voucher_type.into()),
        accounting_period_id: Set(seq.accounting_period_id.into()),
        prefix: Set(seq.prefix.clone()),
        padding_digits: Set(i16::from(seq.padding_digits)),
        last_number: Set(last_number),
    })
}

pub(super) fn approval(model: voucher_approvals::Model) -> VoucherApproval {
    VoucherApproval {
        id: model.id.into(),
        tenant_id: model.tenant_id.into(),
        voucher_id: model.voucher_id.into(),
        action: model.action.into(),
        from_status: model.from_status.into(),
        to_status: model.to_status.into(),
        actor: model.actor.into(),
        created_at: utc(model.created_at),
        comment: model.comment,
    }
}

pub(super) fn approval_active(entry: &VoucherApproval) -> voucher_approvals::ActiveModel {
    voucher_approvals::ActiveModel {
        id: Set(entry.id.into()),
        tenant_id: Set(entry.tenant_id.into()),
        voucher_id: Set(entry.voucher_id.into()),
        action: Set(entry.action.into()),
        from_status: Set(entry.from_status.into()),
        to_status: Set(entry.to_status.into()),
        actor: Set(entry.actor.into()),
        comment: Set(entry.comment.clone()),
        created_at: Set(fixed(entry.created_at)),
    }
}
