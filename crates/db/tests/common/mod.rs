//! Shared fixtures for ledger integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_core::fiscal::AccountingPeriod;
use tally_core::ledger::{Account, AccountType, LineInput, NewVoucher, Voucher, VoucherType};
use tally_core::tenant::Tenant;
use tally_core::workflow::{Actor, Role, RolePermissions};
use tally_db::{MemoryStore, VoucherWorkflow};
use tally_shared::config::LedgerConfig;
use tally_shared::types::{AccountId, TenantId, UserId};

/// One tenant with a Q1 2024 period, a cash and a revenue account.
pub struct Books {
    pub tenant: Tenant,
    pub period: AccountingPeriod,
    pub cash: Account,
    pub revenue: Account,
}

impl Books {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant.id
    }

    pub fn cash_sale(&self, amount: Decimal) -> NewVoucher {
        NewVoucher {
            voucher_type: VoucherType::General,
            date: date(2024, 2, 10),
            party_id: None,
            narration: "Cash sale".into(),
            reference: None,
            lines: vec![
                LineInput::debit(self.cash.id, amount),
                LineInput::credit(self.revenue.id, amount),
            ],
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn account(tenant_id: TenantId, number: &str, name: &str, account_type: AccountType) -> Account {
    Account {
        id: AccountId::new(),
        tenant_id,
        number: number.into(),
        name: name.into(),
        account_type,
        currency: "USD".into(),
        is_active: true,
        allow_direct_posting: true,
        current_balance: Decimal::ZERO,
        balance_last_updated: None,
    }
}

/// Seeds a tenant with its period and two accounts.
pub fn seed_books(store: &MemoryStore, code: &str) -> Books {
    let tenant = Tenant::new(code, format!("{code} Corp"));
    let period = AccountingPeriod::new(tenant.id, "Q1 2024", date(2024, 1, 1), date(2024, 3, 31));
    let cash = account(tenant.id, "1000", "Cash", AccountType::Asset);
    let revenue = account(tenant.id, "4000", "Revenue", AccountType::Income);
    store.insert_tenant(tenant.clone());
    store.insert_period(period.clone());
    store.insert_account(cash.clone());
    store.insert_account(revenue.clone());
    Books {
        tenant,
        period,
        cash,
        revenue,
    }
}

pub fn clerk() -> Actor {
    Actor::new(UserId::new(), Role::DataEntry)
}

pub fn manager() -> Actor {
    Actor::new(UserId::new(), Role::AccountingManager)
}

pub fn workflow(store: &Arc<MemoryStore>, config: LedgerConfig) -> VoucherWorkflow<MemoryStore> {
    VoucherWorkflow::new(Arc::clone(store), Arc::new(RolePermissions::default()), config)
}

/// Creates, submits and approves a voucher.
pub async fn post(
    workflow: &VoucherWorkflow<MemoryStore>,
    tenant_id: TenantId,
    input: NewVoucher,
) -> Voucher {
    let preparer = clerk();
    let approver = manager();
    let draft = workflow.create(tenant_id, &preparer, input).await.unwrap();
    workflow.submit(tenant_id, &preparer, draft.id).await.unwrap();
    workflow
        .approve(tenant_id, &approver, draft.id, None)
        .await
        .unwrap()
}
