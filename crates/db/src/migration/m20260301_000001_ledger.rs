//! Ledger schema.
//!
//! Creates the enums, tenant registry, chart of accounts, periods, vouchers,
//! numbering counters and audit log, with row-level security on every
//! tenant-owned table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: TENANTS, PERIODS, ACCOUNTS
        // ============================================================
        db.execute_unprepared(TENANTS_SQL).await?;
        db.execute_unprepared(ACCOUNTING_PERIODS_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 3: VOUCHERS
        // ============================================================
        db.execute_unprepared(VOUCHERS_SQL).await?;
        db.execute_unprepared(VOUCHER_LINES_SQL).await?;
        db.execute_unprepared(VOUCHER_SEQUENCES_SQL).await?;
        db.execute_unprepared(VOUCHER_APPROVALS_SQL).await?;

        // ============================================================
        // PART 4: ROW LEVEL SECURITY
        // ============================================================
        db.execute_unprepared(RLS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE account_type AS ENUM (
    'asset',
    'liability',
    'equity',
    'income',
    'expense',
    'cogs'
);

CREATE TYPE dr_cr AS ENUM ('debit', 'credit');

CREATE TYPE voucher_type AS ENUM (
    'general',
    'sales',
    'purchase',
    'receipt',
    'payment',
    'contra'
);

CREATE TYPE voucher_status AS ENUM (
    'draft',
    'pending_approval',
    'posted',
    'rejected',
    'cancelled'
);

CREATE TYPE approval_action AS ENUM (
    'submitted',
    'approved',
    'rejected',
    'cancelled',
    'commented'
);
";

const TENANTS_SQL: &str = r"
CREATE TABLE tenants (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    code VARCHAR(20) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const ACCOUNTING_PERIODS_SQL: &str = r"
CREATE TABLE accounting_periods (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name VARCHAR(100) NOT NULL,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    fiscal_year INTEGER NOT NULL,
    is_locked BOOLEAN NOT NULL DEFAULT false,
    CHECK (end_date >= start_date)
);

CREATE INDEX idx_periods_tenant_dates ON accounting_periods(tenant_id, start_date, end_date);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    number VARCHAR(20) NOT NULL,
    name VARCHAR(255) NOT NULL,
    account_type account_type NOT NULL,
    currency CHAR(3) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    allow_direct_posting BOOLEAN NOT NULL DEFAULT true,
    current_balance NUMERIC(19, 4) NOT NULL DEFAULT 0,
    balance_last_updated TIMESTAMPTZ,
    UNIQUE (tenant_id, number)
);

CREATE INDEX idx_accounts_tenant ON accounts(tenant_id) WHERE is_active = true;
";

const VOUCHERS_SQL: &str = r"
CREATE TABLE vouchers (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    voucher_type voucher_type NOT NULL,
    accounting_period_id UUID NOT NULL REFERENCES accounting_periods(id),
    voucher_date DATE NOT NULL,
    party_id UUID,
    status voucher_status NOT NULL DEFAULT 'draft',
    voucher_number VARCHAR(100),
    balances_updated BOOLEAN NOT NULL DEFAULT false,
    needs_reconciliation BOOLEAN NOT NULL DEFAULT false,
    narration TEXT NOT NULL DEFAULT '',
    reference VARCHAR(100),
    is_reversed BOOLEAN NOT NULL DEFAULT false,
    reversed_by_voucher UUID REFERENCES vouchers(id),
    is_reversal_for UUID REFERENCES vouchers(id),
    created_by UUID NOT NULL,
    approved_by UUID,
    approved_at TIMESTAMPTZ,
    posted_by UUID,
    posted_at TIMESTAMPTZ,
    deleted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tenant_id, voucher_number)
);

CREATE INDEX idx_vouchers_tenant_status ON vouchers(tenant_id, status) WHERE deleted_at IS NULL;
CREATE INDEX idx_vouchers_tenant_date ON vouchers(tenant_id, voucher_date);
CREATE INDEX idx_vouchers_flagged ON vouchers(tenant_id) WHERE needs_reconciliation = true;
";

const VOUCHER_LINES_SQL: &str = r"
CREATE TABLE voucher_lines (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    voucher_id UUID NOT NULL REFERENCES vouchers(id) ON DELETE CASCADE,
    line_number INTEGER NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    dr_cr dr_cr NOT NULL,
    amount NUMERIC(19, 4) NOT NULL CHECK (amount > 0),
    narration TEXT NOT NULL DEFAULT '',
    UNIQUE (voucher_id, line_number)
);

CREATE INDEX idx_voucher_lines_account ON voucher_lines(tenant_id, account_id);
";

const VOUCHER_SEQUENCES_SQL: &str = r"
CREATE TABLE voucher_sequences (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    voucher_type voucher_type NOT NULL,
    accounting_period_id UUID NOT NULL REFERENCES accounting_periods(id),
    prefix VARCHAR(50) NOT NULL,
    padding_digits SMALLINT NOT NULL DEFAULT 4,
    last_number BIGINT NOT NULL DEFAULT 0 CHECK (last_number >= 0),
    UNIQUE (tenant_id, voucher_type, accounting_period_id)
);
";

const VOUCHER_APPROVALS_SQL: &str = r"
CREATE TABLE voucher_approvals (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    voucher_id UUID NOT NULL REFERENCES vouchers(id),
    action approval_action NOT NULL,
    from_status voucher_status NOT NULL,
    to_status voucher_status NOT NULL,
    actor UUID NOT NULL,
    comment TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_voucher_approvals_voucher ON voucher_approvals(voucher_id, created_at);
";

// The tenant registry itself stays readable so that maintenance jobs can
// enumerate tenants before taking one on.
const RLS_SQL: &str = r"
ALTER TABLE accounting_periods ENABLE ROW LEVEL SECURITY;
ALTER TABLE accounts ENABLE ROW LEVEL SECURITY;
ALTER TABLE vouchers ENABLE ROW LEVEL SECURITY;
ALTER TABLE voucher_lines ENABLE ROW LEVEL SECURITY;
ALTER TABLE voucher_sequences ENABLE ROW LEVEL SECURITY;
ALTER TABLE voucher_approvals ENABLE ROW LEVEL SECURITY;

ALTER TABLE accounting_periods FORCE ROW LEVEL SECURITY;
ALTER TABLE accounts FORCE ROW LEVEL SECURITY;
ALTER TABLE vouchers FORCE ROW LEVEL SECURITY;
ALTER TABLE voucher_lines FORCE ROW LEVEL SECURITY;
ALTER TABLE voucher_sequences FORCE ROW LEVEL SECURITY;
ALTER TABLE voucher_approvals FORCE ROW LEVEL SECURITY;

CREATE POLICY tenant_isolation ON accounting_periods
    USING (tenant_id = current_setting('app.current_tenant_id', true)::UUID);

CREATE POLICY tenant_isolation ON accounts
    USING (tenant_id = current_setting('app.current_tenant_id', true)::UUID);

CREATE POLICY tenant_isolation ON vouchers
    USING (tenant_id = current_setting('app.current_tenant_id', true)::UUID);

CREATE POLICY tenant_isolation ON voucher_lines
    USING (tenant_id = current_setting('app.current_tenant_id', true)::UUID);

CREATE POLICY tenant_isolation ON voucher_sequences
    USING (tenant_id = current_setting('app.current_tenant_id', true)::UUID);

CREATE POLICY tenant_isolation ON voucher_approvals
    USING (tenant_id = current_setting('app.current_tenant_id', true)::UUID);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS voucher_approvals CASCADE;
DROP TABLE IF EXISTS voucher_sequences CASCADE;
DROP TABLE IF EXISTS voucher_lines CASCADE;
DROP TABLE IF EXISTS vouchers CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;
DROP TABLE IF EXISTS accounting_periods CASCADE;
DROP TABLE IF EXISTS tenants CASCADE;

DROP TYPE IF EXISTS approval_action;
DROP TYPE IF EXISTS voucher_status;
DROP TYPE IF EXISTS voucher_type;
DROP TYPE IF EXISTS dr_cr;
DROP TYPE IF EXISTS account_type;
";
