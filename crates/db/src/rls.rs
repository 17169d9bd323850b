//! Row-Level Security (RLS) context management.
//!
//! Every tenant-owned table carries a `tenant_isolation` policy comparing
//! `tenant_id` with the `app.current_tenant_id` setting. The setting is
//! applied with `SET LOCAL`, so it lives exactly as long as the
//! transaction that set it.

use sea_orm::{ConnectionTrait, DatabaseTransaction, DbErr};
use tally_shared::types::TenantId;

/// Returns the statement that scopes a transaction to one tenant.
#[must_use]
pub fn tenant_context_sql(tenant_id: TenantId) -> String {
    // TenantId only ever renders as a hyphenated UUID, which is safe to inline.
    format!("SET LOCAL app.current_tenant_id = '{tenant_id}'")
}

/// Sets the RLS context on an existing transaction.
///
/// # Errors
///
/// Returns an error if the RLS context cannot be set.
pub async fn set_rls_context(txn: &DatabaseTransaction, tenant_id: TenantId) -> Result<(), DbErr> {
    txn.execute_unprepared(&tenant_context_sql(tenant_id)).await?;
    Ok(())
}
