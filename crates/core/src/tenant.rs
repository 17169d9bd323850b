//! Tenants and the active-tenant context.
//!
//! Every ledger operation takes the acting tenant explicitly. Callers that
//! hold the tenant in some request context resolve it through
//! [`TenantContext`] and [`require_tenant`]; a missing tenant is an error,
//! never a default.

use serde::{Deserialize, Serialize};
use tally_shared::types::TenantId;

use crate::workflow::error::WorkflowError;

/// An isolated company whose books never mix with another's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique identifier.
    pub id: TenantId,
    /// Short code used in document number prefixes.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Inactive tenants accept no operations.
    pub is_active: bool,
}

impl Tenant {
    /// Creates an active tenant.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(),
            code: code.into(),
            name: name.into(),
            is_active: true,
        }
    }
}

/// Supplies the tenant a call is made for.
pub trait TenantContext {
    /// Returns the active tenant, if one is set.
    fn current_tenant(&self) -> Option<TenantId>;
}

impl TenantContext for Option<TenantId> {
    fn current_tenant(&self) -> Option<TenantId> {
        *self
    }
}

impl TenantContext for TenantId {
    fn current_tenant(&self) -> Option<TenantId> {
        Some(*self)
    }
}

/// Resolves the active tenant or fails.
///
/// # Errors
///
/// `MissingTenant` if the context carries no tenant.
pub fn require_tenant<C: TenantContext + ?Sized>(ctx: &C) -> Result<TenantId, WorkflowError> {
    ctx.current_tenant().ok_or(WorkflowError::MissingTenant)
}
