//! Role-based permission checks for voucher actions.
//!
//! The workflow consults a [`PermissionChecker`] on every transition.
//! [`RolePermissions`] is the default role map; deployments with their own
//! authorization model implement the trait instead.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tally_shared::types::UserId;

use crate::ledger::voucher::Voucher;
use crate::workflow::types::VoucherAction;

/// Role of a user within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Tenant owner.
    Owner,
    /// Tenant administrator.
    Admin,
    /// Head of accounting.
    AccountingManager,
    /// Bookkeeper.
    Accountant,
    /// Enters drafts.
    DataEntry,
    /// Raises sales documents.
    SalesRep,
    /// Raises purchase documents.
    PurchaseOfficer,
    /// Reads and comments.
    Auditor,
    /// Reads only.
    ViewOnly,
}

impl Role {
    /// All roles.
    pub const ALL: [Self; 9] = [
        Self::Owner,
        Self::Admin,
        Self::AccountingManager,
        Self::Accountant,
        Self::DataEntry,
        Self::SalesRep,
        Self::PurchaseOfficer,
        Self::Auditor,
        Self::ViewOnly,
    ];

    /// Parse a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "accounting_manager" => Some(Self::AccountingManager),
            "accountant" => Some(Self::Accountant),
            "data_entry" => Some(Self::DataEntry),
            "sales_rep" => Some(Self::SalesRep),
            "purchase_officer" => Some(Self::PurchaseOfficer),
            "auditor" => Some(Self::Auditor),
            "view_only" | "viewer" => Some(Self::ViewOnly),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::AccountingManager => "accounting_manager",
            Self::Accountant => "accountant",
            Self::DataEntry => "data_entry",
            Self::SalesRep => "sales_rep",
            Self::PurchaseOfficer => "purchase_officer",
            Self::Auditor => "auditor",
            Self::ViewOnly => "view_only",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user performing an operation, with their role in the active tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The user.
    pub user_id: UserId,
    /// Role within the active tenant.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Decides whether an actor may perform an action.
pub trait PermissionChecker: Send + Sync {
    /// Returns true if `actor` may perform `action`, optionally on `voucher`.
    fn has_permission(&self, actor: &Actor, action: VoucherAction, voucher: Option<&Voucher>) -> bool;
}

/// Static role-to-action map.
#[derive(Debug, Clone)]
pub struct RolePermissions {
    grants: HashMap<Role, HashSet<VoucherAction>>,
}

impl RolePermissions {
    /// Creates an empty map that denies everything.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    /// Grants `action` to every role in `roles`.
    #[must_use]
    pub fn grant(mut self, action: VoucherAction, roles: &[Role]) -> Self {
        for role in roles {
            self.grants.entry(*role).or_default().insert(action);
        }
        self
    }

    /// Returns true if the role holds the action.
    #[must_use]
    pub fn allows(&self, role: Role, action: VoucherAction) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|actions| actions.contains(&action))
    }
}

impl Default for RolePermissions {
    fn default() -> Self {
        use Role::{
            Accountant, AccountingManager, Admin, Auditor, DataEntry, Owner, PurchaseOfficer,
            SalesRep,
        };
        use VoucherAction::{Approve, Cancel, Comment, Create, Delete, Edit, Reject, Reverse, Submit};

        let preparers = [
            Owner,
            Admin,
            AccountingManager,
            Accountant,
            DataEntry,
            SalesRep,
            PurchaseOfficer,
        ];
        let editors = [Owner, Admin, AccountingManager, Accountant, DataEntry];
        let approvers = [Owner, Admin, AccountingManager, Accountant];
        let managers = [Owner, Admin, AccountingManager];
        let commenters = [
            Owner,
            Admin,
            AccountingManager,
            Accountant,
            DataEntry,
            SalesRep,
            PurchaseOfficer,
            Auditor,
        ];

        Self::empty()
            .grant(Create, &preparers)
            .grant(Submit, &preparers)
            .grant(Edit, &editors)
            .grant(Approve, &approvers)
            .grant(Reverse, &approvers)
            .grant(Reject, &managers)
            .grant(Delete, &managers)
            .grant(Cancel, &managers)
            .grant(Comment, &commenters)
    }
}

impl PermissionChecker for RolePermissions {
    fn has_permission(&self, actor: &Actor, action: VoucherAction, _voucher: Option<&Voucher>) -> bool {
        self.allows(actor.role, action)
    }
}
