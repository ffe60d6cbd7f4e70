use serde::{Deserialize, Serialize};

use repset_core::{DomainError, UserId};
use repset_members::MemberId;
use repset_memberships::MembershipId;

/// Direction of a cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// Cash movement category. Income and expense draw from disjoint sets,
/// except `Other`, which is valid on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    // income
    Membership,
    Extra,
    Product,
    Service,
    // expense
    Withdrawal,
    Supplier,
    Services,
    Maintenance,
    Salary,
    // both
    Other,
}

impl TransactionCategory {
    /// Whether this category is valid for the given movement kind.
    pub fn allows(&self, kind: TransactionKind) -> bool {
        use TransactionCategory::*;
        match self {
            Membership | Extra | Product | Service => kind == TransactionKind::Income,
            Withdrawal | Supplier | Services | Maintenance | Salary => {
                kind == TransactionKind::Expense
            }
            Other => true,
        }
    }
}

/// How the money changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

/// Who recorded the movement (for the audit trail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
}

/// One cash movement. Amounts are positive cents; the sign lives in `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub kind: TransactionKind,
    pub category: TransactionCategory,
    pub amount: i64,
    pub description: String,
    pub recorded_by: Actor,
    pub payment_method: PaymentMethod,
    pub member_id: Option<MemberId>,
    pub membership_id: Option<MembershipId>,
}

impl TransactionEntry {
    /// Structural validation, shared by the aggregate guard and the API edge.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if !self.category.allows(self.kind) {
            return Err(DomainError::validation("category does not match kind"));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }
        Ok(())
    }
}
