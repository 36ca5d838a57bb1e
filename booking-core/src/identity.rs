use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult, UpstreamError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
    /// Internal schedulers such as the expiry sweep.
    System,
}

/// Who is invoking a ledger operation. Passed explicitly into every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<i64>,
    pub role: Role,
}

impl Caller {
    pub fn customer(user_id: i64) -> Self {
        Self { user_id: Some(user_id), role: Role::Customer }
    }

    pub fn admin(user_id: i64) -> Self {
        Self { user_id: Some(user_id), role: Role::Admin }
    }

    pub fn system() -> Self {
        Self { user_id: None, role: Role::System }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin | Role::System)
    }

    /// Customers may only touch their own reservations.
    pub fn ensure_can_act_for(&self, user_id: i64) -> CoreResult<()> {
        if self.is_privileged() || self.user_id == Some(user_id) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "caller may not act on reservations of user {}",
                user_id
            )))
        }
    }

    pub fn ensure_privileged(&self, operation: &str) -> CoreResult<()> {
        if self.is_privileged() {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!("{} requires an admin role", operation)))
        }
    }
}

/// Remote user directory (the auth service).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn exists(&self, user_id: i64) -> Result<bool, UpstreamError>;
}
