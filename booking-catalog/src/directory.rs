use async_trait::async_trait;
use booking_core::{UpstreamError, UserDirectory};
use std::collections::HashSet;
use std::sync::RwLock;

/// Fixed set of known users, for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashSet<i64>>,
    unavailable: RwLock<Option<String>>,
}

impl InMemoryUserDirectory {
    pub fn new<I: IntoIterator<Item = i64>>(users: I) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
            unavailable: RwLock::new(None),
        }
    }

    pub fn add(&self, user_id: i64) {
        self.users.write().unwrap_or_else(|p| p.into_inner()).insert(user_id);
    }

    /// Make every lookup fail as if the auth service were down.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.write().unwrap_or_else(|p| p.into_inner()) = reason.map(str::to_string);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn exists(&self, user_id: i64) -> Result<bool, UpstreamError> {
        if let Some(message) = self.unavailable.read().unwrap_or_else(|p| p.into_inner()).clone() {
            return Err(UpstreamError::Unavailable { service: "auth-service", message });
        }
        Ok(self.users.read().unwrap_or_else(|p| p.into_inner()).contains(&user_id))
    }
}
