//! In-memory user directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::billing::BillingUser;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::UserDirectory;

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, BillingUser>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: BillingUser) -> Self {
        self.add_user(user);
        self
    }

    pub fn add_user(&self, user: BillingUser) {
        let mut users = match self.users.write() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: UserId) -> Result<Option<BillingUser>, DomainError> {
        let users = match self.users.read() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(users.get(&user_id).cloned())
    }
}
