//! UserDirectory port - Read access to site users.

use async_trait::async_trait;

use crate::domain::billing::BillingUser;
use crate::domain::foundation::{DomainError, UserId};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` for unknown users.
    async fn find_user(&self, user_id: UserId) -> Result<Option<BillingUser>, DomainError>;
}
