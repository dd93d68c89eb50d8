//! MembershipAccessControl - Content access backed by membership status.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, LevelId, UserId};
use crate::ports::{AccessControl, MembershipRepository};

/// Grants access iff the latest membership for the pair is active.
pub struct MembershipAccessControl {
    repository: Arc<dyn MembershipRepository>,
}

impl MembershipAccessControl {
    pub fn new(repository: Arc<dyn MembershipRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl AccessControl for MembershipAccessControl {
    async fn can_access(&self, user_id: UserId, level_id: LevelId) -> Result<bool, DomainError> {
        self.repository.has_access(user_id, level_id).await
    }
}
