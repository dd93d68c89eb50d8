//! AccessControl port - Answers whether a user may see a level's content.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, LevelId, UserId};

#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn can_access(&self, user_id: UserId, level_id: LevelId) -> Result<bool, DomainError>;
}
