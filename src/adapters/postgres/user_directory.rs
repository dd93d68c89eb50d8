//! PostgreSQL implementation of UserDirectory.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::BillingUser;
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::UserDirectory;

/// Reads site users from `billing_users`.
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    display_name: Option<String>,
    login: String,
}

impl From<UserRow> for BillingUser {
    fn from(row: UserRow) -> Self {
        BillingUser {
            id: UserId::new(row.id),
            email: row.email,
            display_name: row.display_name,
            login: row.login,
        }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_user(&self, user_id: UserId) -> Result<Option<BillingUser>, DomainError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, login FROM billing_users WHERE id = $1",
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch user", e))?;

        Ok(row.map(BillingUser::from))
    }
}
