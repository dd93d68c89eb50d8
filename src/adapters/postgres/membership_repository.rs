//! PostgreSQL implementation of MembershipRepository.
//!
//! Lifecycle transitions never delete rows; a terminal row stays as history
//! and `assign` inserts a fresh one. Only `delete_by_id` removes a row.
//! The partial unique index `memberships_live_pair_key` keeps one live row
//! per (user, level).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::billing::BillingPeriod;
use crate::domain::foundation::{
    DomainError, ErrorCode, LevelId, MembershipId, Money, StatusLog, Timestamp, UserId,
};
use crate::domain::membership::{AssignOptions, BillingProfile, Membership, MembershipStatus};
use crate::ports::{MembershipPage, MembershipQuery, MembershipRepository, MembershipSort};

const LIVE_PAIR_CONSTRAINT: &str = "memberships_live_pair_key";

const COLUMNS: &str = "id, user_id, level_id, status, start_date, end_date, paused_at, \
    pause_until, payment_method, customer_id, subscription_id, billing_amount, cycle_number, \
    cycle_period, status_log, version, created_at, updated_at";

/// PostgreSQL implementation of the MembershipRepository port.
pub struct PostgresMembershipRepository {
    pool: PgPool,
}

impl PostgresMembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: MembershipId) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM memberships WHERE id = $1)")
            .bind(id.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to check membership", e))
    }
}

/// Database row representation of a membership.
#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: i64,
    user_id: i64,
    level_id: i64,
    status: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    pause_until: Option<DateTime<Utc>>,
    payment_method: Option<String>,
    customer_id: Option<String>,
    subscription_id: Option<String>,
    billing_amount: Option<Decimal>,
    cycle_number: Option<i32>,
    cycle_period: Option<String>,
    status_log: Json<StatusLog<MembershipStatus>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = DomainError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let status = parse_status(&row.status)?;
        let cycle_period = row
            .cycle_period
            .as_deref()
            .map(str::parse::<BillingPeriod>)
            .transpose()
            .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid cycle period: {}", e)))?;

        Ok(Membership {
            id: MembershipId::new(row.id),
            user_id: UserId::new(row.user_id),
            level_id: LevelId::new(row.level_id),
            status,
            start_date: Timestamp::from_datetime(row.start_date),
            end_date: row.end_date.map(Timestamp::from_datetime),
            paused_at: row.paused_at.map(Timestamp::from_datetime),
            pause_until: row.pause_until.map(Timestamp::from_datetime),
            billing: BillingProfile {
                payment_method: row.payment_method,
                customer_id: row.customer_id,
                subscription_id: row.subscription_id,
                billing_amount: row.billing_amount.map(Money::new),
                cycle_number: row.cycle_number,
                cycle_period,
            },
            status_log: row.status_log.0,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn parse_status(s: &str) -> Result<MembershipStatus, DomainError> {
    s.parse().map_err(|_| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid status value: {}", s),
        )
    })
}

fn convert(rows: Vec<MembershipRow>) -> Result<Vec<Membership>, DomainError> {
    rows.into_iter().map(Membership::try_from).collect()
}

fn is_live_pair_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(LIVE_PAIR_CONSTRAINT))
}

/// ORDER BY clause; NULL end dates sort as the smallest value.
fn order_by(query: &MembershipQuery) -> String {
    let direction = if query.descending { "DESC" } else { "ASC" };
    let nulls = if query.descending { "NULLS LAST" } else { "NULLS FIRST" };
    match query.sort {
        MembershipSort::Id => format!("id {}", direction),
        sort => format!("{} {} {}, id {}", sort.column(), direction, nulls, direction),
    }
}

fn db_time(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl MembershipRepository for PostgresMembershipRepository {
    async fn find(
        &self,
        user_id: UserId,
        level_id: LevelId,
    ) -> Result<Option<Membership>, DomainError> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE user_id = $1 AND level_id = $2 \
             ORDER BY id DESC LIMIT 1",
            COLUMNS
        );
        sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(user_id.as_i64())
            .bind(level_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch membership", e))?
            .map(Membership::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: MembershipId) -> Result<Option<Membership>, DomainError> {
        let sql = format!("SELECT {} FROM memberships WHERE id = $1", COLUMNS);
        sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch membership", e))?
            .map(Membership::try_from)
            .transpose()
    }

    async fn find_many(&self, ids: &[MembershipId]) -> Result<Vec<Membership>, DomainError> {
        let ids: Vec<i64> = ids.iter().map(|id| id.as_i64()).filter(|id| *id > 0).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM memberships WHERE id = ANY($1) ORDER BY id",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch memberships", e))?;
        convert(rows)
    }

    async fn paginate(&self, query: &MembershipQuery) -> Result<MembershipPage, DomainError> {
        let (page, per_page) = query.normalized();
        let condition = "($1::bigint IS NULL OR user_id = $1) \
             AND ($2::bigint IS NULL OR level_id = $2) \
             AND ($3::text IS NULL OR status = $3)";

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM memberships WHERE {}",
            condition
        ))
        .bind(query.user_id.map(|u| u.as_i64()))
        .bind(query.level_id.map(|l| l.as_i64()))
        .bind(query.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to count memberships", e))?;

        let rows = sqlx::query_as::<_, MembershipRow>(&format!(
            "SELECT {} FROM memberships WHERE {} ORDER BY {} LIMIT $4 OFFSET $5",
            COLUMNS,
            condition,
            order_by(query)
        ))
        .bind(query.user_id.map(|u| u.as_i64()))
        .bind(query.level_id.map(|l| l.as_i64()))
        .bind(query.status.map(|s| s.as_str()))
        .bind(i64::from(per_page))
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch memberships page", e))?;

        Ok(MembershipPage {
            memberships: convert(rows)?,
            total: u64::try_from(total).unwrap_or_default(),
            page,
            per_page,
        })
    }

    async fn delete_by_id(&self, id: MembershipId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM memberships WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to delete membership", e))?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(membership_id = %id, "Membership row deleted");
        }
        Ok(deleted)
    }

    async fn find_active(&self, user_id: UserId) -> Result<Vec<Membership>, DomainError> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE user_id = $1 AND status = 'active' ORDER BY id",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(user_id.as_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch active memberships", e))?;
        convert(rows)
    }

    async fn find_by_level(
        &self,
        level_id: LevelId,
        statuses: &[MembershipStatus],
    ) -> Result<Vec<Membership>, DomainError> {
        let sql = format!(
            "SELECT {cols} FROM ( \
                SELECT DISTINCT ON (user_id) {cols} FROM memberships \
                WHERE level_id = $1 ORDER BY user_id, id DESC \
             ) latest \
             WHERE cardinality($2::text[]) = 0 OR status = ANY($2) \
             ORDER BY id",
            cols = COLUMNS
        );
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(level_id.as_i64())
            .bind(statuses)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch level memberships", e))?;
        convert(rows)
    }

    async fn find_expiring(&self, days: i64) -> Result<Vec<Membership>, DomainError> {
        let now = Timestamp::now();
        let sql = format!(
            "SELECT {} FROM memberships WHERE status = 'active' \
             AND end_date > $1 AND end_date <= $2 ORDER BY end_date",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(now.as_datetime())
            .bind(now.add_days(days).as_datetime())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch expiring memberships", e))?;
        convert(rows)
    }

    async fn find_lapsed(&self, as_of: Timestamp) -> Result<Vec<Membership>, DomainError> {
        let sql = format!(
            "SELECT {} FROM memberships WHERE status = 'active' \
             AND end_date <= $1 ORDER BY end_date",
            COLUMNS
        );
        let rows = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(as_of.as_datetime())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch lapsed memberships", e))?;
        convert(rows)
    }

    async fn insert(
        &self,
        user_id: UserId,
        level_id: LevelId,
        options: &AssignOptions,
    ) -> Result<Membership, DomainError> {
        // The id is assigned by the sequence.
        let mut membership =
            Membership::assign(MembershipId::new(0), user_id, level_id, options.clone());

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO memberships (
                user_id, level_id, status, start_date, end_date, paused_at, pause_until,
                payment_method, customer_id, subscription_id, billing_amount, cycle_number,
                cycle_period, status_log, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(user_id.as_i64())
        .bind(level_id.as_i64())
        .bind(membership.status.as_str())
        .bind(membership.start_date.as_datetime())
        .bind(db_time(membership.end_date))
        .bind(db_time(membership.paused_at))
        .bind(db_time(membership.pause_until))
        .bind(&membership.billing.payment_method)
        .bind(&membership.billing.customer_id)
        .bind(&membership.billing.subscription_id)
        .bind(membership.billing.billing_amount.map(|m| m.amount()))
        .bind(membership.billing.cycle_number)
        .bind(membership.billing.cycle_period.map(|p| p.as_str()))
        .bind(Json(&membership.status_log))
        .bind(membership.version)
        .bind(membership.created_at.as_datetime())
        .bind(membership.updated_at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_live_pair_violation(&e) {
                return DomainError::new(
                    ErrorCode::ConcurrentModification,
                    "A live membership for this user and level already exists",
                );
            }
            DomainError::database("Failed to insert membership", e)
        })?;

        membership.id = MembershipId::new(id);
        tracing::debug!(membership_id = id, user_id = %user_id, level_id = %level_id, "Membership row inserted");
        Ok(membership)
    }

    async fn compare_and_swap(&self, membership: &Membership) -> Result<Membership, DomainError> {
        let sql = format!(
            r#"
            UPDATE memberships SET
                status = $3,
                start_date = $4,
                end_date = $5,
                paused_at = $6,
                pause_until = $7,
                payment_method = $8,
                customer_id = $9,
                subscription_id = $10,
                billing_amount = $11,
                cycle_number = $12,
                cycle_period = $13,
                status_log = $14,
                updated_at = $15,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        let row = sqlx::query_as::<_, MembershipRow>(&sql)
            .bind(membership.id.as_i64())
            .bind(membership.version)
            .bind(membership.status.as_str())
            .bind(membership.start_date.as_datetime())
            .bind(db_time(membership.end_date))
            .bind(db_time(membership.paused_at))
            .bind(db_time(membership.pause_until))
            .bind(&membership.billing.payment_method)
            .bind(&membership.billing.customer_id)
            .bind(&membership.billing.subscription_id)
            .bind(membership.billing.billing_amount.map(|m| m.amount()))
            .bind(membership.billing.cycle_number)
            .bind(membership.billing.cycle_period.map(|p| p.as_str()))
            .bind(Json(&membership.status_log))
            .bind(membership.updated_at.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_live_pair_violation(&e) {
                    return DomainError::new(
                        ErrorCode::ConcurrentModification,
                        "A live membership for this user and level already exists",
                    );
                }
                DomainError::database("Failed to update membership", e)
            })?;

        match row {
            Some(row) => Membership::try_from(row),
            None if self.exists(membership.id).await? => Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!("Membership {} was modified concurrently", membership.id),
            )),
            None => Err(DomainError::new(
                ErrorCode::MembershipNotFound,
                format!("Membership {} not found", membership.id),
            )),
        }
    }
}
