//! Membership repository port.
//!
//! Owns membership lifecycle state per `(user, level)` pair. Storage
//! adapters implement the required methods; every lifecycle transition is
//! a provided method built on them, so all backends share one set of
//! transition rules.
//!
//! # Concurrency
//!
//! Writes are compare-and-swap on `(id, version)`. A transition that loses
//! a race re-reads the row and re-applies itself, up to
//! [`MAX_CAS_RETRIES`] attempts, before failing with
//! `ConcurrentModification`.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, LevelId, MembershipId, Timestamp, UserId};
use crate::domain::membership::{
    AssignOptions, BillingProfile, Membership, MembershipStatus, TransitionOutcome,
};

use super::order_repository::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

/// Attempts for a transition that keeps losing optimistic-concurrency races.
pub const MAX_CAS_RETRIES: usize = 3;

/// Reason logged by [`MembershipRepository::reactivate_by_id`].
pub const REACTIVATED_REASON: &str = "Membership reactivated by admin";

/// A change applied to a freshly read membership.
pub type MembershipChange<'a> =
    dyn Fn(&mut Membership) -> Result<TransitionOutcome, DomainError> + Send + Sync + 'a;

/// Sort column for [`MembershipQuery`]. Ties break on id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MembershipSort {
    #[default]
    StartDate,
    EndDate,
    Status,
    Id,
}

impl MembershipSort {
    pub fn column(&self) -> &'static str {
        match self {
            MembershipSort::StartDate => "start_date",
            MembershipSort::EndDate => "end_date",
            MembershipSort::Status => "status",
            MembershipSort::Id => "id",
        }
    }
}

/// Page request over every membership row, history included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipQuery {
    pub user_id: Option<UserId>,
    pub level_id: Option<LevelId>,
    pub status: Option<MembershipStatus>,
    pub sort: MembershipSort,
    pub descending: bool,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl Default for MembershipQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            level_id: None,
            status: None,
            sort: MembershipSort::default(),
            descending: true,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl MembershipQuery {
    /// Page and page size clamped to valid values.
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PER_PAGE))
    }

    pub fn offset(&self) -> u64 {
        let (page, per_page) = self.normalized();
        u64::from(page - 1) * u64::from(per_page)
    }

    pub fn matches(&self, membership: &Membership) -> bool {
        self.user_id.map_or(true, |u| u == membership.user_id)
            && self.level_id.map_or(true, |l| l == membership.level_id)
            && self.status.map_or(true, |s| s == membership.status)
    }
}

/// One page of memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipPage {
    pub memberships: Vec<Membership>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl MembershipPage {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}

/// Repository port for memberships.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Latest row for the pair, terminal or not.
    async fn find(
        &self,
        user_id: UserId,
        level_id: LevelId,
    ) -> Result<Option<Membership>, DomainError>;

    async fn find_by_id(&self, id: MembershipId) -> Result<Option<Membership>, DomainError>;

    /// Rows with the given ids, ordered by id. Unknown and non-positive
    /// ids are skipped.
    async fn find_many(&self, ids: &[MembershipId]) -> Result<Vec<Membership>, DomainError>;

    async fn paginate(&self, query: &MembershipQuery) -> Result<MembershipPage, DomainError>;

    /// Physically removes one row. Returns false if it did not exist.
    async fn delete_by_id(&self, id: MembershipId) -> Result<bool, DomainError>;

    /// Active memberships of a user, across levels.
    async fn find_active(&self, user_id: UserId) -> Result<Vec<Membership>, DomainError>;

    /// Latest rows of a level, limited to `statuses` when non-empty.
    async fn find_by_level(
        &self,
        level_id: LevelId,
        statuses: &[MembershipStatus],
    ) -> Result<Vec<Membership>, DomainError>;

    /// Active memberships whose end date falls within the next `days` days.
    async fn find_expiring(&self, days: i64) -> Result<Vec<Membership>, DomainError>;

    /// Active memberships whose end date is at or before `as_of`.
    async fn find_lapsed(&self, as_of: Timestamp) -> Result<Vec<Membership>, DomainError>;

    /// Inserts a fresh row, leaving any older terminal rows in place.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if a non-terminal row for the pair
    ///   appeared concurrently
    async fn insert(
        &self,
        user_id: UserId,
        level_id: LevelId,
        options: &AssignOptions,
    ) -> Result<Membership, DomainError>;

    /// Persists `membership` if the stored version still equals its version.
    ///
    /// Returns the stored membership with the bumped version.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the version moved
    /// - `MembershipNotFound` if the row is gone
    async fn compare_and_swap(&self, membership: &Membership) -> Result<Membership, DomainError>;

    /// Re-reads the pair and applies `change`, retrying lost races.
    ///
    /// `Unchanged` outcomes are not written.
    async fn modify(
        &self,
        user_id: UserId,
        level_id: LevelId,
        change: &MembershipChange<'_>,
    ) -> Result<Membership, DomainError> {
        let mut attempt = 1;
        loop {
            let mut membership = self
                .find(user_id, level_id)
                .await?
                .ok_or_else(|| not_found(user_id, level_id))?;

            if !change(&mut membership)?.is_applied() {
                return Ok(membership);
            }

            match self.compare_and_swap(&membership).await {
                Err(err)
                    if err.code == ErrorCode::ConcurrentModification
                        && attempt < MAX_CAS_RETRIES =>
                {
                    tracing::debug!(
                        user_id = %user_id,
                        level_id = %level_id,
                        attempt,
                        "Membership write lost a race, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Like [`modify`](Self::modify), but for one specific row.
    async fn modify_by_id(
        &self,
        id: MembershipId,
        change: &MembershipChange<'_>,
    ) -> Result<Membership, DomainError> {
        let mut attempt = 1;
        loop {
            let mut membership = self
                .find_by_id(id)
                .await?
                .ok_or_else(|| not_found_by_id(id))?;

            if !change(&mut membership)?.is_applied() {
                return Ok(membership);
            }

            match self.compare_and_swap(&membership).await {
                Err(err)
                    if err.code == ErrorCode::ConcurrentModification
                        && attempt < MAX_CAS_RETRIES =>
                {
                    tracing::debug!(membership_id = %id, attempt, "Membership write lost a race, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Gives a user a level.
    ///
    /// Inserts a new row when none exists or the latest is terminal;
    /// otherwise resets the existing row to a fresh lifecycle.
    async fn assign(
        &self,
        user_id: UserId,
        level_id: LevelId,
        options: AssignOptions,
    ) -> Result<Membership, DomainError> {
        let mut attempt = 1;
        loop {
            let result = match self.find(user_id, level_id).await? {
                Some(mut existing) if !existing.is_terminal() => {
                    existing.reassign(options.clone());
                    self.compare_and_swap(&existing).await
                }
                _ => self.insert(user_id, level_id, &options).await,
            };

            match result {
                Err(err)
                    if err.code == ErrorCode::ConcurrentModification
                        && attempt < MAX_CAS_RETRIES =>
                {
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn cancel(
        &self,
        user_id: UserId,
        level_id: LevelId,
        at_period_end: bool,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| m.cancel(at_period_end, reason))
            .await
    }

    async fn expire(
        &self,
        user_id: UserId,
        level_id: LevelId,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| m.expire(reason)).await
    }

    async fn pause(
        &self,
        user_id: UserId,
        level_id: LevelId,
        until: Option<Timestamp>,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| m.pause(until, reason))
            .await
    }

    async fn resume(
        &self,
        user_id: UserId,
        level_id: LevelId,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| m.resume(reason)).await
    }

    async fn mark_past_due(
        &self,
        user_id: UserId,
        level_id: LevelId,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| m.mark_past_due(reason))
            .await
    }

    async fn set_status(
        &self,
        user_id: UserId,
        level_id: LevelId,
        status: MembershipStatus,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| m.set_status(status, reason))
            .await
    }

    async fn cancel_by_id(
        &self,
        id: MembershipId,
        at_period_end: bool,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify_by_id(id, &|m| m.cancel(at_period_end, reason))
            .await
    }

    async fn pause_by_id(
        &self,
        id: MembershipId,
        until: Option<Timestamp>,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify_by_id(id, &|m| m.pause(until, reason)).await
    }

    async fn resume_by_id(&self, id: MembershipId, reason: &str) -> Result<Membership, DomainError> {
        self.modify_by_id(id, &|m| m.resume(reason)).await
    }

    async fn expire_by_id(&self, id: MembershipId, reason: &str) -> Result<Membership, DomainError> {
        self.modify_by_id(id, &|m| m.expire(reason)).await
    }

    async fn set_status_by_id(
        &self,
        id: MembershipId,
        status: MembershipStatus,
        reason: &str,
    ) -> Result<Membership, DomainError> {
        self.modify_by_id(id, &|m| m.set_status(status, reason))
            .await
    }

    /// Returns a row to `Active` with no end date, whatever its status.
    ///
    /// # Errors
    ///
    /// - `MembershipNotFound` if the row does not exist
    /// - `InvalidStateTransition` if a newer row exists for the same user
    ///   and level; only the latest row can be live
    async fn reactivate_by_id(&self, id: MembershipId) -> Result<Membership, DomainError> {
        let membership = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found_by_id(id))?;
        let latest = self.find(membership.user_id, membership.level_id).await?;
        if latest.map_or(false, |l| l.id != id) {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Membership {} has been superseded by a newer membership",
                    id
                ),
            )
            .with_detail("membership_id", id.to_string()));
        }
        self.modify_by_id(id, &|m| m.reactivate(REACTIVATED_REASON))
            .await
    }

    /// True iff the latest row for the pair is active.
    async fn has_access(&self, user_id: UserId, level_id: LevelId) -> Result<bool, DomainError> {
        Ok(self
            .find(user_id, level_id)
            .await?
            .map_or(false, |m| m.has_access()))
    }

    async fn update_end_date(
        &self,
        user_id: UserId,
        level_id: LevelId,
        end_date: Option<Timestamp>,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| {
            if m.end_date == end_date {
                return Ok(TransitionOutcome::Unchanged);
            }
            m.update_end_date(end_date);
            Ok(TransitionOutcome::Applied)
        })
        .await
    }

    /// Merges the present fields of `profile` into the stored profile.
    async fn update_billing_profile(
        &self,
        user_id: UserId,
        level_id: LevelId,
        profile: BillingProfile,
    ) -> Result<Membership, DomainError> {
        self.modify(user_id, level_id, &|m| {
            let mut merged = m.billing.clone();
            merged.merge(profile.clone());
            if merged == m.billing {
                return Ok(TransitionOutcome::Unchanged);
            }
            m.update_billing(profile.clone());
            Ok(TransitionOutcome::Applied)
        })
        .await
    }
}

fn not_found(user_id: UserId, level_id: LevelId) -> DomainError {
    DomainError::new(
        ErrorCode::MembershipNotFound,
        format!("No membership for user {} on level {}", user_id, level_id),
    )
    .with_detail("user_id", user_id.to_string())
    .with_detail("level_id", level_id.to_string())
}

fn not_found_by_id(id: MembershipId) -> DomainError {
    DomainError::new(
        ErrorCode::MembershipNotFound,
        format!("Membership {} not found", id),
    )
    .with_detail("membership_id", id.to_string())
}
