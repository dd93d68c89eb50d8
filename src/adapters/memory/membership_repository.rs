//! In-memory membership repository.
//!
//! Keeps every row, terminal ones included, so history behaves like the
//! SQL adapter. Suitable for tests and single-process demos.

use async_trait::async_trait;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{
    DomainError, ErrorCode, LevelId, MembershipId, Timestamp, UserId,
};
use crate::domain::membership::{AssignOptions, Membership, MembershipStatus};
use crate::ports::{MembershipPage, MembershipQuery, MembershipRepository, MembershipSort};

#[derive(Debug, Default)]
pub struct InMemoryMembershipRepository {
    rows: RwLock<Vec<Membership>>,
    next_id: AtomicI64,
    injected_conflicts: AtomicUsize,
}

impl InMemoryMembershipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` compare-and-swap calls lose their race.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Every stored row, oldest first.
    pub async fn all(&self) -> Vec<Membership> {
        self.rows.read().await.clone()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn latest<'a>(
    rows: &'a [Membership],
    user_id: UserId,
    level_id: LevelId,
) -> Option<&'a Membership> {
    rows.iter()
        .filter(|m| m.user_id == user_id && m.level_id == level_id)
        .max_by_key(|m| m.id)
}

#[async_trait]
impl MembershipRepository for InMemoryMembershipRepository {
    async fn find(
        &self,
        user_id: UserId,
        level_id: LevelId,
    ) -> Result<Option<Membership>, DomainError> {
        Ok(latest(&self.rows.read().await, user_id, level_id).cloned())
    }

    async fn find_by_id(&self, id: MembershipId) -> Result<Option<Membership>, DomainError> {
        Ok(self.rows.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn find_many(&self, ids: &[MembershipId]) -> Result<Vec<Membership>, DomainError> {
        let mut found: Vec<Membership> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| m.id.as_i64() > 0 && ids.contains(&m.id))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.id);
        Ok(found)
    }

    async fn paginate(&self, query: &MembershipQuery) -> Result<MembershipPage, DomainError> {
        let (page, per_page) = query.normalized();
        let mut matching: Vec<Membership> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            let ordering = match query.sort {
                MembershipSort::StartDate => a.start_date.cmp(&b.start_date),
                MembershipSort::EndDate => a.end_date.cmp(&b.end_date),
                MembershipSort::Status => a.status.as_str().cmp(b.status.as_str()),
                MembershipSort::Id => CmpOrdering::Equal,
            }
            .then(a.id.cmp(&b.id));
            if query.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let total = matching.len() as u64;
        let memberships = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(per_page as usize)
            .collect();

        Ok(MembershipPage {
            memberships,
            total,
            page,
            per_page,
        })
    }

    async fn delete_by_id(&self, id: MembershipId) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|m| m.id != id);
        Ok(rows.len() < before)
    }

    async fn find_active(&self, user_id: UserId) -> Result<Vec<Membership>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| m.user_id == user_id && m.status == MembershipStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_by_level(
        &self,
        level_id: LevelId,
        statuses: &[MembershipStatus],
    ) -> Result<Vec<Membership>, DomainError> {
        let rows = self.rows.read().await;
        let mut found: Vec<Membership> = rows
            .iter()
            .filter(|m| m.level_id == level_id)
            .filter(|m| latest(&rows, m.user_id, level_id).map(|l| l.id) == Some(m.id))
            .filter(|m| statuses.is_empty() || statuses.contains(&m.status))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.id);
        Ok(found)
    }

    async fn find_expiring(&self, days: i64) -> Result<Vec<Membership>, DomainError> {
        let now = Timestamp::now();
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| m.is_expiring_within(&now, days))
            .cloned()
            .collect())
    }

    async fn find_lapsed(&self, as_of: Timestamp) -> Result<Vec<Membership>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|m| m.is_lapsed(&as_of))
            .cloned()
            .collect())
    }

    async fn insert(
        &self,
        user_id: UserId,
        level_id: LevelId,
        options: &AssignOptions,
    ) -> Result<Membership, DomainError> {
        let mut rows = self.rows.write().await;
        if latest(&rows, user_id, level_id).map_or(false, |m| !m.is_terminal()) {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                "A live membership for this user and level already exists",
            ));
        }
        let id = MembershipId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let membership = Membership::assign(id, user_id, level_id, options.clone());
        rows.push(membership.clone());
        Ok(membership)
    }

    async fn compare_and_swap(&self, membership: &Membership) -> Result<Membership, DomainError> {
        if self.take_injected_conflict() {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                "Injected conflict",
            ));
        }
        let mut rows = self.rows.write().await;
        if !membership.is_terminal()
            && rows.iter().any(|m| {
                m.id != membership.id
                    && m.user_id == membership.user_id
                    && m.level_id == membership.level_id
                    && !m.is_terminal()
            })
        {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                "A live membership for this user and level already exists",
            ));
        }
        let stored = rows
            .iter_mut()
            .find(|m| m.id == membership.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::MembershipNotFound, "Membership not found")
            })?;
        if stored.version != membership.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!(
                    "Membership {} is at version {}, expected {}",
                    membership.id, stored.version, membership.version
                ),
            ));
        }
        let mut next = membership.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }
}
