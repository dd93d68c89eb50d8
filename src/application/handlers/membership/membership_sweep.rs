//! MembershipSweepHandler - Periodic expiry, warnings and event purging.
//!
//! Driven by an external scheduler. Each step is independent: a failure on
//! one membership is logged, counted and the sweep moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::membership::{Membership, MembershipStatus, TransitionOutcome};
use crate::ports::{
    IdempotencyStore, MembershipRepository, SaveResult, TEMPLATE_MEMBERSHIP_EXPIRED,
    TEMPLATE_MEMBERSHIP_EXPIRING,
};

use super::super::notifier::{membership_message, MemberNotifier};

/// Gateway name under which sweep notifications are deduplicated.
pub const INTERNAL_GATEWAY: &str = "internal";

/// Sweep tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// Warn members whose end date falls within this many days.
    pub expiry_warning_days: i64,
    /// Processed events older than this are purged.
    pub retention_days: u32,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            expiry_warning_days: 7,
            retention_days: 90,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub warned: usize,
    pub purged: u64,
    pub failures: usize,
}

pub struct MembershipSweepHandler {
    memberships: Arc<dyn MembershipRepository>,
    store: Arc<dyn IdempotencyStore>,
    notifier: MemberNotifier,
    settings: SweepSettings,
}

impl MembershipSweepHandler {
    pub fn new(
        memberships: Arc<dyn MembershipRepository>,
        store: Arc<dyn IdempotencyStore>,
        notifier: MemberNotifier,
        settings: SweepSettings,
    ) -> Self {
        Self {
            memberships,
            store,
            notifier,
            settings,
        }
    }

    /// Runs one sweep as of `now`.
    ///
    /// # Errors
    ///
    /// Only when a membership listing fails; per-membership problems are
    /// counted in `failures`.
    pub async fn handle(&self, now: Timestamp) -> Result<SweepReport, DomainError> {
        let mut report = SweepReport::default();

        for membership in self.memberships.find_lapsed(now).await? {
            match self.expire(&membership, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        membership_id = %membership.id,
                        error = %e,
                        "Failed to expire membership"
                    );
                    report.failures += 1;
                }
            }
        }

        for membership in self
            .memberships
            .find_expiring(self.settings.expiry_warning_days)
            .await?
        {
            match self.warn_expiring(&membership).await {
                Ok(true) => report.warned += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        membership_id = %membership.id,
                        error = %e,
                        "Failed to send expiry warning"
                    );
                    report.failures += 1;
                }
            }
        }

        match self.store.cleanup(self.settings.retention_days).await {
            Ok(purged) => report.purged = purged,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to purge processed events");
                report.failures += 1;
            }
        }

        tracing::info!(
            expired = report.expired,
            warned = report.warned,
            purged = report.purged,
            failures = report.failures,
            "Membership sweep finished"
        );
        Ok(report)
    }

    /// Expires the row only if it is still lapsed when re-read, so a
    /// renewal landing after the listing is kept.
    async fn expire(&self, membership: &Membership, now: Timestamp) -> Result<bool, DomainError> {
        let applied = AtomicBool::new(false);
        let expired = self
            .memberships
            .modify_by_id(membership.id, &|m| {
                let outcome = if m.is_lapsed(&now) {
                    m.expire("Membership period ended")?
                } else {
                    TransitionOutcome::Unchanged
                };
                applied.store(outcome.is_applied(), Ordering::SeqCst);
                Ok(outcome)
            })
            .await?;
        if !applied.load(Ordering::SeqCst) || expired.status != MembershipStatus::Expired {
            tracing::debug!(
                membership_id = %membership.id,
                status = %expired.status,
                "Membership no longer lapsed, not expired"
            );
            return Ok(false);
        }

        self.notifier
            .notify(
                TEMPLATE_MEMBERSHIP_EXPIRED,
                expired.user_id,
                membership_message("Membership expired", expired.level_id, expired.end_date),
            )
            .await;
        Ok(true)
    }

    /// Sends at most one warning per membership and end date.
    async fn warn_expiring(&self, membership: &Membership) -> Result<bool, DomainError> {
        let Some(end_date) = membership.end_date else {
            return Ok(false);
        };
        let key = warning_key(membership, end_date);
        let claim = self
            .store
            .mark_processed(INTERNAL_GATEWAY, &key, &json!({ "kind": "expiry_warning" }))
            .await?;
        if claim == SaveResult::AlreadyExists {
            return Ok(false);
        }

        let sent = self
            .notifier
            .notify(
                TEMPLATE_MEMBERSHIP_EXPIRING,
                membership.user_id,
                membership_message(
                    "Membership expiring soon",
                    membership.level_id,
                    Some(end_date),
                ),
            )
            .await;
        if !sent {
            // Let the next sweep try again.
            self.store.release(INTERNAL_GATEWAY, &key).await?;
        }
        Ok(sent)
    }
}

fn warning_key(membership: &Membership, end_date: Timestamp) -> String {
    format!("expiring:{}:{}", membership.id, end_date.as_unix_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryIdempotencyStore, InMemoryMembershipRepository, InMemoryUserDirectory,
        RecordingEmailService,
    };
    use crate::domain::billing::BillingUser;
    use crate::domain::foundation::{LevelId, MembershipId, UserId};
    use crate::domain::membership::AssignOptions;
    use crate::ports::{MembershipPage, MembershipQuery};

    const LEVEL: LevelId = LevelId::new(7);

    struct Fixture {
        memberships: Arc<InMemoryMembershipRepository>,
        store: Arc<InMemoryIdempotencyStore>,
        email: Arc<RecordingEmailService>,
        handler: MembershipSweepHandler,
    }

    fn fixture() -> Fixture {
        let memberships = Arc::new(InMemoryMembershipRepository::new());
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let email = Arc::new(RecordingEmailService::new());
        let users = InMemoryUserDirectory::new();
        for id in 1..=3 {
            users.add_user(BillingUser {
                id: UserId::new(id),
                email: format!("user{}@example.com", id),
                display_name: None,
                login: format!("user{}", id),
            });
        }
        let handler = MembershipSweepHandler::new(
            memberships.clone(),
            store.clone(),
            MemberNotifier::new(email.clone(), Arc::new(users)),
            SweepSettings::default(),
        );
        Fixture {
            memberships,
            store,
            email,
            handler,
        }
    }

    async fn member(f: &Fixture, user: i64, end_date: Timestamp) {
        f.memberships
            .assign(
                UserId::new(user),
                LEVEL,
                AssignOptions::default().with_end_date(Some(end_date)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expires_lapsed_and_warns_expiring() {
        let f = fixture();
        let now = Timestamp::now();
        member(&f, 1, now.minus_days(1)).await;
        member(&f, 2, now.add_days(3)).await;
        member(&f, 3, now.add_days(30)).await;

        let report = f.handler.handle(now).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.warned, 1);
        assert_eq!(report.failures, 0);
        let lapsed = f.memberships.find(UserId::new(1), LEVEL).await.unwrap().unwrap();
        assert_eq!(lapsed.status, MembershipStatus::Expired);
        assert_eq!(f.email.sent_with_template(TEMPLATE_MEMBERSHIP_EXPIRED).len(), 1);
        let warnings = f.email.sent_with_template(TEMPLATE_MEMBERSHIP_EXPIRING);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].recipient, "user2@example.com");
    }

    #[tokio::test]
    async fn warning_is_sent_once_per_end_date() {
        let f = fixture();
        let now = Timestamp::now();
        member(&f, 2, now.add_days(3)).await;

        f.handler.handle(now).await.unwrap();
        let second = f.handler.handle(now).await.unwrap();

        assert_eq!(second.warned, 0);
        assert_eq!(f.email.sent_with_template(TEMPLATE_MEMBERSHIP_EXPIRING).len(), 1);

        // A renewed period gets its own warning.
        f.memberships
            .update_end_date(UserId::new(2), LEVEL, Some(now.add_days(5)))
            .await
            .unwrap();
        let renewed = f.handler.handle(now).await.unwrap();
        assert_eq!(renewed.warned, 1);
    }

    #[tokio::test]
    async fn failed_warning_is_retried_next_sweep() {
        let f = fixture();
        let now = Timestamp::now();
        member(&f, 2, now.add_days(3)).await;
        f.email.fail_next(1);

        let first = f.handler.handle(now).await.unwrap();
        assert_eq!(first.warned, 0);

        let second = f.handler.handle(now).await.unwrap();
        assert_eq!(second.warned, 1);
    }

    /// Renews every lapsed row right after listing it, like a paid invoice
    /// landing between the sweep's listing and its write.
    struct RenewedAfterListing {
        inner: InMemoryMembershipRepository,
        renewed_until: Timestamp,
    }

    #[async_trait::async_trait]
    impl MembershipRepository for RenewedAfterListing {
        async fn find(
            &self,
            user_id: UserId,
            level_id: LevelId,
        ) -> Result<Option<Membership>, DomainError> {
            self.inner.find(user_id, level_id).await
        }

        async fn find_by_id(&self, id: MembershipId) -> Result<Option<Membership>, DomainError> {
            self.inner.find_by_id(id).await
        }

        async fn find_many(&self, ids: &[MembershipId]) -> Result<Vec<Membership>, DomainError> {
            self.inner.find_many(ids).await
        }

        async fn paginate(&self, query: &MembershipQuery) -> Result<MembershipPage, DomainError> {
            self.inner.paginate(query).await
        }

        async fn delete_by_id(&self, id: MembershipId) -> Result<bool, DomainError> {
            self.inner.delete_by_id(id).await
        }

        async fn find_active(&self, user_id: UserId) -> Result<Vec<Membership>, DomainError> {
            self.inner.find_active(user_id).await
        }

        async fn find_by_level(
            &self,
            level_id: LevelId,
            statuses: &[MembershipStatus],
        ) -> Result<Vec<Membership>, DomainError> {
            self.inner.find_by_level(level_id, statuses).await
        }

        async fn find_expiring(&self, days: i64) -> Result<Vec<Membership>, DomainError> {
            self.inner.find_expiring(days).await
        }

        async fn find_lapsed(&self, as_of: Timestamp) -> Result<Vec<Membership>, DomainError> {
            let lapsed = self.inner.find_lapsed(as_of).await?;
            for m in &lapsed {
                self.inner
                    .update_end_date(m.user_id, m.level_id, Some(self.renewed_until))
                    .await?;
            }
            Ok(lapsed)
        }

        async fn insert(
            &self,
            user_id: UserId,
            level_id: LevelId,
            options: &AssignOptions,
        ) -> Result<Membership, DomainError> {
            self.inner.insert(user_id, level_id, options).await
        }

        async fn compare_and_swap(&self, membership: &Membership) -> Result<Membership, DomainError> {
            self.inner.compare_and_swap(membership).await
        }
    }

    #[tokio::test]
    async fn renewal_after_listing_is_not_expired() {
        let now = Timestamp::now();
        let renewed_until = now.add_days(30);
        let memberships = Arc::new(RenewedAfterListing {
            inner: InMemoryMembershipRepository::new(),
            renewed_until,
        });
        memberships
            .assign(
                UserId::new(1),
                LEVEL,
                AssignOptions::default().with_end_date(Some(now.minus_days(1))),
            )
            .await
            .unwrap();
        let email = Arc::new(RecordingEmailService::new());
        let handler = MembershipSweepHandler::new(
            memberships.clone(),
            Arc::new(InMemoryIdempotencyStore::new()),
            MemberNotifier::new(email.clone(), Arc::new(InMemoryUserDirectory::new())),
            SweepSettings::default(),
        );

        let report = handler.handle(now).await.unwrap();

        assert_eq!(report.expired, 0);
        assert_eq!(report.failures, 0);
        let m = memberships.find(UserId::new(1), LEVEL).await.unwrap().unwrap();
        assert_eq!(m.status, MembershipStatus::Active);
        assert_eq!(m.end_date, Some(renewed_until));
        assert!(email.sent_with_template(TEMPLATE_MEMBERSHIP_EXPIRED).is_empty());
    }

    #[tokio::test]
    async fn purges_old_processed_events() {
        let f = fixture();
        f.store
            .backdate("stripe", "evt_old", Timestamp::now().minus_days(120))
            .await;
        f.store
            .mark_processed("stripe", "evt_new", &json!({}))
            .await
            .unwrap();

        let report = f.handler.handle(Timestamp::now()).await.unwrap();

        assert_eq!(report.purged, 1);
        assert!(f.store.has_processed("stripe", "evt_new").await.unwrap());
        assert!(!f.store.has_processed("stripe", "evt_old").await.unwrap());
    }
}
