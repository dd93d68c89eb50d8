//! Membership aggregate entity.
//!
//! A membership ties a user to a level. Rows are keyed by
//! `(user_id, level_id)`; history is retained, so a user who cancels and
//! later re-subscribes gets a fresh row while the old terminal row stays.
//!
//! # Design Decisions
//!
//! - **Re-applying is a no-op**: a transition to the current status
//!   succeeds with [`TransitionOutcome::Unchanged`] and logs nothing
//! - **Invalid transitions don't mutate**: the status table is checked
//!   before any field changes
//! - **Optimistic concurrency**: `version` is bumped by the repository on
//!   every successful write

use crate::domain::foundation::{
    DomainError, ErrorCode, LevelId, MembershipId, StateMachine, StatusLog, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{BillingProfile, MembershipStatus};

/// Reason logged when a level is assigned without an explicit reason.
pub const ASSIGNED_REASON: &str = "Membership assigned";

/// Whether a transition changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Unchanged,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied)
    }
}

/// Options for assigning a level to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignOptions {
    pub status: MembershipStatus,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub billing: BillingProfile,
    pub reason: Option<String>,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            status: MembershipStatus::Active,
            start_date: None,
            end_date: None,
            billing: BillingProfile::default(),
            reason: None,
        }
    }
}

impl AssignOptions {
    pub fn with_status(mut self, status: MembershipStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_start_date(mut self, start_date: Timestamp) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn with_end_date(mut self, end_date: Option<Timestamp>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn with_billing(mut self, billing: BillingProfile) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn reason_or_default(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| ASSIGNED_REASON.to_string())
    }
}

/// Membership aggregate - a user's access to one level.
///
/// # Invariants
///
/// - At most one non-terminal row per `(user_id, level_id)`
/// - Status transitions follow [`MembershipStatus`] rules
/// - `paused_at` is set iff status is `Paused`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub user_id: UserId,
    pub level_id: LevelId,
    pub status: MembershipStatus,
    pub start_date: Timestamp,

    /// `None` means the membership never expires on its own.
    pub end_date: Option<Timestamp>,

    pub paused_at: Option<Timestamp>,
    pub pause_until: Option<Timestamp>,
    pub billing: BillingProfile,
    pub status_log: StatusLog<MembershipStatus>,

    /// Optimistic concurrency token.
    pub version: i64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Membership {
    /// Starts a fresh lifecycle for a new row.
    pub fn assign(
        id: MembershipId,
        user_id: UserId,
        level_id: LevelId,
        options: AssignOptions,
    ) -> Self {
        let now = Timestamp::now();
        let mut status_log = StatusLog::new();
        status_log.record(None, options.status, Some(options.reason_or_default()));

        Self {
            id,
            user_id,
            level_id,
            status: options.status,
            start_date: options.start_date.unwrap_or(now),
            end_date: options.end_date,
            paused_at: (options.status == MembershipStatus::Paused).then_some(now),
            pause_until: None,
            billing: options.billing,
            status_log,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resets an existing non-terminal row to a fresh lifecycle.
    ///
    /// The start date is renewed, pause fields are cleared and the status
    /// log is replaced by the single assignment entry.
    pub fn reassign(&mut self, options: AssignOptions) {
        let now = Timestamp::now();
        let previous = self.status;
        let reason = options.reason_or_default();

        self.status = options.status;
        self.start_date = options.start_date.unwrap_or(now);
        self.end_date = options.end_date;
        self.paused_at = (options.status == MembershipStatus::Paused).then_some(now);
        self.pause_until = None;
        self.billing.merge(options.billing);
        self.status_log = StatusLog::new();
        self.status_log
            .record(Some(previous), options.status, Some(reason));
        self.updated_at = now;
    }

    /// Returns true if this membership currently grants access.
    pub fn has_access(&self) -> bool {
        self.status.has_access()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Cancels the membership.
    ///
    /// With `at_period_end` the end date is kept so the period runs out
    /// naturally; otherwise it is set to now.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` from `Paused` or `Expired`.
    pub fn cancel(
        &mut self,
        at_period_end: bool,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        let outcome = self.apply(MembershipStatus::Cancelled, reason)?;
        if outcome.is_applied() && !at_period_end {
            self.end_date = Some(self.updated_at);
        }
        Ok(outcome)
    }

    /// Expires the membership, pulling a future or missing end date to now.
    pub fn expire(&mut self, reason: &str) -> Result<TransitionOutcome, DomainError> {
        let outcome = self.apply(MembershipStatus::Expired, reason)?;
        if outcome.is_applied() {
            let now = self.updated_at;
            match self.end_date {
                Some(end) if !end.is_after(&now) => {}
                _ => self.end_date = Some(now),
            }
        }
        Ok(outcome)
    }

    /// Suspends access, optionally until a given date.
    pub fn pause(
        &mut self,
        until: Option<Timestamp>,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        let outcome = self.apply(MembershipStatus::Paused, reason)?;
        if outcome.is_applied() {
            self.paused_at = Some(self.updated_at);
            self.pause_until = until;
        }
        Ok(outcome)
    }

    /// Lifts a pause.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the membership is paused
    /// (or already active).
    pub fn resume(&mut self, reason: &str) -> Result<TransitionOutcome, DomainError> {
        if !matches!(
            self.status,
            MembershipStatus::Paused | MembershipStatus::Active
        ) {
            return Err(self.rejected(MembershipStatus::Active, "only paused memberships resume"));
        }
        self.apply(MembershipStatus::Active, reason)
    }

    /// Records a failed payment.
    pub fn mark_past_due(&mut self, reason: &str) -> Result<TransitionOutcome, DomainError> {
        self.apply(MembershipStatus::PastDue, reason)
    }

    /// Restores access after a past-due payment succeeds.
    pub fn recover_payment(&mut self, reason: &str) -> Result<TransitionOutcome, DomainError> {
        if !matches!(
            self.status,
            MembershipStatus::PastDue | MembershipStatus::Active
        ) {
            return Err(self.rejected(
                MembershipStatus::Active,
                "only past due memberships recover",
            ));
        }
        self.apply(MembershipStatus::Active, reason)
    }

    /// Moves to `target` using the dedicated transition for that status.
    ///
    /// `Cancelled` keeps the end date; `Active` resumes a paused
    /// membership or recovers a past-due one.
    pub fn set_status(
        &mut self,
        target: MembershipStatus,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        match target {
            MembershipStatus::Active if self.status == MembershipStatus::Paused => {
                self.resume(reason)
            }
            MembershipStatus::Active => self.recover_payment(reason),
            MembershipStatus::PastDue => self.mark_past_due(reason),
            MembershipStatus::Paused => self.pause(None, reason),
            MembershipStatus::Cancelled => self.cancel(true, reason),
            MembershipStatus::Expired => self.expire(reason),
        }
    }

    /// Admin override that returns any membership to `Active`.
    ///
    /// Bypasses the status table, which keeps `Cancelled` and `Expired`
    /// terminal for every other path. The end date and pause fields are
    /// cleared, so the reactivated membership does not lapse on its own.
    pub fn reactivate(&mut self, reason: &str) -> Result<TransitionOutcome, DomainError> {
        if self.status == MembershipStatus::Active {
            return Ok(TransitionOutcome::Unchanged);
        }
        let from = self.status;
        self.status = MembershipStatus::Active;
        self.end_date = None;
        self.paused_at = None;
        self.pause_until = None;
        self.status_log
            .record(Some(from), MembershipStatus::Active, Some(reason.to_string()));
        self.updated_at = Timestamp::now();
        Ok(TransitionOutcome::Applied)
    }

    pub fn update_end_date(&mut self, end_date: Option<Timestamp>) {
        self.end_date = end_date;
        self.updated_at = Timestamp::now();
    }

    pub fn update_billing(&mut self, update: BillingProfile) {
        self.billing.merge(update);
        self.updated_at = Timestamp::now();
    }

    /// Active with an end date at or before `as_of`.
    pub fn is_lapsed(&self, as_of: &Timestamp) -> bool {
        self.status == MembershipStatus::Active
            && self.end_date.map_or(false, |end| !end.is_after(as_of))
    }

    /// Active with an end date after `now` and within `days` of it.
    pub fn is_expiring_within(&self, now: &Timestamp, days: i64) -> bool {
        let horizon = now.add_days(days);
        self.status == MembershipStatus::Active
            && self
                .end_date
                .map_or(false, |end| end.is_after(now) && !end.is_after(&horizon))
    }

    fn apply(
        &mut self,
        target: MembershipStatus,
        reason: &str,
    ) -> Result<TransitionOutcome, DomainError> {
        if self.status == target {
            return Ok(TransitionOutcome::Unchanged);
        }
        let from = self.status;
        let next = from.transition_to(target)?;

        self.status = next;
        if from == MembershipStatus::Paused {
            self.paused_at = None;
            self.pause_until = None;
        }
        self.status_log
            .record(Some(from), next, Some(reason.to_string()));
        self.updated_at = Timestamp::now();
        Ok(TransitionOutcome::Applied)
    }

    fn rejected(&self, target: MembershipStatus, message: &str) -> DomainError {
        DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot transition from {} to {}: {}", self.status, target, message),
        )
        .with_detail("from", self.status.as_str())
        .with_detail("to", target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_membership() -> Membership {
        Membership::assign(
            MembershipId::new(1),
            UserId::new(42),
            LevelId::new(7),
            AssignOptions::default(),
        )
    }

    fn june_first() -> Timestamp {
        Timestamp::from_ymd(2025, 6, 1).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Assignment
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn assign_starts_active_with_single_log_entry() {
        let m = active_membership();
        assert_eq!(m.status, MembershipStatus::Active);
        assert_eq!(m.status_log.len(), 1);
        assert_eq!(
            m.status_log.latest().unwrap().reason.as_deref(),
            Some(ASSIGNED_REASON)
        );
        assert!(m.has_access());
    }

    #[test]
    fn assign_honours_requested_status() {
        let m = Membership::assign(
            MembershipId::new(1),
            UserId::new(1),
            LevelId::new(1),
            AssignOptions::default().with_status(MembershipStatus::Paused),
        );
        assert_eq!(m.status, MembershipStatus::Paused);
        assert!(m.paused_at.is_some());
    }

    #[test]
    fn reassign_resets_lifecycle_and_log() {
        let mut m = active_membership();
        m.start_date = june_first().minus_days(30);
        m.mark_past_due("card declined").unwrap();
        assert_eq!(m.status_log.len(), 2);

        m.reassign(AssignOptions::default());

        assert_eq!(m.status, MembershipStatus::Active);
        assert!(m.start_date.is_after(&june_first().minus_days(30)));
        assert_eq!(m.status_log.len(), 1);
        assert_eq!(
            m.status_log.latest().unwrap().from,
            Some(MembershipStatus::PastDue)
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Cancellation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn cancel_at_period_end_keeps_end_date() {
        let mut m = active_membership();
        m.end_date = Some(june_first());

        let outcome = m.cancel(true, "user request").unwrap();

        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(m.status, MembershipStatus::Cancelled);
        assert_eq!(m.end_date, Some(june_first()));
        assert!(!m.has_access());
    }

    #[test]
    fn cancel_immediately_sets_end_date_to_now() {
        let mut m = active_membership();
        m.end_date = Some(Timestamp::now().add_days(30));

        m.cancel(false, "refund").unwrap();

        assert!(m.end_date.unwrap().is_before(&Timestamp::now().add_days(1)));
    }

    #[test]
    fn cancel_twice_is_unchanged_and_logs_once() {
        let mut m = active_membership();
        m.cancel(true, "first").unwrap();
        let outcome = m.cancel(true, "second").unwrap();

        assert_eq!(outcome, TransitionOutcome::Unchanged);
        assert_eq!(m.status_log.len(), 2);
    }

    #[test]
    fn cancel_from_expired_fails_without_mutation() {
        let mut m = active_membership();
        m.expire("lapsed").unwrap();
        let before = m.clone();

        let err = m.cancel(false, "late").unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(m, before);
    }

    // ══════════════════════════════════════════════════════════════
    // Expiry, pause, past due
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn expire_pulls_future_end_date_to_now() {
        let mut m = active_membership();
        m.end_date = Some(Timestamp::now().add_days(10));
        m.expire("admin").unwrap();
        assert!(!m.end_date.unwrap().is_after(&Timestamp::now()));
    }

    #[test]
    fn expire_keeps_past_end_date() {
        let mut m = active_membership();
        m.end_date = Some(june_first());
        m.expire("lapsed").unwrap();
        assert_eq!(m.end_date, Some(june_first()));
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let mut m = active_membership();
        let until = Timestamp::now().add_days(14);

        m.pause(Some(until), "vacation").unwrap();
        assert_eq!(m.status, MembershipStatus::Paused);
        assert_eq!(m.pause_until, Some(until));
        assert!(!m.has_access());

        m.resume("back").unwrap();
        assert_eq!(m.status, MembershipStatus::Active);
        assert!(m.paused_at.is_none());
        assert!(m.pause_until.is_none());
    }

    #[test]
    fn resume_rejects_past_due() {
        let mut m = active_membership();
        m.mark_past_due("declined").unwrap();
        assert!(m.resume("nope").is_err());
        assert_eq!(m.status, MembershipStatus::PastDue);
    }

    #[test]
    fn recover_payment_restores_access() {
        let mut m = active_membership();
        m.mark_past_due("declined").unwrap();
        assert!(!m.has_access());

        m.recover_payment("paid").unwrap();
        assert!(m.has_access());
    }

    #[test]
    fn set_status_routes_to_dedicated_transition() {
        let mut m = active_membership();
        m.end_date = Some(june_first());
        m.set_status(MembershipStatus::Cancelled, "admin").unwrap();
        assert_eq!(m.end_date, Some(june_first()));

        let mut paused = active_membership();
        paused.pause(None, "hold").unwrap();
        paused.set_status(MembershipStatus::Active, "admin").unwrap();
        assert_eq!(paused.status, MembershipStatus::Active);
    }

    #[test]
    fn reactivate_revives_terminal_membership() {
        let mut m = active_membership();
        m.end_date = Some(june_first());
        m.expire("lapsed").unwrap();
        assert!(m.set_status(MembershipStatus::Active, "late payment").is_err());

        let outcome = m.reactivate("admin").unwrap();

        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(m.status, MembershipStatus::Active);
        assert!(m.end_date.is_none());
        assert_eq!(m.status_log.len(), 3);
        assert_eq!(
            m.status_log.latest().unwrap().from,
            Some(MembershipStatus::Expired)
        );
    }

    #[test]
    fn reactivate_clears_pause_and_is_noop_when_active() {
        let mut m = active_membership();
        m.pause(Some(Timestamp::now().add_days(3)), "hold").unwrap();

        m.reactivate("admin").unwrap();
        assert!(m.paused_at.is_none());
        assert!(m.pause_until.is_none());

        let log_len = m.status_log.len();
        assert_eq!(m.reactivate("again").unwrap(), TransitionOutcome::Unchanged);
        assert_eq!(m.status_log.len(), log_len);
    }

    // ══════════════════════════════════════════════════════════════
    // Sweep predicates
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn lapsed_requires_active_and_past_end_date() {
        let now = Timestamp::now();
        let mut m = active_membership();
        assert!(!m.is_lapsed(&now));

        m.end_date = Some(now.minus_days(1));
        assert!(m.is_lapsed(&now));

        m.mark_past_due("declined").unwrap();
        assert!(!m.is_lapsed(&now));
    }

    #[test]
    fn expiring_window_is_exclusive_of_now() {
        let now = Timestamp::now();
        let mut m = active_membership();

        m.end_date = Some(now.add_days(3));
        assert!(m.is_expiring_within(&now, 7));

        m.end_date = Some(now.add_days(8));
        assert!(!m.is_expiring_within(&now, 7));

        m.end_date = Some(now.minus_days(1));
        assert!(!m.is_expiring_within(&now, 7));
    }
}
