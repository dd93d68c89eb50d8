//! CancelMembershipHandler - Command handler for cancelling memberships.

use std::sync::Arc;

use crate::domain::billing::Outcome;
use crate::domain::foundation::{DomainError, ErrorCode, LevelId, UserId};
use crate::domain::membership::{Membership, MembershipStatus};
use crate::ports::{MembershipRepository, PaymentGateway, TEMPLATE_MEMBERSHIP_CANCELLED};

use super::super::notifier::{membership_message, MemberNotifier};

/// Command to cancel a user's level.
#[derive(Debug, Clone)]
pub struct CancelMembershipCommand {
    pub user_id: UserId,
    pub level_id: LevelId,
    /// Keep the end date so the paid period runs out.
    pub at_period_end: bool,
    pub reason: Option<String>,
}

/// Result of successful membership cancellation.
#[derive(Debug, Clone)]
pub struct CancelMembershipResult {
    pub membership: Membership,
    /// Answer of the gateway when a subscription was cancelled.
    pub gateway_outcome: Option<Outcome>,
    /// False when the membership was already cancelled.
    pub cancelled: bool,
    pub notified: bool,
}

/// Handler for cancelling memberships.
///
/// The gateway subscription is stopped first; if the provider refuses,
/// the membership is left as it was so the member is not billed for a
/// level they no longer hold.
pub struct CancelMembershipHandler {
    gateway: Arc<dyn PaymentGateway>,
    repository: Arc<dyn MembershipRepository>,
    notifier: MemberNotifier,
}

impl CancelMembershipHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        repository: Arc<dyn MembershipRepository>,
        notifier: MemberNotifier,
    ) -> Self {
        Self {
            gateway,
            repository,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelMembershipCommand,
    ) -> Result<CancelMembershipResult, DomainError> {
        // 1. Find the membership
        let membership = self
            .repository
            .find(cmd.user_id, cmd.level_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::MembershipNotFound,
                    format!(
                        "No membership for user {} on level {}",
                        cmd.user_id, cmd.level_id
                    ),
                )
            })?;
        let was_cancelled = membership.status == MembershipStatus::Cancelled;

        // 2. Stop billing at the provider
        let mut gateway_outcome = None;
        if let Some(subscription_id) = membership
            .billing
            .subscription_id
            .as_deref()
            .filter(|_| !membership.is_terminal())
        {
            let outcome = self
                .gateway
                .cancel_subscription(subscription_id, cmd.at_period_end)
                .await;
            if let Outcome::Failure {
                message,
                error_code,
                ..
            } = &outcome
            {
                tracing::warn!(
                    user_id = %cmd.user_id,
                    level_id = %cmd.level_id,
                    subscription_id,
                    failure_code = error_code.as_str(),
                    error = %message,
                    "Subscription cancellation failed"
                );
                return Err(DomainError::new(
                    ErrorCode::GatewayFailure,
                    format!("Could not cancel subscription: {}", message),
                )
                .with_detail("failure_code", error_code.as_str())
                .with_detail("subscription_id", subscription_id));
            }
            gateway_outcome = Some(outcome);
        }

        // 3. Cancel the membership (domain logic)
        let reason = cmd.reason.as_deref().unwrap_or("Cancelled by request");
        let membership = self
            .repository
            .cancel(cmd.user_id, cmd.level_id, cmd.at_period_end, reason)
            .await?;
        let cancelled = !was_cancelled && membership.status == MembershipStatus::Cancelled;

        // 4. Tell the member
        let mut notified = false;
        if cancelled {
            tracing::info!(
                user_id = %cmd.user_id,
                level_id = %cmd.level_id,
                at_period_end = cmd.at_period_end,
                "Membership cancelled"
            );
            notified = self
                .notifier
                .notify(
                    TEMPLATE_MEMBERSHIP_CANCELLED,
                    cmd.user_id,
                    membership_message("Membership cancelled", cmd.level_id, membership.end_date),
                )
                .await;
        }

        Ok(CancelMembershipResult {
            membership,
            gateway_outcome,
            cancelled,
            notified,
        })
    }
}
