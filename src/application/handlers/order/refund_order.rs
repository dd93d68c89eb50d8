//! RefundOrderHandler - Command handler for refunding a paid order.

use std::sync::Arc;

use crate::domain::billing::Outcome;
use crate::domain::foundation::{DomainError, ErrorCode, Money, OrderId, Timestamp};
use crate::domain::membership::{MembershipStatus, TransitionOutcome};
use crate::domain::order::{Order, OrderStatus};
use crate::ports::{MembershipRepository, OrderRepository, PaymentGateway};

/// Command to refund an order, fully when `amount` is absent.
#[derive(Debug, Clone)]
pub struct RefundOrderCommand {
    pub order_id: OrderId,
    pub amount: Option<Money>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundOrderResult {
    pub order: Order,
    pub outcome: Outcome,
    /// True when the refund completed the order and ended the membership.
    pub membership_cancelled: bool,
}

/// Handler for refunds.
///
/// The refund is recorded up to a target total rather than added blindly,
/// so a `charge.refunded` webhook applied first is not counted twice.
pub struct RefundOrderHandler {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderRepository>,
    memberships: Arc<dyn MembershipRepository>,
}

impl RefundOrderHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderRepository>,
        memberships: Arc<dyn MembershipRepository>,
    ) -> Self {
        Self {
            gateway,
            orders,
            memberships,
        }
    }

    pub async fn handle(&self, cmd: RefundOrderCommand) -> Result<RefundOrderResult, DomainError> {
        let order = self.orders.find(cmd.order_id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order {} not found", cmd.order_id),
            )
        })?;

        if order.status != OrderStatus::Success {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot refund an order in status {}", order.status),
            )
            .with_detail("order_id", order.id.to_string()));
        }

        let remaining = order.remaining_refundable();
        let amount = cmd.amount.unwrap_or(remaining);
        if amount.is_negative() || amount.is_zero() {
            return Err(DomainError::validation(
                "amount",
                format!("Refund amount must be positive, got {}", amount),
            ));
        }
        if amount > remaining {
            return Err(DomainError::validation(
                "amount",
                format!("Refund {} exceeds refundable balance {}", amount, remaining),
            ));
        }

        let outcome = self.gateway.refund(&order, Some(amount)).await;
        if let Outcome::Failure {
            message,
            error_code,
            ..
        } = &outcome
        {
            tracing::warn!(
                order_id = %order.id,
                failure_code = error_code.as_str(),
                error = %message,
                "Gateway refund failed"
            );
            return Ok(RefundOrderResult {
                order,
                outcome,
                membership_cancelled: false,
            });
        }

        let target = order.refund_amount + amount;
        let reason = cmd.reason.clone();
        let at = Timestamp::now();
        let order = self
            .orders
            .modify(order.id, &|o| {
                let delta = (target - o.refund_amount).min(o.remaining_refundable());
                if delta <= Money::ZERO || o.status != OrderStatus::Success {
                    return Ok(TransitionOutcome::Unchanged);
                }
                o.record_refund(delta, reason.as_deref(), at)?;
                Ok(TransitionOutcome::Applied)
            })
            .await?;
        tracing::info!(
            order_id = %order.id,
            refund_amount = %order.refund_amount,
            status = %order.status,
            "Order refunded"
        );

        let mut membership_cancelled = false;
        if order.is_fully_refunded() {
            if let Some(membership) = self.memberships.find(order.user_id, order.level_id).await? {
                if matches!(
                    membership.status,
                    MembershipStatus::Active | MembershipStatus::PastDue
                ) {
                    self.memberships
                        .cancel(order.user_id, order.level_id, false, "Order refunded")
                        .await?;
                    membership_cancelled = true;
                }
            }
        }

        Ok(RefundOrderResult {
            order,
            outcome,
            membership_cancelled,
        })
    }
}
