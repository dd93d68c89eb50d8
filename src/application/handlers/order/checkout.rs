//! CheckoutHandler - Command handler for paying for a level.

use std::sync::Arc;

use crate::domain::billing::Outcome;
use crate::domain::foundation::{Currency, DomainError, LevelId, Money, Timestamp, UserId};
use crate::domain::membership::{AssignOptions, BillingProfile, Membership, TransitionOutcome};
use crate::domain::order::{CheckoutContext, NewOrder, Order, TaxPolicy};
use crate::ports::{
    MembershipRepository, OrderRepository, PaymentGateway, KEY_CUSTOMER_ID, KEY_SUBSCRIPTION_ID,
    KEY_TRANSACTION_ID,
};

/// Command to buy a level.
#[derive(Debug, Clone)]
pub struct CheckoutCommand {
    pub user_id: UserId,
    pub level_id: LevelId,
    /// Initial payment before tax.
    pub subtotal: Money,
    /// Region the order is billed to, for tax.
    pub billing_region: Option<String>,
    pub currency: Option<Currency>,
    pub checkout: CheckoutContext,
}

/// Result of a checkout attempt.
///
/// A declined payment is not an error: the order stays pending with the
/// failure recorded and `outcome` carries the gateway's answer.
#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: Order,
    pub membership: Option<Membership>,
    pub outcome: Outcome,
}

impl CheckoutResult {
    pub fn is_paid(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Handler for checkout.
///
/// Creates the order, asks the gateway for a one-off charge or a
/// subscription depending on the plan, then settles the order and the
/// membership from the outcome.
pub struct CheckoutHandler {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderRepository>,
    memberships: Arc<dyn MembershipRepository>,
    tax: TaxPolicy,
}

impl CheckoutHandler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderRepository>,
        memberships: Arc<dyn MembershipRepository>,
        tax: TaxPolicy,
    ) -> Self {
        Self {
            gateway,
            orders,
            memberships,
            tax,
        }
    }

    pub async fn handle(&self, cmd: CheckoutCommand) -> Result<CheckoutResult, DomainError> {
        // 1. Price the order
        let tax = self
            .tax
            .calculate_tax(cmd.subtotal, cmd.billing_region.as_deref());
        let mut new = NewOrder::new(cmd.user_id, cmd.level_id, self.gateway.gateway_name())
            .with_environment(self.gateway.environment())
            .with_amounts(cmd.subtotal, tax)
            .with_checkout(cmd.checkout.clone());
        if let Some(currency) = cmd.currency {
            new = new.with_currency(currency);
        }

        // 2. Persist it as pending
        let mut order = self.orders.create(new).await?;
        order.checkout = cmd.checkout.clone();
        tracing::info!(
            order_id = %order.id,
            order_code = %order.code,
            user_id = %cmd.user_id,
            level_id = %cmd.level_id,
            total = %order.total,
            "Checkout order created"
        );

        // 3. Ask the gateway
        let plan = cmd.checkout.plan.clone();
        let outcome = match &plan {
            Some(_) => self.gateway.create_subscription(&order).await,
            None if order.total.is_zero() => Outcome::success_with_message("No payment required"),
            None => self.gateway.charge(&order).await,
        };

        // 4. Settle
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
                "Checkout payment failed"
            );
            let order = self
                .orders
                .record_failure(order.id, error_code.as_str(), message, Timestamp::now())
                .await?;
            return Ok(CheckoutResult {
                order,
                membership: None,
                outcome,
            });
        }

        let transaction_id = outcome.get_str(KEY_TRANSACTION_ID).map(str::to_string);
        let subscription_id = outcome.get_str(KEY_SUBSCRIPTION_ID).map(str::to_string);
        let order = self
            .orders
            .modify(order.id, &|o| {
                if let Some(id) = &subscription_id {
                    o.subscription_transaction_id = Some(id.clone());
                }
                o.mark_paid(transaction_id.as_deref(), Some("Checkout completed"))?;
                Ok(TransitionOutcome::Applied)
            })
            .await?;

        let billing = BillingProfile {
            payment_method: cmd.checkout.payment_method_id.clone(),
            customer_id: outcome
                .get_str(KEY_CUSTOMER_ID)
                .map(str::to_string)
                .or_else(|| cmd.checkout.customer_id.clone()),
            subscription_id,
            billing_amount: plan.as_ref().map(|p| p.amount),
            cycle_number: plan.as_ref().and_then(|p| i32::try_from(p.frequency).ok()),
            cycle_period: plan.as_ref().map(|p| p.period),
        };
        let membership = self
            .memberships
            .assign(
                cmd.user_id,
                cmd.level_id,
                AssignOptions::default()
                    .with_billing(billing)
                    .with_reason("Checkout completed"),
            )
            .await?;
        tracing::info!(
            order_id = %order.id,
            membership_id = %membership.id,
            "Checkout completed"
        );

        Ok(CheckoutResult {
            order,
            membership: Some(membership),
            outcome,
        })
    }
}
