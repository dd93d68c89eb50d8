//! StripeEventHandler - Maps Stripe events onto order and membership changes.
//!
//! Handlers re-read persisted state and derive the target state from it,
//! so out-of-order deliveries converge. Objects that cannot be tied to a
//! user and level are acknowledged as ignored.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::domain::billing::{BillingPeriod, GatewayEnvironment};
use crate::domain::foundation::{
    Currency, LevelId, Money, OrderId, StateMachine, Timestamp, UserId,
};
use crate::domain::membership::{
    AssignOptions, BillingProfile, Membership, MembershipStatus, TransitionOutcome,
};
use crate::domain::order::{DiscountDetails, NewOrder, Order, OrderStatus};
use crate::domain::webhook::{
    StripeCharge, StripeEventType, StripeInvoice, StripeSubscription, WebhookError, WebhookEvent,
};
use crate::ports::{
    MembershipRepository, OrderRepository, TEMPLATE_MEMBERSHIP_CANCELLED, TEMPLATE_PAYMENT_FAILED,
};

use super::super::notifier::{membership_message, MemberNotifier};
use super::processor::WebhookEventHandler;
use super::resolve::{metadata_id, Resolved, META_ORDER_CODE, META_ORDER_ID};

/// Order failure details recorded by the failure handlers.
struct Failure<'a> {
    code: &'a str,
    message: &'a str,
    note: String,
}

/// Handles every Stripe event type the billing core reacts to.
pub struct StripeEventHandler {
    gateway: String,
    environment: GatewayEnvironment,
    orders: Arc<dyn OrderRepository>,
    memberships: Arc<dyn MembershipRepository>,
    notifier: MemberNotifier,
}

impl StripeEventHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        memberships: Arc<dyn MembershipRepository>,
        notifier: MemberNotifier,
    ) -> Self {
        Self {
            gateway: "stripe".to_string(),
            environment: GatewayEnvironment::Sandbox,
            orders,
            memberships,
            notifier,
        }
    }

    /// Environment stamped on orders created from webhooks.
    pub fn with_environment(mut self, environment: GatewayEnvironment) -> Self {
        self.environment = environment;
        self
    }

    // ════════════════════════════════════════════════════════════════════
    // Charges
    // ════════════════════════════════════════════════════════════════════

    async fn charge_succeeded(&self, charge: StripeCharge) -> Result<(), WebhookError> {
        let order = self
            .find_charge_order(&charge)
            .await?
            .ok_or_else(|| WebhookError::Ignored(format!("No order for charge {}", charge.id)))?;

        let transaction_id = order
            .payment_transaction_id
            .is_none()
            .then(|| charge.id.clone());
        let order = self
            .orders
            .modify(order.id, &|o| {
                if o.status != OrderStatus::Success
                    && !o.status.can_transition_to(&OrderStatus::Success)
                {
                    tracing::warn!(order_id = %o.id, status = %o.status, "Charge succeeded for a closed order");
                    return Ok(TransitionOutcome::Unchanged);
                }
                o.mark_paid(transaction_id.as_deref(), Some("Stripe charge succeeded"))
            })
            .await?;
        if order.status != OrderStatus::Success {
            return Ok(());
        }
        tracing::info!(order_id = %order.id, order_code = %order.code, "Order paid by charge");

        let resolved =
            Resolved::from_metadata(&charge.metadata, None).or(resolved_from_order(&order));
        if let Some((user_id, level_id)) = resolved.pair() {
            let billing = BillingProfile {
                customer_id: charge.customer.clone(),
                ..Default::default()
            };
            self.activate_membership(user_id, level_id, billing, None, "Stripe charge succeeded")
                .await?;
        }
        Ok(())
    }

    async fn charge_failed(&self, charge: StripeCharge) -> Result<(), WebhookError> {
        let existing = self.find_charge_order(&charge).await?;
        let (user_id, level_id) = Resolved::from_metadata(&charge.metadata, None)
            .or(existing.as_ref().map(resolved_from_order).unwrap_or_default())
            .pair()
            .ok_or_else(|| unresolved("charge.failed"))?;

        let message = charge
            .failure_message
            .as_deref()
            .unwrap_or("Stripe charge failed");
        let failure = Failure {
            code: charge.failure_code.as_deref().unwrap_or("charge_failed"),
            message,
            note: with_detail("Stripe charge failed", charge.failure_message.as_deref()),
        };

        let template = self
            .new_order(user_id, level_id, charge.amount, charge.currency.as_deref())
            .with_payment_transaction_id(charge.id.clone());
        let order = self.record_order_failure(existing, template, failure).await?;

        self.mark_membership_past_due(user_id, level_id, "Stripe charge failed")
            .await?;
        self.notify_payment_failed(user_id, level_id, &order, charge.amount)
            .await;
        Ok(())
    }

    async fn charge_refunded(&self, charge: StripeCharge) -> Result<(), WebhookError> {
        let order = self
            .find_by_transaction(&charge.id, charge.payment_intent.as_deref())
            .await?
            .ok_or_else(|| WebhookError::Ignored(format!("No order for charge {}", charge.id)))?;

        // amount_refunded is cumulative; only the part not yet recorded is new.
        let refunded_total = Money::from_minor_units(charge.amount_refunded);
        let reason = charge.latest_refund_reason().map(str::to_string);
        let at = Timestamp::now();

        let order = self
            .orders
            .modify(order.id, &|o| {
                let delta = refunded_total - o.refund_amount;
                if delta <= Money::ZERO {
                    return Ok(TransitionOutcome::Unchanged);
                }
                let delta = delta.min(o.remaining_refundable());
                if delta <= Money::ZERO {
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
            "Charge refund recorded"
        );

        if order.is_fully_refunded() {
            self.cancel_membership_now(order.user_id, order.level_id, "Stripe refund processed")
                .await?;
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════
    // Invoices
    // ════════════════════════════════════════════════════════════════════

    async fn invoice_payment_succeeded(&self, invoice: StripeInvoice) -> Result<(), WebhookError> {
        let (user_id, level_id) = self
            .resolve_invoice(&invoice)
            .await?
            .ok_or_else(|| unresolved("invoice.payment_succeeded"))?;

        let transaction_id = invoice.charge.clone().unwrap_or_else(|| invoice.id.clone());
        let discount = invoice.discount_details();
        match self
            .orders
            .find_by_payment_transaction_id(&transaction_id)
            .await?
        {
            Some(existing) => {
                let subscription_id = invoice.subscription.clone();
                self.orders
                    .modify(existing.id, &|o| {
                        if o.status != OrderStatus::Success
                            && !o.status.can_transition_to(&OrderStatus::Success)
                        {
                            tracing::warn!(order_id = %o.id, status = %o.status, "Paid invoice for a closed order");
                            return Ok(TransitionOutcome::Unchanged);
                        }
                        if o.subscription_transaction_id.is_none() {
                            o.subscription_transaction_id = subscription_id.clone();
                        }
                        let discounted = o.apply_discount(&discount);
                        let paid = o.mark_paid(None, Some("Stripe invoice payment succeeded"))?;
                        Ok(if discounted.is_applied() { discounted } else { paid })
                    })
                    .await?;
            }
            None => {
                let mut new = self
                    .new_order(user_id, level_id, invoice.amount_paid, invoice.currency.as_deref())
                    .with_payment_transaction_id(transaction_id.clone())
                    .with_status(OrderStatus::Success)
                    .with_discount(discount.clone());
                if let Some(tax) = invoice.tax.filter(|t| *t > 0 && *t <= invoice.amount_paid) {
                    let total = Money::from_minor_units(invoice.amount_paid);
                    let tax = Money::from_minor_units(tax);
                    new = new.with_amounts(total - tax, tax);
                }
                if let Some(subscription_id) = &invoice.subscription {
                    new = new.with_subscription_transaction_id(subscription_id.clone());
                }
                new.notes = Some("Stripe invoice payment succeeded".to_string());
                let order = self.orders.create(new).await?;
                tracing::info!(order_id = %order.id, order_code = %order.code, "Order created from invoice");
            }
        }

        let billing = BillingProfile {
            customer_id: invoice.customer.clone(),
            subscription_id: invoice.subscription.clone(),
            ..Default::default()
        };
        let period_end = invoice.first_period_end().and_then(Timestamp::from_unix_secs);
        self.activate_membership(
            user_id,
            level_id,
            billing,
            period_end,
            "Stripe invoice payment succeeded",
        )
        .await?;
        Ok(())
    }

    async fn invoice_payment_failed(&self, invoice: StripeInvoice) -> Result<(), WebhookError> {
        let (user_id, level_id) = self
            .resolve_invoice(&invoice)
            .await?
            .ok_or_else(|| unresolved("invoice.payment_failed"))?;

        let existing = self
            .find_by_transaction(&invoice.id, invoice.charge.as_deref())
            .await?;
        let error = invoice.last_payment_error.clone().unwrap_or_default();
        let failure = Failure {
            code: error.code.as_deref().unwrap_or("payment_failed"),
            message: error.describe().unwrap_or("Stripe invoice payment failed"),
            note: with_detail("Stripe invoice payment failed", error.describe()),
        };

        let mut template = self
            .new_order(user_id, level_id, invoice.amount_due, invoice.currency.as_deref())
            .with_payment_transaction_id(invoice.id.clone());
        if let Some(subscription_id) = &invoice.subscription {
            template = template.with_subscription_transaction_id(subscription_id.clone());
        }
        let order = self.record_order_failure(existing, template, failure).await?;

        self.mark_membership_past_due(user_id, level_id, "Stripe invoice payment failed")
            .await?;
        self.notify_payment_failed(user_id, level_id, &order, invoice.amount_due)
            .await;
        Ok(())
    }

    /// Writes the invoice's discount onto the latest order of its
    /// subscription, before or without a payment.
    async fn invoice_discount_updated(&self, invoice: StripeInvoice) -> Result<(), WebhookError> {
        let subscription_id = invoice
            .subscription
            .as_deref()
            .ok_or_else(|| {
                WebhookError::Ignored(format!("Invoice {} has no subscription", invoice.id))
            })?;
        let details = invoice.discount_details();
        if details.is_empty() {
            return Err(WebhookError::Ignored(format!(
                "Invoice {} has no discount",
                invoice.id
            )));
        }
        self.reconcile_discount(subscription_id, &details)
            .await?
            .ok_or_else(|| {
                WebhookError::Ignored(format!("No order for subscription {}", subscription_id))
            })?;
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════
    // Subscriptions
    // ════════════════════════════════════════════════════════════════════

    async fn subscription_updated(&self, sub: StripeSubscription) -> Result<(), WebhookError> {
        let details = sub.discount_details();
        if !details.is_empty() {
            self.reconcile_discount(&sub.id, &details).await?;
        }

        let (user_id, level_id) = self
            .resolve_subscription(&sub)
            .await?
            .ok_or_else(|| unresolved("customer.subscription.updated"))?;

        let membership = self
            .memberships
            .find(user_id, level_id)
            .await?
            .ok_or_else(|| {
                WebhookError::Ignored(format!(
                    "No membership for user {} on level {}",
                    user_id, level_id
                ))
            })?;

        let mut billing = BillingProfile {
            subscription_id: Some(sub.id.clone()),
            customer_id: sub.customer.clone(),
            payment_method: sub.default_payment_method.clone(),
            ..Default::default()
        };
        if let Some((amount, interval, interval_count)) = sub.billing_terms() {
            billing.billing_amount = amount.map(Money::from_minor_units);
            billing.cycle_number = interval_count;
            billing.cycle_period = interval.and_then(|i| i.parse::<BillingPeriod>().ok());
        }
        self.memberships
            .update_billing_profile(user_id, level_id, billing)
            .await?;

        if let Some(end) = sub
            .current_period_end
            .filter(|secs| *secs > 0)
            .and_then(Timestamp::from_unix_secs)
        {
            self.memberships
                .update_end_date(user_id, level_id, Some(end))
                .await?;
        }

        let reason = format!("Stripe subscription status {}", sub.status);
        match (sub.status.as_str(), membership.status) {
            ("past_due" | "unpaid", MembershipStatus::Active | MembershipStatus::PastDue) => {
                self.memberships
                    .mark_past_due(user_id, level_id, &reason)
                    .await?;
            }
            (
                "canceled" | "incomplete_expired",
                MembershipStatus::Active | MembershipStatus::PastDue,
            ) => {
                self.memberships
                    .cancel(user_id, level_id, true, "Stripe subscription cancelled")
                    .await?;
            }
            ("active" | "trialing", MembershipStatus::PastDue) => {
                self.memberships
                    .set_status(user_id, level_id, MembershipStatus::Active, &reason)
                    .await?;
            }
            (status, current) => {
                tracing::debug!(
                    user_id = %user_id,
                    level_id = %level_id,
                    subscription_status = status,
                    membership_status = %current,
                    "No status change for subscription update"
                );
            }
        }
        Ok(())
    }

    async fn subscription_deleted(&self, sub: StripeSubscription) -> Result<(), WebhookError> {
        let (user_id, level_id) = self
            .resolve_subscription(&sub)
            .await?
            .ok_or_else(|| unresolved("customer.subscription.deleted"))?;

        if let Some(membership) = self
            .cancel_membership_now(user_id, level_id, "Stripe subscription deleted")
            .await?
        {
            self.notifier
                .notify(
                    TEMPLATE_MEMBERSHIP_CANCELLED,
                    user_id,
                    membership_message("Membership cancelled", level_id, membership.end_date),
                )
                .await;
        }

        if let Some(order) = self.orders.find_last_by_subscription_id(&sub.id).await? {
            if order.status.can_transition_to(&OrderStatus::Cancelled) {
                self.orders
                    .update_status(order.id, OrderStatus::Cancelled, Some("Subscription cancelled"))
                    .await?;
            }
        }
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════
    // Shared steps
    // ════════════════════════════════════════════════════════════════════

    /// Merges discount details into the latest order of a subscription.
    /// Returns None when the subscription has no order.
    async fn reconcile_discount(
        &self,
        subscription_id: &str,
        details: &DiscountDetails,
    ) -> Result<Option<Order>, WebhookError> {
        let Some(order) = self.orders.find_last_by_subscription_id(subscription_id).await? else {
            return Ok(None);
        };
        let order = self
            .orders
            .modify(order.id, &|o| Ok(o.apply_discount(details)))
            .await?;
        tracing::info!(
            order_id = %order.id,
            subscription_id,
            discount_code = order.discount.discount_code.as_deref().unwrap_or(""),
            "Order discount reconciled"
        );
        Ok(Some(order))
    }

    async fn find_by_transaction(
        &self,
        primary: &str,
        secondary: Option<&str>,
    ) -> Result<Option<Order>, WebhookError> {
        if let Some(order) = self.orders.find_by_payment_transaction_id(primary).await? {
            return Ok(Some(order));
        }
        match secondary {
            Some(id) => Ok(self.orders.find_by_payment_transaction_id(id).await?),
            None => Ok(None),
        }
    }

    /// Charge id, payment intent, then the order named in metadata.
    async fn find_charge_order(&self, charge: &StripeCharge) -> Result<Option<Order>, WebhookError> {
        if let Some(order) = self
            .find_by_transaction(&charge.id, charge.payment_intent.as_deref())
            .await?
        {
            return Ok(Some(order));
        }
        if let Some(code) = charge.metadata.get(META_ORDER_CODE) {
            if let Some(order) = self.orders.find_by_code(code).await? {
                return Ok(Some(order));
            }
        }
        match metadata_id(&charge.metadata, META_ORDER_ID) {
            Some(id) => Ok(self.orders.find(OrderId::new(id)).await?),
            None => Ok(None),
        }
    }

    async fn resolve_invoice(
        &self,
        invoice: &StripeInvoice,
    ) -> Result<Option<(UserId, LevelId)>, WebhookError> {
        let line_metadata = invoice.lines.data.first().map(|l| &l.metadata);
        let mut resolved = Resolved::from_metadata(&invoice.metadata, invoice.first_plan_id());
        if let Some(metadata) = line_metadata {
            resolved = resolved.or(Resolved::from_metadata(metadata, None));
        }
        self.resolve_with_subscription(resolved, invoice.subscription.as_deref())
            .await
    }

    async fn resolve_subscription(
        &self,
        sub: &StripeSubscription,
    ) -> Result<Option<(UserId, LevelId)>, WebhookError> {
        let plan_id = sub
            .items
            .data
            .first()
            .and_then(|item| {
                item.plan
                    .as_ref()
                    .map(|p| p.id.as_str())
                    .or_else(|| item.price.as_ref().map(|p| p.id.as_str()))
            });
        let resolved = Resolved::from_metadata(&sub.metadata, plan_id);
        self.resolve_with_subscription(resolved, Some(&sub.id)).await
    }

    /// Falls back to the latest order of the subscription.
    async fn resolve_with_subscription(
        &self,
        resolved: Resolved,
        subscription_id: Option<&str>,
    ) -> Result<Option<(UserId, LevelId)>, WebhookError> {
        if let Some(pair) = resolved.pair() {
            return Ok(Some(pair));
        }
        let Some(subscription_id) = subscription_id else {
            return Ok(None);
        };
        let fallback = self
            .orders
            .find_last_by_subscription_id(subscription_id)
            .await?
            .map(|o| resolved_from_order(&o))
            .unwrap_or_default();
        Ok(resolved.or(fallback).pair())
    }

    fn new_order(
        &self,
        user_id: UserId,
        level_id: LevelId,
        amount_minor: i64,
        currency: Option<&str>,
    ) -> NewOrder {
        let currency = currency
            .and_then(|c| Currency::new(c).ok())
            .unwrap_or_default();
        NewOrder::new(user_id, level_id, self.gateway.clone())
            .with_environment(self.environment)
            .with_currency(currency)
            .with_amounts(Money::from_minor_units(amount_minor.max(0)), Money::ZERO)
    }

    /// Stores failure details on the existing order, or on a new `past_due` one.
    ///
    /// A paid order moves to `past_due`; a pending one stays pending.
    async fn record_order_failure(
        &self,
        existing: Option<Order>,
        template: NewOrder,
        failure: Failure<'_>,
    ) -> Result<Order, WebhookError> {
        let at = Timestamp::now();
        let (id, is_new) = match existing {
            Some(order) => (order.id, false),
            None => {
                let mut new = template.with_status(OrderStatus::PastDue);
                new.notes = Some(failure.note.clone());
                (self.orders.create(new).await?.id, true)
            }
        };

        let order = self
            .orders
            .modify(id, &|o| {
                if !is_new {
                    if o.status == OrderStatus::Success {
                        o.transition(OrderStatus::PastDue, Some(&failure.note))?;
                    } else {
                        o.append_note(&failure.note);
                    }
                }
                o.record_failure(failure.code, failure.message, at);
                Ok(TransitionOutcome::Applied)
            })
            .await?;
        tracing::info!(
            order_id = %order.id,
            failure_code = failure.code,
            "Order payment failure recorded"
        );
        Ok(order)
    }

    /// None or terminal: assign. Past due: recover. Otherwise keep the
    /// status and only push a later period end.
    async fn activate_membership(
        &self,
        user_id: UserId,
        level_id: LevelId,
        billing: BillingProfile,
        period_end: Option<Timestamp>,
        reason: &str,
    ) -> Result<Membership, WebhookError> {
        let membership = match self.memberships.find(user_id, level_id).await? {
            Some(m) if m.status == MembershipStatus::PastDue => {
                self.memberships
                    .set_status(user_id, level_id, MembershipStatus::Active, reason)
                    .await?
            }
            Some(m) if !m.is_terminal() => m,
            _ => {
                let options = AssignOptions::default()
                    .with_billing(billing)
                    .with_end_date(period_end)
                    .with_reason(reason);
                let assigned = self.memberships.assign(user_id, level_id, options).await?;
                tracing::info!(user_id = %user_id, level_id = %level_id, "Membership assigned");
                return Ok(assigned);
            }
        };

        match (membership.end_date, period_end) {
            (Some(current), Some(end)) if end.is_after(&current) => Ok(self
                .memberships
                .update_end_date(user_id, level_id, Some(end))
                .await?),
            _ => Ok(membership),
        }
    }

    async fn mark_membership_past_due(
        &self,
        user_id: UserId,
        level_id: LevelId,
        reason: &str,
    ) -> Result<(), WebhookError> {
        match self.memberships.find(user_id, level_id).await? {
            Some(m) if matches!(m.status, MembershipStatus::Active | MembershipStatus::PastDue) => {
                self.memberships
                    .mark_past_due(user_id, level_id, reason)
                    .await?;
            }
            Some(m) => {
                tracing::debug!(user_id = %user_id, level_id = %level_id, status = %m.status, "Membership not marked past due");
            }
            None => {
                tracing::debug!(user_id = %user_id, level_id = %level_id, "No membership to mark past due");
            }
        }
        Ok(())
    }

    /// Cancels with immediate effect; returns the membership if it changed.
    async fn cancel_membership_now(
        &self,
        user_id: UserId,
        level_id: LevelId,
        reason: &str,
    ) -> Result<Option<Membership>, WebhookError> {
        match self.memberships.find(user_id, level_id).await? {
            Some(m) if matches!(m.status, MembershipStatus::Active | MembershipStatus::PastDue) => {
                let cancelled = self
                    .memberships
                    .cancel(user_id, level_id, false, reason)
                    .await?;
                tracing::info!(user_id = %user_id, level_id = %level_id, reason, "Membership cancelled");
                Ok(Some(cancelled))
            }
            _ => Ok(None),
        }
    }

    async fn notify_payment_failed(
        &self,
        user_id: UserId,
        level_id: LevelId,
        order: &Order,
        amount_minor: i64,
    ) {
        let message = membership_message("Payment failed", level_id, None)
            .data("order_code", order.code.as_str())
            .data("amount", Money::from_minor_units(amount_minor).to_string())
            .data("failure_message", json!(order.failure_message));
        self.notifier
            .notify(TEMPLATE_PAYMENT_FAILED, user_id, message)
            .await;
    }
}

#[async_trait]
impl WebhookEventHandler for StripeEventHandler {
    async fn handle(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        match event.kind() {
            StripeEventType::ChargeSucceeded => self.charge_succeeded(object(event)?).await,
            StripeEventType::ChargeFailed => self.charge_failed(object(event)?).await,
            StripeEventType::ChargeRefunded => self.charge_refunded(object(event)?).await,
            StripeEventType::InvoicePaymentSucceeded => {
                self.invoice_payment_succeeded(object(event)?).await
            }
            StripeEventType::InvoicePaymentFailed => {
                self.invoice_payment_failed(object(event)?).await
            }
            StripeEventType::InvoiceFinalized | StripeEventType::InvoiceUpdated => {
                self.invoice_discount_updated(object(event)?).await
            }
            StripeEventType::CustomerSubscriptionUpdated => {
                self.subscription_updated(object(event)?).await
            }
            StripeEventType::CustomerSubscriptionDeleted
            | StripeEventType::CustomerSubscriptionCanceled => {
                self.subscription_deleted(object(event)?).await
            }
            StripeEventType::Unknown => Err(WebhookError::Ignored(format!(
                "Unhandled event type {}",
                event.event_type
            ))),
        }
    }
}

fn object<T: DeserializeOwned>(event: &WebhookEvent) -> Result<T, WebhookError> {
    event.deserialize_object().map_err(|e| {
        WebhookError::ParseError(format!("Invalid {} object: {}", event.event_type, e))
    })
}

fn resolved_from_order(order: &Order) -> Resolved {
    Resolved {
        user_id: Some(order.user_id),
        level_id: Some(order.level_id),
    }
}

fn unresolved(event_type: &str) -> WebhookError {
    WebhookError::Ignored(format!("{}: user or level could not be resolved", event_type))
}

fn with_detail(base: &str, detail: Option<&str>) -> String {
    match detail.filter(|d| !d.trim().is_empty()) {
        Some(detail) => format!("{}: {}", base, detail),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryMembershipRepository, InMemoryOrderRepository, InMemoryUserDirectory,
        RecordingEmailService,
    };
    use crate::domain::billing::BillingUser;
    use crate::domain::order::Discount;
    use crate::domain::webhook::WebhookEventBuilder;
    use serde_json::Value;

    struct Fixture {
        orders: Arc<InMemoryOrderRepository>,
        memberships: Arc<InMemoryMembershipRepository>,
        email: Arc<RecordingEmailService>,
        handler: StripeEventHandler,
    }

    fn fixture() -> Fixture {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let memberships = Arc::new(InMemoryMembershipRepository::new());
        let email = Arc::new(RecordingEmailService::new());
        let users = Arc::new(InMemoryUserDirectory::new().with_user(BillingUser {
            id: UserId::new(42),
            email: "member@example.com".to_string(),
            display_name: None,
            login: "member".to_string(),
        }));
        let handler = StripeEventHandler::new(
            orders.clone(),
            memberships.clone(),
            MemberNotifier::new(email.clone(), users),
        );
        Fixture {
            orders,
            memberships,
            email,
            handler,
        }
    }

    fn event(kind: StripeEventType, object: Value) -> WebhookEvent {
        WebhookEventBuilder::new(kind).object(object).build()
    }

    const USER: UserId = UserId::new(42);
    const LEVEL: LevelId = LevelId::new(7);

    async fn paid_order(f: &Fixture, transaction_id: &str) -> Order {
        let order = f
            .orders
            .create(
                NewOrder::new(USER, LEVEL, "stripe")
                    .with_amounts("20.00".parse().unwrap(), Money::ZERO)
                    .with_payment_transaction_id(transaction_id),
            )
            .await
            .unwrap();
        f.orders
            .update_status(order.id, OrderStatus::Success, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn charge_succeeded_marks_order_paid_once() {
        let f = fixture();
        let order = f
            .orders
            .create(NewOrder::new(USER, LEVEL, "stripe").with_payment_transaction_id("txn_123"))
            .await
            .unwrap();
        let e = event(
            StripeEventType::ChargeSucceeded,
            json!({"id": "txn_123", "metadata": {"user_id": "42", "membership_id": "7"}}),
        );

        f.handler.handle(&e).await.unwrap();
        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
        assert_eq!(stored.status_log.len(), 2);
        assert!(f.memberships.has_access(USER, LEVEL).await.unwrap());
    }

    #[tokio::test]
    async fn charge_succeeded_finds_order_by_metadata_code() {
        let f = fixture();
        let order = f
            .orders
            .create(NewOrder {
                code: Some("ORDCODE001".to_string()),
                ..NewOrder::new(USER, LEVEL, "stripe")
            })
            .await
            .unwrap();
        let e = event(
            StripeEventType::ChargeSucceeded,
            json!({"id": "ch_9", "metadata": {"order_code": "ORDCODE001"}}),
        );

        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
        assert_eq!(stored.payment_transaction_id.as_deref(), Some("ch_9"));
    }

    #[tokio::test]
    async fn charge_succeeded_for_refunded_order_grants_nothing() {
        let f = fixture();
        let order = paid_order(&f, "txn_late").await;
        f.orders
            .update_status(order.id, OrderStatus::Refunded, Some("refunded"))
            .await
            .unwrap();
        let e = event(
            StripeEventType::ChargeSucceeded,
            json!({"id": "txn_late", "metadata": {"user_id": "42", "membership_id": "7"}}),
        );

        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Refunded);
        assert!(!f.memberships.has_access(USER, LEVEL).await.unwrap());
    }

    #[tokio::test]
    async fn charge_succeeded_without_order_is_ignored() {
        let f = fixture();
        let e = event(StripeEventType::ChargeSucceeded, json!({"id": "ch_unknown"}));

        let err = f.handler.handle(&e).await.unwrap_err();
        assert!(matches!(err, WebhookError::Ignored(_)));
    }

    #[tokio::test]
    async fn charge_failed_creates_past_due_order_and_marks_membership() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        let e = event(
            StripeEventType::ChargeFailed,
            json!({
                "id": "ch_fail",
                "amount": 1500,
                "failure_code": "card_declined",
                "failure_message": "Your card was declined.",
                "metadata": {"user_id": "42", "membership_id": "7"}
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let order = f
            .orders
            .find_by_payment_transaction_id("ch_fail")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::PastDue);
        assert_eq!(order.failure_code.as_deref(), Some("card_declined"));
        assert_eq!(order.total, Money::from_minor_units(1500));
        let membership = f.memberships.find(USER, LEVEL).await.unwrap().unwrap();
        assert_eq!(membership.status, MembershipStatus::PastDue);
        assert_eq!(f.email.sent_with_template(TEMPLATE_PAYMENT_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn charge_failed_keeps_pending_order_pending() {
        let f = fixture();
        let order = f
            .orders
            .create(NewOrder::new(USER, LEVEL, "stripe").with_payment_transaction_id("pi_1"))
            .await
            .unwrap();
        let e = event(
            StripeEventType::ChargeFailed,
            json!({"id": "ch_1", "payment_intent": "pi_1", "failure_code": "expired_card"}),
        );

        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.failure_code.as_deref(), Some("expired_card"));
        assert!(stored.failure_at.is_some());
    }

    #[tokio::test]
    async fn charge_failed_without_context_is_ignored() {
        let f = fixture();
        let e = event(StripeEventType::ChargeFailed, json!({"id": "ch_x"}));
        assert!(matches!(
            f.handler.handle(&e).await.unwrap_err(),
            WebhookError::Ignored(_)
        ));
    }

    #[tokio::test]
    async fn partial_then_full_refund_uses_cumulative_amount() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        let order = paid_order(&f, "ch_1").await;

        let partial = event(
            StripeEventType::ChargeRefunded,
            json!({"id": "ch_1", "amount_refunded": 500}),
        );
        f.handler.handle(&partial).await.unwrap();
        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.refund_amount, Money::from_minor_units(500));
        assert_eq!(stored.status, OrderStatus::Success);
        assert!(f.memberships.has_access(USER, LEVEL).await.unwrap());

        let full = event(
            StripeEventType::ChargeRefunded,
            json!({
                "id": "ch_1",
                "amount_refunded": 2000,
                "refunds": {"data": [{"id": "re_2", "reason": "requested_by_customer", "created": 5}]}
            }),
        );
        f.handler.handle(&full).await.unwrap();
        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.refund_amount, Money::from_minor_units(2000));
        assert_eq!(stored.status, OrderStatus::Refunded);
        assert_eq!(stored.refund_reason.as_deref(), Some("requested_by_customer"));

        let membership = f.memberships.find(USER, LEVEL).await.unwrap().unwrap();
        assert_eq!(membership.status, MembershipStatus::Cancelled);
    }

    #[tokio::test]
    async fn refund_already_recorded_is_unchanged() {
        let f = fixture();
        let order = paid_order(&f, "ch_1").await;
        f.orders
            .record_refund(order.id, Money::from_minor_units(500), None, Timestamp::now())
            .await
            .unwrap();
        let e = event(
            StripeEventType::ChargeRefunded,
            json!({"id": "ch_1", "amount_refunded": 500}),
        );

        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.refund_amount, Money::from_minor_units(500));
    }

    #[tokio::test]
    async fn invoice_payment_succeeded_creates_order_and_assigns() {
        let f = fixture();
        let e = event(
            StripeEventType::InvoicePaymentSucceeded,
            json!({
                "id": "in_1",
                "charge": "ch_inv",
                "subscription": "sub_1",
                "customer": "cus_1",
                "amount_paid": 2500,
                "metadata": {"user_id": "42"},
                "lines": {"data": [{"plan": {"id": "khm_level_7"}, "period": {"start": 1, "end": 4102444800i64}}]}
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let order = f
            .orders
            .find_by_payment_transaction_id("ch_inv")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Success);
        assert_eq!(order.level_id, LEVEL);
        assert_eq!(order.subscription_transaction_id.as_deref(), Some("sub_1"));
        assert_eq!(order.total, Money::from_minor_units(2500));

        let membership = f.memberships.find(USER, LEVEL).await.unwrap().unwrap();
        assert_eq!(membership.status, MembershipStatus::Active);
        assert_eq!(membership.billing.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(membership.end_date, Timestamp::from_unix_secs(4102444800));
    }

    #[tokio::test]
    async fn invoice_payment_succeeded_recovers_past_due() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        f.memberships
            .mark_past_due(USER, LEVEL, "failed")
            .await
            .unwrap();
        let e = event(
            StripeEventType::InvoicePaymentSucceeded,
            json!({"id": "in_2", "amount_paid": 100, "metadata": {"user_id": "42", "membership_id": "7"}}),
        );

        f.handler.handle(&e).await.unwrap();

        let membership = f.memberships.find(USER, LEVEL).await.unwrap().unwrap();
        assert_eq!(membership.status, MembershipStatus::Active);
    }

    #[tokio::test]
    async fn invoice_payment_failed_marks_past_due_and_emails() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        let e = event(
            StripeEventType::InvoicePaymentFailed,
            json!({
                "id": "in_3",
                "subscription": "sub_1",
                "amount_due": 2500,
                "last_payment_error": {"code": "card_declined", "message": "Insufficient funds"},
                "metadata": {"user_id": "42", "membership_id": "7"}
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let order = f
            .orders
            .find_by_payment_transaction_id("in_3")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::PastDue);
        assert_eq!(order.failure_message.as_deref(), Some("Insufficient funds"));
        assert!(!f.memberships.has_access(USER, LEVEL).await.unwrap());

        let sent = f.email.sent_with_template(TEMPLATE_PAYMENT_FAILED);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "member@example.com");
        assert_eq!(sent[0].message.data["amount"], json!("25.00"));
    }

    #[tokio::test]
    async fn subscription_updated_syncs_profile_end_date_and_status() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        let e = event(
            StripeEventType::CustomerSubscriptionUpdated,
            json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "current_period_end": 4102444800i64,
                "metadata": {"user_id": "42", "membership_id": "7"},
                "items": {"data": [{"price": {"id": "price_1", "unit_amount": 1500, "recurring": {"interval": "month", "interval_count": 1}}}]}
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let membership = f.memberships.find(USER, LEVEL).await.unwrap().unwrap();
        assert_eq!(membership.status, MembershipStatus::PastDue);
        assert_eq!(membership.end_date, Timestamp::from_unix_secs(4102444800));
        assert_eq!(membership.billing.billing_amount, Some(Money::from_minor_units(1500)));
        assert_eq!(membership.billing.cycle_period, Some(BillingPeriod::Month));
        assert_eq!(membership.billing.cycle_number, Some(1));
        assert_eq!(membership.billing.subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn subscription_updated_active_recovers_past_due() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        f.memberships.mark_past_due(USER, LEVEL, "x").await.unwrap();
        let e = event(
            StripeEventType::CustomerSubscriptionUpdated,
            json!({"id": "sub_1", "status": "active", "metadata": {"user_id": "42", "membership_id": "7"}}),
        );

        f.handler.handle(&e).await.unwrap();

        assert!(f.memberships.has_access(USER, LEVEL).await.unwrap());
    }

    #[tokio::test]
    async fn subscription_deleted_cancels_membership_and_last_order() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        let order = f
            .orders
            .create(
                NewOrder::new(USER, LEVEL, "stripe")
                    .with_subscription_transaction_id("sub_1")
                    .with_status(OrderStatus::Success),
            )
            .await
            .unwrap();
        let e = event(
            StripeEventType::CustomerSubscriptionDeleted,
            json!({"id": "sub_1", "status": "canceled"}),
        );

        f.handler.handle(&e).await.unwrap();

        let membership = f.memberships.find(USER, LEVEL).await.unwrap().unwrap();
        assert_eq!(membership.status, MembershipStatus::Cancelled);
        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert_eq!(f.email.sent_with_template(TEMPLATE_MEMBERSHIP_CANCELLED).len(), 1);
    }

    // ════════════════════════════════════════════════════════════════════
    // Discounts
    // ════════════════════════════════════════════════════════════════════

    async fn subscription_order(f: &Fixture, subscription_id: &str) -> Order {
        f.orders
            .create(
                NewOrder::new(USER, LEVEL, "stripe")
                    .with_subscription_transaction_id(subscription_id)
                    .with_status(OrderStatus::Success),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn invoice_finalized_records_percent_off_coupon() {
        let f = fixture();
        let order = subscription_order(&f, "sub_1").await;
        let e = event(
            StripeEventType::InvoiceFinalized,
            json!({
                "id": "in_10",
                "subscription": "sub_1",
                "discount": {"id": "di_1", "coupon": {"id": "SPRING25", "percent_off": 25.0, "duration": "once"}},
                "total_discount_amounts": [{"amount": 500}]
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.discount.discount_code.as_deref(), Some("SPRING25"));
        assert_eq!(stored.discount.discount_amount, Some(Money::from_minor_units(500)));
        assert_eq!(stored.discount.first_payment_only, Some(true));
        assert!(stored.discount.recurring_discount.is_none());
        assert_eq!(stored.status, OrderStatus::Success);
    }

    #[tokio::test]
    async fn invoice_updated_twice_keeps_one_discount() {
        let f = fixture();
        let order = subscription_order(&f, "sub_1").await;
        let e = event(
            StripeEventType::InvoiceUpdated,
            json!({
                "id": "in_11",
                "subscription": "sub_1",
                "discounts": [{"id": "di_2", "coupon": {"id": "TENOFF", "amount_off": 1000, "duration": "forever"}}],
                "total_discount_amounts": [{"amount": 1000}]
            }),
        );

        f.handler.handle(&e).await.unwrap();
        let first = f.orders.find(order.id).await.unwrap().unwrap();
        f.handler.handle(&e).await.unwrap();
        let second = f.orders.find(order.id).await.unwrap().unwrap();

        assert_eq!(second.discount.discount_code.as_deref(), Some("TENOFF"));
        assert_eq!(second.discount.discount_amount, Some(Money::from_minor_units(1000)));
        assert_eq!(first.version, second.version);
    }

    #[tokio::test]
    async fn invoice_finalized_without_order_or_discount_is_ignored() {
        let f = fixture();
        let no_order = event(
            StripeEventType::InvoiceFinalized,
            json!({"id": "in_12", "subscription": "sub_x", "total_discount_amounts": [{"amount": 300}]}),
        );
        let no_discount = event(
            StripeEventType::InvoiceFinalized,
            json!({"id": "in_13", "subscription": "sub_x"}),
        );

        for e in [no_order, no_discount] {
            assert!(matches!(
                f.handler.handle(&e).await.unwrap_err(),
                WebhookError::Ignored(_)
            ));
        }
    }

    #[tokio::test]
    async fn subscription_updated_reconciles_amount_off_coupon_and_trial() {
        let f = fixture();
        f.memberships
            .assign(USER, LEVEL, AssignOptions::default())
            .await
            .unwrap();
        let order = subscription_order(&f, "sub_1").await;
        let e = event(
            StripeEventType::CustomerSubscriptionUpdated,
            json!({
                "id": "sub_1",
                "status": "trialing",
                "trial_start": 1_700_000_000i64,
                "trial_end": 1_700_000_000i64 + 14 * 86_400 + 3_600,
                "discount": {"coupon": {"id": "FIVEOFF", "amount_off": 500, "duration": "forever"}}
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let stored = f.orders.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.discount.discount_code.as_deref(), Some("FIVEOFF"));
        assert_eq!(
            stored.discount.recurring_discount,
            Some(Discount::Amount(Money::from_minor_units(500)))
        );
        assert_eq!(stored.discount.recurring_discount_type(), Some("amount"));
        assert_eq!(stored.discount.trial_days, Some(14));
        assert!(stored.discount.first_payment_only.is_none());
    }

    #[tokio::test]
    async fn paid_invoice_carries_discount_onto_new_order() {
        let f = fixture();
        let e = event(
            StripeEventType::InvoicePaymentSucceeded,
            json!({
                "id": "in_14",
                "charge": "ch_14",
                "amount_paid": 1500,
                "metadata": {"user_id": "42", "membership_id": "7"},
                "discount": {"coupon": {"id": "HALF", "percent_off": 50.0, "duration": "repeating"}},
                "total_discount_amounts": [{"amount": 1500}]
            }),
        );

        f.handler.handle(&e).await.unwrap();

        let order = f
            .orders
            .find_by_payment_transaction_id("ch_14")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.discount.discount_code.as_deref(), Some("HALF"));
        assert_eq!(order.discount.discount_amount, Some(Money::from_minor_units(1500)));
    }

    #[tokio::test]
    async fn charge_succeeded_without_metadata_uses_order_user_and_level() {
        let f = fixture();
        f.orders
            .create(NewOrder::new(USER, LEVEL, "stripe").with_payment_transaction_id("ch_bare"))
            .await
            .unwrap();
        let e = event(StripeEventType::ChargeSucceeded, json!({"id": "ch_bare"}));

        f.handler.handle(&e).await.unwrap();

        assert!(f.memberships.has_access(USER, LEVEL).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_event_is_ignored() {
        let f = fixture();
        let e = WebhookEventBuilder::new(StripeEventType::Unknown).build();
        assert!(matches!(
            f.handler.handle(&e).await.unwrap_err(),
            WebhookError::Ignored(_)
        ));
    }

    #[tokio::test]
    async fn malformed_object_is_a_parse_error() {
        let f = fixture();
        let e = event(StripeEventType::ChargeRefunded, json!({"amount_refunded": "lots"}));
        assert!(matches!(
            f.handler.handle(&e).await.unwrap_err(),
            WebhookError::ParseError(_)
        ));
    }
}
