//! Order aggregate.
//!
//! Orders are created at checkout and mutated by gateway responses and
//! webhook events. They are never physically removed; `delete` is a
//! status transition.

use crate::domain::billing::GatewayEnvironment;
use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, LevelId, Money, OrderId, StateMachine, StatusLog, Timestamp,
    UserId, ValidationError,
};
use crate::domain::membership::TransitionOutcome;
use serde::{Deserialize, Serialize};

use super::{CheckoutContext, DiscountDetails, OrderStatus};

/// Note recorded when an order is soft-deleted.
pub const DELETED_NOTE: &str = "Order deleted";

/// Result of recording a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    /// Some of the total remains paid.
    Partial,
    /// The refunded total reached the order total; status is `Refunded`.
    Full,
}

/// Everything needed to create an order; code and id are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub code: Option<String>,
    pub user_id: UserId,
    pub level_id: LevelId,
    pub gateway: String,
    pub gateway_environment: GatewayEnvironment,
    pub payment_transaction_id: Option<String>,
    pub subscription_transaction_id: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: Currency,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub discount: DiscountDetails,
    pub checkout: CheckoutContext,
}

impl NewOrder {
    /// A pending order with zero amounts in the default currency.
    pub fn new(user_id: UserId, level_id: LevelId, gateway: impl Into<String>) -> Self {
        Self {
            code: None,
            user_id,
            level_id,
            gateway: gateway.into(),
            gateway_environment: GatewayEnvironment::default(),
            payment_transaction_id: None,
            subscription_transaction_id: None,
            subtotal: Money::ZERO,
            tax: Money::ZERO,
            total: Money::ZERO,
            currency: Currency::default(),
            status: OrderStatus::Pending,
            notes: None,
            discount: DiscountDetails::default(),
            checkout: CheckoutContext::default(),
        }
    }

    /// Sets subtotal and tax; total is their sum.
    pub fn with_amounts(mut self, subtotal: Money, tax: Money) -> Self {
        self.subtotal = subtotal;
        self.tax = tax;
        self.total = subtotal + tax;
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_environment(mut self, environment: GatewayEnvironment) -> Self {
        self.gateway_environment = environment;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_payment_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.payment_transaction_id = Some(id.into());
        self
    }

    pub fn with_subscription_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_transaction_id = Some(id.into());
        self
    }

    pub fn with_discount(mut self, discount: DiscountDetails) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_checkout(mut self, checkout: CheckoutContext) -> Self {
        self.checkout = checkout;
        self
    }

    /// Rejects negative amounts and a total that is not subtotal plus tax.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, amount) in [
            ("subtotal", self.subtotal),
            ("tax", self.tax),
            ("total", self.total),
        ] {
            if amount.is_negative() {
                return Err(ValidationError::negative(field, amount));
            }
        }
        if self.subtotal + self.tax != self.total {
            return Err(ValidationError::invalid_format(
                "total",
                format!("{} is not subtotal {} plus tax {}", self.total, self.subtotal, self.tax),
            ));
        }
        if self.gateway.trim().is_empty() {
            return Err(ValidationError::empty_field("gateway"));
        }
        Ok(())
    }
}

/// Typed patch of the mutable order fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub payment_transaction_id: Option<String>,
    pub subscription_transaction_id: Option<String>,
    pub subtotal: Option<Money>,
    pub tax: Option<Money>,
    pub total: Option<Money>,
    pub notes: Option<String>,
    pub gateway_environment: Option<GatewayEnvironment>,
    /// Merged into the stored details field by field.
    pub discount: DiscountDetails,
}

/// Order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Public identifier, 10 uppercase alphanumerics.
    pub code: String,
    pub user_id: UserId,
    /// The membership level purchased.
    pub level_id: LevelId,
    pub gateway: String,
    pub gateway_environment: GatewayEnvironment,
    pub payment_transaction_id: Option<String>,
    pub subscription_transaction_id: Option<String>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: Currency,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub refund_amount: Money,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<Timestamp>,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub failure_at: Option<Timestamp>,
    pub discount: DiscountDetails,
    pub status_log: StatusLog<OrderStatus>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    #[serde(skip)]
    pub checkout: CheckoutContext,
}

impl Order {
    /// Materializes a new order once storage has assigned id and code.
    pub fn from_new(id: OrderId, code: String, new: NewOrder) -> Self {
        let now = Timestamp::now();
        let mut status_log = StatusLog::new();
        status_log.record(None, new.status, Some("Order created".to_string()));
        let mut discount = new
            .checkout
            .coupon
            .as_ref()
            .map(DiscountDetails::from_coupon)
            .unwrap_or_default();
        discount.merge(&new.discount);

        Self {
            id,
            code,
            user_id: new.user_id,
            level_id: new.level_id,
            gateway: new.gateway,
            gateway_environment: new.gateway_environment,
            payment_transaction_id: new.payment_transaction_id,
            subscription_transaction_id: new.subscription_transaction_id,
            subtotal: new.subtotal,
            tax: new.tax,
            total: new.total,
            currency: new.currency,
            status: new.status,
            notes: new.notes,
            refund_amount: Money::ZERO,
            refund_reason: None,
            refunded_at: None,
            failure_code: None,
            failure_message: None,
            failure_at: None,
            discount,
            status_log,
            version: 1,
            created_at: now,
            updated_at: now,
            checkout: new.checkout,
        }
    }

    /// Moves to `target`, logging `note` and appending it to the notes.
    ///
    /// Re-applying the current status changes nothing.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, DomainError> {
        if self.status == target {
            return Ok(TransitionOutcome::Unchanged);
        }
        let from = self.status;
        let next = from.transition_to(target)?;

        self.status = next;
        self.status_log
            .record(Some(from), next, note.map(str::to_string));
        if let Some(note) = note {
            self.append_note(note);
        }
        self.updated_at = Timestamp::now();
        Ok(TransitionOutcome::Applied)
    }

    /// Records a successful payment and marks the order paid.
    pub fn mark_paid(
        &mut self,
        transaction_id: Option<&str>,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, DomainError> {
        if self.status != OrderStatus::Success {
            self.status.transition_to(OrderStatus::Success)?;
        }
        if let Some(id) = transaction_id {
            self.payment_transaction_id = Some(id.to_string());
        }
        self.transition(OrderStatus::Success, note)
    }

    /// Adds a refund to the running total.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for a non-positive amount or one exceeding
    ///   what remains refundable
    /// - `InvalidStateTransition` unless the order is paid
    pub fn record_refund(
        &mut self,
        amount: Money,
        reason: Option<&str>,
        at: Timestamp,
    ) -> Result<RefundOutcome, DomainError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(DomainError::validation(
                "refund_amount",
                format!("Refund amount must be positive, got {}", amount),
            ));
        }
        if self.status != OrderStatus::Success {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot refund an order in status {}", self.status),
            )
            .with_detail("from", self.status.as_str())
            .with_detail("to", OrderStatus::Refunded.as_str()));
        }
        let remaining = self.remaining_refundable();
        if amount > remaining {
            return Err(DomainError::validation(
                "refund_amount",
                format!("Refund {} exceeds refundable balance {}", amount, remaining),
            ));
        }

        self.refund_amount = self.refund_amount + amount;
        self.refund_reason = reason.map(str::to_string);
        self.refunded_at = Some(at);
        self.updated_at = Timestamp::now();

        if self.refund_amount >= self.total {
            self.transition(OrderStatus::Refunded, reason.or(Some("Order refunded")))?;
            Ok(RefundOutcome::Full)
        } else {
            Ok(RefundOutcome::Partial)
        }
    }

    /// Stores the latest payment failure.
    pub fn record_failure(&mut self, code: &str, message: &str, at: Timestamp) {
        self.failure_code = Some(code.to_string());
        self.failure_message = Some(message.to_string());
        self.failure_at = Some(at);
        self.updated_at = Timestamp::now();
    }

    /// Applies every field present in `update`.
    pub fn apply_update(&mut self, update: OrderUpdate) -> Result<(), ValidationError> {
        if let Some(id) = update.payment_transaction_id {
            self.payment_transaction_id = Some(id);
        }
        if let Some(id) = update.subscription_transaction_id {
            self.subscription_transaction_id = Some(id);
        }
        if let Some(subtotal) = update.subtotal {
            self.subtotal = subtotal;
        }
        if let Some(tax) = update.tax {
            self.tax = tax;
        }
        self.total = update.total.unwrap_or(self.subtotal + self.tax);
        if self.total.is_negative() {
            return Err(ValidationError::negative("total", self.total));
        }
        if let Some(notes) = update.notes {
            self.notes = Some(notes);
        }
        if let Some(environment) = update.gateway_environment {
            self.gateway_environment = environment;
        }
        self.discount.merge(&update.discount);
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Merges provider discount details into the order.
    pub fn apply_discount(&mut self, details: &DiscountDetails) -> TransitionOutcome {
        if !self.discount.merge(details) {
            return TransitionOutcome::Unchanged;
        }
        self.updated_at = Timestamp::now();
        TransitionOutcome::Applied
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note.to_string(),
        });
        self.updated_at = Timestamp::now();
    }

    pub fn remaining_refundable(&self) -> Money {
        self.total - self.refund_amount
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.status == OrderStatus::Refunded
    }
}
