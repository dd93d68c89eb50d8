//! Order repository port.
//!
//! Owns order records, status transitions and refund bookkeeping.
//! Required methods are storage primitives; everything else is provided on
//! top of them with the same compare-and-swap retry loop as memberships.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, LevelId, Money, OrderId, Timestamp, UserId};
use crate::domain::membership::TransitionOutcome;
use crate::domain::order::{
    NewOrder, Order, OrderCodeGenerator, OrderStatus, OrderUpdate, DELETED_NOTE, MAX_CODE_ATTEMPTS,
};

use super::membership_repository::MAX_CAS_RETRIES;

/// Default page size for [`OrderQuery`].
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Maximum page size for [`OrderQuery`].
pub const MAX_PER_PAGE: u32 = 100;

/// A change applied to a freshly read order.
pub type OrderChange<'a> =
    dyn Fn(&mut Order) -> Result<TransitionOutcome, DomainError> + Send + Sync + 'a;

/// Filter for a user's orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Empty means any status.
    pub statuses: Vec<OrderStatus>,
    pub gateway: Option<String>,
    pub level_id: Option<LevelId>,
    pub limit: Option<u32>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&order.status))
            && self.gateway.as_ref().map_or(true, |g| *g == order.gateway)
            && self.level_id.map_or(true, |l| l == order.level_id)
    }
}

/// Page request over all orders, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub gateway: Option<String>,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            status: None,
            gateway: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl OrderQuery {
    /// Page and page size clamped to valid values.
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PER_PAGE))
    }

    pub fn offset(&self) -> u64 {
        let (page, per_page) = self.normalized();
        u64::from(page - 1) * u64::from(per_page)
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |u| u == order.user_id)
            && self.status.map_or(true, |s| s == order.status)
            && self.gateway.as_ref().map_or(true, |g| *g == order.gateway)
    }
}

/// One page of orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl OrderPage {
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}

/// Repository port for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts an order under `code`.
    ///
    /// # Errors
    ///
    /// - `DuplicateOrderCode` if the code is taken
    async fn insert(&self, code: &str, order: &NewOrder) -> Result<Order, DomainError>;

    async fn find(&self, id: OrderId) -> Result<Option<Order>, DomainError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Order>, DomainError>;

    async fn find_by_payment_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Order>, DomainError>;

    /// Most recent order (highest id) of a subscription.
    async fn find_last_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Order>, DomainError>;

    /// A user's orders, newest first.
    async fn find_by_user(
        &self,
        user_id: UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, DomainError>;

    async fn paginate(&self, query: &OrderQuery) -> Result<OrderPage, DomainError>;

    /// Persists `order` if the stored version still equals its version.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the version moved
    /// - `OrderNotFound` if the row is gone
    async fn compare_and_swap(&self, order: &Order) -> Result<Order, DomainError>;

    async fn code_exists(&self, code: &str) -> Result<bool, DomainError>;

    fn code_generator(&self) -> &dyn OrderCodeGenerator;

    /// Proposes a code not yet present in storage.
    ///
    /// # Errors
    ///
    /// - `DuplicateOrderCode` after [`MAX_CODE_ATTEMPTS`] collisions
    async fn generate_code(&self) -> Result<String, DomainError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = self.code_generator().generate();
            if !self.code_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(code = %candidate, "Order code collision, regenerating");
        }
        Err(DomainError::new(
            ErrorCode::DuplicateOrderCode,
            format!("No unique order code after {} attempts", MAX_CODE_ATTEMPTS),
        ))
    }

    /// Validates and stores a new order, generating its code when absent.
    ///
    /// A generated code that loses an insert race is regenerated.
    async fn create(&self, order: NewOrder) -> Result<Order, DomainError> {
        order.validate()?;
        if let Some(code) = order.code.clone() {
            return self.insert(&code, &order).await;
        }

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = self.generate_code().await?;
            match self.insert(&code, &order).await {
                Err(err) if err.code == ErrorCode::DuplicateOrderCode => continue,
                result => return result,
            }
        }
        Err(DomainError::new(
            ErrorCode::DuplicateOrderCode,
            "Order code kept colliding on insert",
        ))
    }

    /// Re-reads the order and applies `change`, retrying lost races.
    async fn modify(&self, id: OrderId, change: &OrderChange<'_>) -> Result<Order, DomainError> {
        let mut attempt = 1;
        loop {
            let mut order = self.find(id).await?.ok_or_else(|| not_found(id))?;

            if !change(&mut order)?.is_applied() {
                return Ok(order);
            }

            match self.compare_and_swap(&order).await {
                Err(err)
                    if err.code == ErrorCode::ConcurrentModification
                        && attempt < MAX_CAS_RETRIES =>
                {
                    tracing::debug!(order_id = %id, attempt, "Order write lost a race, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, DomainError> {
        self.modify(id, &|o| {
            o.apply_update(update.clone())?;
            Ok(TransitionOutcome::Applied)
        })
        .await
    }

    /// Moves the order to `status`; re-applying the current status is a no-op.
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        notes: Option<&str>,
    ) -> Result<Order, DomainError> {
        self.modify(id, &|o| o.transition(status, notes)).await
    }

    /// Appends a line to the order notes.
    async fn update_notes(&self, id: OrderId, note: &str) -> Result<Order, DomainError> {
        self.modify(id, &|o| {
            o.append_note(note);
            Ok(TransitionOutcome::Applied)
        })
        .await
    }

    /// Adds to the refunded total; a full refund moves the order to `Refunded`.
    async fn record_refund(
        &self,
        id: OrderId,
        amount: Money,
        reason: Option<&str>,
        at: Timestamp,
    ) -> Result<Order, DomainError> {
        self.modify(id, &|o| {
            o.record_refund(amount, reason, at)?;
            Ok(TransitionOutcome::Applied)
        })
        .await
    }

    async fn record_failure(
        &self,
        id: OrderId,
        code: &str,
        message: &str,
        at: Timestamp,
    ) -> Result<Order, DomainError> {
        self.modify(id, &|o| {
            o.record_failure(code, message, at);
            Ok(TransitionOutcome::Applied)
        })
        .await
    }

    /// Soft delete.
    async fn delete(&self, id: OrderId) -> Result<Order, DomainError> {
        self.update_status(id, OrderStatus::Deleted, Some(DELETED_NOTE))
            .await
    }
}

fn not_found(id: OrderId) -> DomainError {
    DomainError::new(ErrorCode::OrderNotFound, format!("Order {} not found", id))
        .with_detail("order_id", id.to_string())
}
