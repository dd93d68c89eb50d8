//! In-memory order repository.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, UserId};
use crate::domain::order::{CheckoutContext, NewOrder, Order, OrderCodeGenerator, RandomCodeGenerator};
use crate::ports::{OrderFilter, OrderPage, OrderQuery, OrderRepository};

pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<Order>>,
    next_id: AtomicI64,
    injected_conflicts: AtomicUsize,
    generator: Box<dyn OrderCodeGenerator>,
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::with_code_generator(RandomCodeGenerator)
    }
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code_generator(generator: impl OrderCodeGenerator + 'static) -> Self {
        Self {
            orders: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(0),
            injected_conflicts: AtomicUsize::new(0),
            generator: Box::new(generator),
        }
    }

    /// Makes the next `count` compare-and-swap calls lose their race.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Every stored order, oldest first.
    pub async fn all(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn find_where(&self, predicate: impl Fn(&Order) -> bool) -> Option<Order> {
        self.orders
            .read()
            .await
            .iter()
            .filter(|o| predicate(o))
            .max_by_key(|o| o.id)
            .cloned()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, code: &str, order: &NewOrder) -> Result<Order, DomainError> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.code == code) {
            return Err(DomainError::new(
                ErrorCode::DuplicateOrderCode,
                format!("Order code {} already exists", code),
            ));
        }
        let id = OrderId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let created = Order::from_new(id, code.to_string(), order.clone());

        // Checkout context is transient and never stored.
        let mut stored = created.clone();
        stored.checkout = CheckoutContext::default();
        orders.push(stored);

        Ok(created)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.find_where(|o| o.id == id).await)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Order>, DomainError> {
        Ok(self.find_where(|o| o.code == code).await)
    }

    async fn find_by_payment_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        Ok(self
            .find_where(|o| o.payment_transaction_id.as_deref() == Some(transaction_id))
            .await)
    }

    async fn find_last_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        Ok(self
            .find_where(|o| o.subscription_transaction_id.as_deref() == Some(subscription_id))
            .await)
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, DomainError> {
        let mut found: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.user_id == user_id && filter.matches(o))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = filter.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }

    async fn paginate(&self, query: &OrderQuery) -> Result<OrderPage, DomainError> {
        let (page, per_page) = query.normalized();
        let mut matching: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(per_page as usize)
            .collect();

        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    async fn compare_and_swap(&self, order: &Order) -> Result<Order, DomainError> {
        if self.take_injected_conflict() {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                "Injected conflict",
            ));
        }
        let mut orders = self.orders.write().await;
        let stored = orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or_else(|| DomainError::new(ErrorCode::OrderNotFound, "Order not found"))?;
        if stored.version != order.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!(
                    "Order {} is at version {}, expected {}",
                    order.id, stored.version, order.version
                ),
            ));
        }
        let mut next = order.clone();
        next.version += 1;
        next.checkout = CheckoutContext::default();
        *stored = next.clone();
        Ok(next)
    }

    async fn code_exists(&self, code: &str) -> Result<bool, DomainError> {
        Ok(self.orders.read().await.iter().any(|o| o.code == code))
    }

    fn code_generator(&self) -> &dyn OrderCodeGenerator {
        self.generator.as_ref()
    }
}
