//! PostgreSQL implementation of OrderRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::domain::billing::GatewayEnvironment;
use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, LevelId, Money, OrderId, StatusLog, Timestamp, UserId,
};
use crate::domain::order::{
    Discount, DiscountDetails, NewOrder, Order, OrderCodeGenerator, OrderStatus,
    RandomCodeGenerator,
};
use crate::ports::{OrderFilter, OrderPage, OrderQuery, OrderRepository};

const CODE_CONSTRAINT: &str = "orders_code_key";

const COLUMNS: &str = "id, code, user_id, level_id, gateway, gateway_environment, \
    payment_transaction_id, subscription_transaction_id, subtotal, tax, total, currency, status, \
    notes, refund_amount, refund_reason, refunded_at, failure_code, failure_message, failure_at, \
    discount_code, discount_amount, recurring_discount_type, recurring_discount_amount, \
    first_payment_only, trial_days, status_log, version, created_at, updated_at";

/// PostgreSQL implementation of the OrderRepository port.
pub struct PostgresOrderRepository {
    pool: PgPool,
    generator: Box<dyn OrderCodeGenerator>,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            generator: Box::new(RandomCodeGenerator),
        }
    }

    pub fn with_code_generator(mut self, generator: impl OrderCodeGenerator + 'static) -> Self {
        self.generator = Box::new(generator);
        self
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> Result<Option<Order>, DomainError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE {} = $1 ORDER BY id DESC LIMIT 1",
            COLUMNS, condition
        );
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch order", e))?
            .map(Order::try_from)
            .transpose()
    }
}

/// Database row representation of an order.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    code: String,
    user_id: i64,
    level_id: i64,
    gateway: String,
    gateway_environment: String,
    payment_transaction_id: Option<String>,
    subscription_transaction_id: Option<String>,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    currency: String,
    status: String,
    notes: Option<String>,
    refund_amount: Decimal,
    refund_reason: Option<String>,
    refunded_at: Option<DateTime<Utc>>,
    failure_code: Option<String>,
    failure_message: Option<String>,
    failure_at: Option<DateTime<Utc>>,
    discount_code: Option<String>,
    discount_amount: Option<Decimal>,
    recurring_discount_type: Option<String>,
    recurring_discount_amount: Option<Decimal>,
    first_payment_only: Option<bool>,
    trial_days: Option<i32>,
    status_log: Json<StatusLog<OrderStatus>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let invalid = |field: &str, value: &str| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid {} value: {}", field, value),
            )
        };
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|_| invalid("status", &row.status))?;
        let gateway_environment: GatewayEnvironment = row
            .gateway_environment
            .parse()
            .map_err(|_| invalid("gateway_environment", &row.gateway_environment))?;
        let currency = Currency::new(&row.currency).map_err(|_| invalid("currency", &row.currency))?;
        let recurring_discount = match (
            row.recurring_discount_type.as_deref(),
            row.recurring_discount_amount,
        ) {
            (Some("percent"), Some(amount)) => Some(Discount::Percent(amount)),
            (Some("amount"), Some(amount)) => Some(Discount::Amount(Money::new(amount))),
            (None, _) | (_, None) => None,
            (Some(other), Some(_)) => return Err(invalid("recurring_discount_type", other)),
        };
        let trial_days = row
            .trial_days
            .map(u32::try_from)
            .transpose()
            .map_err(|_| invalid("trial_days", &format!("{:?}", row.trial_days)))?;

        Ok(Order {
            id: OrderId::new(row.id),
            code: row.code,
            user_id: UserId::new(row.user_id),
            level_id: LevelId::new(row.level_id),
            gateway: row.gateway,
            gateway_environment,
            payment_transaction_id: row.payment_transaction_id,
            subscription_transaction_id: row.subscription_transaction_id,
            subtotal: Money::new(row.subtotal),
            tax: Money::new(row.tax),
            total: Money::new(row.total),
            currency,
            status,
            notes: row.notes,
            refund_amount: Money::new(row.refund_amount),
            refund_reason: row.refund_reason,
            refunded_at: row.refunded_at.map(Timestamp::from_datetime),
            failure_code: row.failure_code,
            failure_message: row.failure_message,
            failure_at: row.failure_at.map(Timestamp::from_datetime),
            discount: DiscountDetails {
                discount_code: row.discount_code,
                discount_amount: row.discount_amount.map(Money::new),
                recurring_discount,
                first_payment_only: row.first_payment_only,
                trial_days,
            },
            status_log: row.status_log.0,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            checkout: Default::default(),
        })
    }
}

fn convert(rows: Vec<OrderRow>) -> Result<Vec<Order>, DomainError> {
    rows.into_iter().map(Order::try_from).collect()
}

fn recurring_discount_amount(details: &DiscountDetails) -> Option<Decimal> {
    details.recurring_discount.map(|d| match d {
        Discount::Percent(percent) => percent,
        Discount::Amount(amount) => amount.amount(),
    })
}

fn db_trial_days(details: &DiscountDetails) -> Option<i32> {
    details.trial_days.map(|d| i32::try_from(d).unwrap_or(i32::MAX))
}

fn db_time(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, code: &str, order: &NewOrder) -> Result<Order, DomainError> {
        // The id is assigned by the sequence.
        let mut created = Order::from_new(OrderId::new(0), code.to_string(), order.clone());

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO orders (
                code, user_id, level_id, gateway, gateway_environment, payment_transaction_id,
                subscription_transaction_id, subtotal, tax, total, currency, status, notes,
                refund_amount, discount_code, discount_amount, recurring_discount_type,
                recurring_discount_amount, first_payment_only, trial_days, status_log, version,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24
            )
            RETURNING id
            "#,
        )
        .bind(&created.code)
        .bind(created.user_id.as_i64())
        .bind(created.level_id.as_i64())
        .bind(&created.gateway)
        .bind(created.gateway_environment.as_str())
        .bind(&created.payment_transaction_id)
        .bind(&created.subscription_transaction_id)
        .bind(created.subtotal.amount())
        .bind(created.tax.amount())
        .bind(created.total.amount())
        .bind(created.currency.as_str())
        .bind(created.status.as_str())
        .bind(&created.notes)
        .bind(created.refund_amount.amount())
        .bind(&created.discount.discount_code)
        .bind(created.discount.discount_amount.map(|m| m.amount()))
        .bind(created.discount.recurring_discount_type())
        .bind(recurring_discount_amount(&created.discount))
        .bind(created.discount.first_payment_only)
        .bind(db_trial_days(&created.discount))
        .bind(Json(&created.status_log))
        .bind(created.version)
        .bind(created.created_at.as_datetime())
        .bind(created.updated_at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(CODE_CONSTRAINT) {
                    return DomainError::new(
                        ErrorCode::DuplicateOrderCode,
                        format!("Order code {} already exists", code),
                    );
                }
            }
            DomainError::database("Failed to insert order", e)
        })?;

        created.id = OrderId::new(id);
        tracing::debug!(order_id = id, order_code = %code, "Order inserted");
        Ok(created)
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch order", e))?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Order>, DomainError> {
        self.fetch_one_where("code", code).await
    }

    async fn find_by_payment_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        self.fetch_one_where("payment_transaction_id", transaction_id)
            .await
    }

    async fn find_last_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        self.fetch_one_where("subscription_transaction_id", subscription_id)
            .await
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        filter: &OrderFilter,
    ) -> Result<Vec<Order>, DomainError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = $1 \
             AND (cardinality($2::text[]) = 0 OR status = ANY($2)) \
             AND ($3::text IS NULL OR gateway = $3) \
             AND ($4::bigint IS NULL OR level_id = $4) \
             ORDER BY id DESC LIMIT $5",
            COLUMNS
        );
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id.as_i64())
            .bind(statuses)
            .bind(&filter.gateway)
            .bind(filter.level_id.map(|l| l.as_i64()))
            .bind(filter.limit.map(i64::from))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to fetch user orders", e))?;
        convert(rows)
    }

    async fn paginate(&self, query: &OrderQuery) -> Result<OrderPage, DomainError> {
        let (page, per_page) = query.normalized();
        let condition = "($1::bigint IS NULL OR user_id = $1) \
             AND ($2::text IS NULL OR status = $2) \
             AND ($3::text IS NULL OR gateway = $3)";

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM orders WHERE {}",
            condition
        ))
        .bind(query.user_id.map(|u| u.as_i64()))
        .bind(query.status.map(|s| s.as_str()))
        .bind(&query.gateway)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to count orders", e))?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE {} ORDER BY id DESC LIMIT $4 OFFSET $5",
            COLUMNS, condition
        ))
        .bind(query.user_id.map(|u| u.as_i64()))
        .bind(query.status.map(|s| s.as_str()))
        .bind(&query.gateway)
        .bind(i64::from(per_page))
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to fetch orders page", e))?;

        Ok(OrderPage {
            orders: convert(rows)?,
            total: u64::try_from(total).unwrap_or_default(),
            page,
            per_page,
        })
    }

    async fn compare_and_swap(&self, order: &Order) -> Result<Order, DomainError> {
        let sql = format!(
            r#"
            UPDATE orders SET
                gateway_environment = $3,
                payment_transaction_id = $4,
                subscription_transaction_id = $5,
                subtotal = $6,
                tax = $7,
                total = $8,
                status = $9,
                notes = $10,
                refund_amount = $11,
                refund_reason = $12,
                refunded_at = $13,
                failure_code = $14,
                failure_message = $15,
                failure_at = $16,
                discount_code = $17,
                discount_amount = $18,
                recurring_discount_type = $19,
                recurring_discount_amount = $20,
                first_payment_only = $21,
                trial_days = $22,
                status_log = $23,
                updated_at = $24,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.id.as_i64())
            .bind(order.version)
            .bind(order.gateway_environment.as_str())
            .bind(&order.payment_transaction_id)
            .bind(&order.subscription_transaction_id)
            .bind(order.subtotal.amount())
            .bind(order.tax.amount())
            .bind(order.total.amount())
            .bind(order.status.as_str())
            .bind(&order.notes)
            .bind(order.refund_amount.amount())
            .bind(&order.refund_reason)
            .bind(db_time(order.refunded_at))
            .bind(&order.failure_code)
            .bind(&order.failure_message)
            .bind(db_time(order.failure_at))
            .bind(&order.discount.discount_code)
            .bind(order.discount.discount_amount.map(|m| m.amount()))
            .bind(order.discount.recurring_discount_type())
            .bind(recurring_discount_amount(&order.discount))
            .bind(order.discount.first_payment_only)
            .bind(db_trial_days(&order.discount))
            .bind(Json(&order.status_log))
            .bind(order.updated_at.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to update order", e))?;

        match row {
            Some(row) => Order::try_from(row),
            None if self.find(order.id).await?.is_some() => Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!("Order {} was modified concurrently", order.id),
            )),
            None => Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order {} not found", order.id),
            )),
        }
    }

    async fn code_exists(&self, code: &str) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM orders WHERE code = $1)")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to check order code", e))
    }

    fn code_generator(&self) -> &dyn OrderCodeGenerator {
        self.generator.as_ref()
    }
}
