//! KHM Billing server entry point.

use std::error::Error;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use khm_billing::adapters::email::TracingEmailService;
use khm_billing::adapters::http::{webhook_router, WebhookAppState};
use khm_billing::adapters::memory::InMemoryIdempotencyStore;
use khm_billing::adapters::postgres::{
    PostgresIdempotencyStore, PostgresMembershipRepository, PostgresOrderRepository,
    PostgresUserDirectory, MIGRATOR,
};
use khm_billing::adapters::redis::RedisIdempotencyStore;
use khm_billing::adapters::stripe::{StripeWebhookVerifier, GATEWAY_NAME};
use khm_billing::application::{
    MemberNotifier, MembershipSweepHandler, StripeEventHandler, SweepSettings, WebhookProcessor,
};
use khm_billing::config::{AppConfig, BillingConfig, IdempotencyBackend, RedisConfig};
use khm_billing::domain::billing::GatewayEnvironment;
use khm_billing::domain::foundation::Timestamp;
use khm_billing::ports::IdempotencyStore;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    let (json, human) = if config.is_production() {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(human)
        .init();
}

async fn idempotency_store(
    billing: &BillingConfig,
    redis: &RedisConfig,
    pool: &sqlx::PgPool,
) -> Result<Arc<dyn IdempotencyStore>, Box<dyn Error>> {
    let store: Arc<dyn IdempotencyStore> = match billing.idempotency_backend {
        IdempotencyBackend::Postgres => Arc::new(PostgresIdempotencyStore::new(pool.clone())),
        IdempotencyBackend::Redis => {
            let url = redis.url.as_deref().unwrap_or_default();
            let client = redis::Client::open(url)?;
            let conn = tokio::time::timeout(
                redis.timeout(),
                client.get_multiplexed_tokio_connection(),
            )
            .await??;
            Arc::new(RedisIdempotencyStore::new(conn, billing.retention_days))
        }
        IdempotencyBackend::Memory => {
            tracing::warn!("In-memory idempotency store: duplicates are only caught per process");
            Arc::new(InMemoryIdempotencyStore::new())
        }
    };
    tracing::info!(backend = ?billing.idempotency_backend, "Idempotency store ready");
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // 1. Configuration and tracing
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        gateway_environment = config.payment.environment.as_str(),
        "Starting KHM billing"
    );

    // 2. Database
    tracing::info!(url = %config.database.redacted_url(), "Connecting to database");
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        MIGRATOR.run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    // 3. Adapters
    let orders = Arc::new(PostgresOrderRepository::new(pool.clone()));
    let memberships = Arc::new(PostgresMembershipRepository::new(pool.clone()));
    let users = Arc::new(PostgresUserDirectory::new(pool.clone()));
    let email = Arc::new(
        TracingEmailService::new(&config.email.from_address)
            .with_from_name(&config.email.from_name),
    );
    let store = idempotency_store(&config.billing, &config.redis, &pool).await?;
    let notifier = MemberNotifier::new(email, users);

    // 4. Webhook intake
    let require_livemode = config.payment.environment == GatewayEnvironment::Live;
    let verifier = StripeWebhookVerifier::new()
        .with_tolerance_secs(config.payment.webhook_tolerance_secs)
        .with_require_livemode(require_livemode);
    let events = StripeEventHandler::new(orders, memberships.clone(), notifier.clone())
        .with_environment(config.payment.environment);
    let processor = WebhookProcessor::new(
        GATEWAY_NAME,
        config.payment.stripe_webhook_secret.clone(),
        Arc::new(verifier),
        store.clone(),
        Arc::new(events),
    );

    // 5. Membership sweep
    if let Some(period) = config.billing.sweep_interval() {
        let sweep = MembershipSweepHandler::new(
            memberships,
            store,
            notifier,
            SweepSettings {
                expiry_warning_days: config.billing.expiry_warning_days,
                retention_days: config.billing.retention_days,
            },
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = sweep.handle(Timestamp::now()).await {
                    tracing::error!(error = %e, "Membership sweep failed");
                }
            }
        });
    }

    // 6. HTTP server
    let app = webhook_router(
        WebhookAppState::new(Arc::new(processor)),
        config.server.request_timeout(),
    );
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening for webhooks");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server shut down gracefully");
    Ok(())
}
