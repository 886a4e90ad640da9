//! MarketSync server binary.
//!
//! Loads configuration from the environment, wires the Postgres-backed
//! adapters to the application services, starts the background sweeps, and
//! serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use marketsync::adapters::http::{app_router, AppState};
use marketsync::adapters::postgres::{
    PostgresAccountRepository, PostgresAuditSink, PostgresItemStore, PostgresListingRepository,
};
use marketsync::adapters::{
    registry_from_config, DedupSweep, InMemoryDedupStore, InProcessJobQueue, LogNotifier,
    TokioScheduler,
};
use marketsync::application::{
    AccountService, AuditRetentionSweep, Auditor, PublishProcessor, SyncProcessor, TokenMonitor,
    WebhookRouter,
};
use marketsync::config::AppConfig;
use marketsync::domain::crypto::{
    validate_key_configuration, CredentialCipher, SignedStateCodec,
};
use marketsync::ports::{JobQueue, Scheduler, SyncJob};

const AUDIT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;
    validate_key_configuration(&config.security.encryption_key, config.is_production())?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Connected to database");

    let accounts = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let listings = Arc::new(PostgresListingRepository::new(pool.clone()));
    let items = Arc::new(PostgresItemStore::new(pool.clone()));
    let audit_sink = Arc::new(PostgresAuditSink::new(pool.clone()));
    let auditor = Auditor::new(audit_sink.clone());

    let cipher = Arc::new(CredentialCipher::new(&config.security.encryption_key)?);
    let state_codec = Arc::new(SignedStateCodec::new(config.security.state_signing_secret()));
    let registry = Arc::new(registry_from_config(&config.marketplaces));

    let account_service = Arc::new(AccountService::new(
        accounts.clone(),
        registry,
        cipher,
        state_codec,
        auditor.clone(),
    ));

    let publish = Arc::new(PublishProcessor::new(
        listings.clone(),
        items.clone(),
        accounts.clone(),
        account_service.clone(),
        auditor.clone(),
    ));
    let sync = Arc::new(SyncProcessor::new(
        listings.clone(),
        items.clone(),
        account_service.clone(),
        auditor.clone(),
    ));
    let queue = Arc::new(InProcessJobQueue::new(publish, sync));

    let dedup = Arc::new(InMemoryDedupStore::new(
        config.sweeps.dedup_max_entries,
        config.sweeps.dedup_ttl(),
    ));
    let webhooks = Arc::new(
        WebhookRouter::new(dedup.clone(), listings.clone(), auditor.clone())
            .with_configured_endpoints(&config.marketplaces),
    );

    // Background sweeps. The scheduler aborts its tasks on drop, so it must
    // outlive the server loop.
    let scheduler = TokioScheduler::new();
    scheduler
        .register(
            "token-monitor",
            config.sweeps.monitor_interval(),
            Arc::new(TokenMonitor::new(
                accounts.clone(),
                account_service.clone(),
                Arc::new(LogNotifier),
                auditor.clone(),
            )),
        )
        .await;
    scheduler
        .register(
            "audit-retention",
            AUDIT_SWEEP_INTERVAL,
            Arc::new(AuditRetentionSweep::new(
                audit_sink.clone(),
                config.sweeps.audit_retention_days,
            )),
        )
        .await;
    scheduler
        .register(
            "dedup-sweep",
            config.sweeps.dedup_ttl(),
            Arc::new(DedupSweep::new(dedup.clone())),
        )
        .await;
    queue
        .register_recurring_sync(
            "stale-listing-sync",
            config.sweeps.sync_interval(),
            SyncJob::AllStale {
                org_id: None,
                stale_after: config.sweeps.sync_stale_after(),
            },
        )
        .await?;

    let state = AppState {
        accounts: account_service,
        webhooks,
        queue,
        auditor,
        public_base_url: config.server.public_base_url.clone(),
    };

    let app = app_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id());

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
