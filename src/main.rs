use actix_web::{web, App, HttpServer};
use clap::Parser;
use kameo::prelude::*;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod collaborators;
mod config;
mod db;
mod domain;
mod event_sourcing;
mod messaging;
mod metrics;
mod notifications;
mod utils;

use actors::{DlqActor, HealthMonitorActor, HealthStatus, NotificationDispatcher, UpdateHealth};
use api::AppState;
use collaborators::{CartService, InMemoryDirectory, PriceHistory, ScyllaDirectory, UserDirectory, VendorDirectory};
use config::{Config, NotifierBackend, StorageBackend};
use db::ScyllaOrderReadModel;
use domain::order::{InMemoryOrderReadModel, OrderCommandHandler, OrderEvent, OrderReadModel, OrderSnapshotBuilder};
use event_sourcing::{EventStore, InMemoryEventStore, ScyllaEventStore};
use messaging::RedpandaClient;
use notifications::{LogNotifier, Notifier, RedpandaNotifier};
use utils::RetryConfig;

/// Storage-dependent pieces of the service
struct Backends {
    session: Option<Arc<scylla::client::session::Session>>,
    event_store: Arc<dyn EventStore<OrderEvent>>,
    read_model: Arc<dyn OrderReadModel>,
    carts: Arc<dyn CartService>,
    vendors: Arc<dyn VendorDirectory>,
    prices: Arc<dyn PriceHistory>,
    users: Arc<dyn UserDirectory>,
}

async fn backends(config: &Config) -> anyhow::Result<Backends> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, orders are lost on restart");
            let directory = match &config.seed_file {
                Some(path) => InMemoryDirectory::load_seed_file(path).await?,
                None => {
                    tracing::warn!("No --seed-file given, carts and vendors start empty");
                    InMemoryDirectory::new()
                }
            };
            let directory = Arc::new(directory);
            Ok(Backends {
                session: None,
                event_store: Arc::new(InMemoryEventStore::new()),
                read_model: Arc::new(InMemoryOrderReadModel::new()),
                carts: directory.clone(),
                vendors: directory.clone(),
                prices: directory.clone(),
                users: directory,
            })
        }
        StorageBackend::Scylla => {
            let session = db::connect(&config.scylla_nodes, &config.keyspace).await?;
            let directory = Arc::new(ScyllaDirectory::new(session.clone()));
            Ok(Backends {
                session: Some(session.clone()),
                event_store: Arc::new(ScyllaEventStore::<OrderEvent>::new(session.clone(), "Order")),
                read_model: Arc::new(ScyllaOrderReadModel::new(session)),
                carts: directory.clone(),
                vendors: directory.clone(),
                prices: directory.clone(),
                users: directory,
            })
        }
    }
}

fn notifier(config: &Config, metrics: &Arc<metrics::Metrics>) -> anyhow::Result<Arc<dyn Notifier>> {
    match config.notifier {
        NotifierBackend::Log => Ok(Arc::new(LogNotifier)),
        NotifierBackend::Redpanda => {
            tracing::info!(brokers = %config.redpanda_brokers, topic = %config.notification_topic, "Creating Redpanda producer");
            let client = RedpandaClient::new(&config.redpanda_brokers, Some(metrics.clone()))?;
            Ok(Arc::new(RedpandaNotifier::new(Arc::new(client), config.notification_topic.clone())))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,boutique_orders=debug"))
        )
        .init();

    let config = Config::parse();
    tracing::info!("🚀 Starting boutique order service");
    tracing::info!(storage = ?config.storage, notifier = ?config.notifier, "📋 Configuration loaded");

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Storage and collaborators ===
    let backends = backends(&config).await?;

    // === 3. Notifications and dead letters ===
    let notifier = notifier(&config, &metrics)?;
    let dlq = DlqActor::spawn(DlqActor::new(backends.session.clone(), config.dlq_capacity, metrics.clone()));
    let dispatcher = NotificationDispatcher::spawn(NotificationDispatcher::new(
        notifier.clone(),
        backends.users.clone(),
        Some(Arc::new(dlq.clone())),
        metrics.clone(),
    )
    .with_retry_config(RetryConfig::aggressive()));

    let health = HealthMonitorActor::spawn(HealthMonitorActor::new(
        notifier,
        Some(dlq.clone()),
        config.health_check_interval(),
    ));
    let store_name = match config.storage {
        StorageBackend::Memory => "memory",
        StorageBackend::Scylla => "scylla",
    };
    if health
        .tell(UpdateHealth {
            component: "event_store".to_string(),
            status: HealthStatus::Healthy,
            details: Some(store_name.to_string()),
        })
        .send()
        .await
        .is_err()
    {
        tracing::warn!("Health monitor did not accept the event store status");
    }

    // === 4. Order command handler ===
    let snapshots = OrderSnapshotBuilder::new(
        backends.carts.clone(),
        backends.vendors,
        backends.prices,
        backends.users,
        config.snapshot_settings()?,
    );
    let orders = OrderCommandHandler::new(
        backends.event_store,
        backends.read_model,
        snapshots,
        backends.carts,
        metrics.clone(),
        config.order_settings()?,
    )
    .with_event_sink(Arc::new(dispatcher))
    .with_dead_letters(Arc::new(dlq.clone()));

    let state = web::Data::new(AppState {
        orders: Arc::new(orders),
        dlq: Some(dlq),
        health: Some(health),
    });
    let metrics_data = web::Data::new(metrics);

    // === 5. HTTP API ===
    tracing::info!(bind = %config.http_bind, "🌐 HTTP API listening");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics_data.clone())
            .configure(api::configure)
    })
    .bind(config.http_bind.as_str())?
    .run()
    .await?;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}
