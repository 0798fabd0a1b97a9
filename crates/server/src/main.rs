//! Muchio Server - order and checkout backend.
//!
//! This binary serves the order API and the Stripe webhook on port 3001.
//!
//! # Architecture
//!
//! - Axum web framework
//! - Stripe for hosted checkout; completed sessions arrive as signed webhooks
//! - `PostgreSQL` for customers, stock and orders
//! - SMTP for order confirmation and shipment emails
//! - A background task that settles stock lines left pending

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use muchio_server::config::{LogFormat, ServerConfig};
use muchio_server::db::{self, PgStore, Store};
use muchio_server::services::{
    CheckoutSettings, LogNotifier, Notifier, SmtpNotifier, spawn_reconciler,
};
use muchio_server::state::AppState;
use muchio_server::stripe::{PaymentProvider, StripeClient};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the tracing subscriber.
///
/// Defaults to info level for our crate if `RUST_LOG` is not set.
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "muchio_server=info,tower_http=debug".into());

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p muchio-cli -- migrate

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let payments: Arc<dyn PaymentProvider> =
        Arc::new(StripeClient::new(&config.stripe).expect("Failed to create Stripe client"));

    let notifier: Arc<dyn Notifier> = match &config.email {
        Some(email) => Arc::new(SmtpNotifier::new(email).expect("Failed to create SMTP transport")),
        None => {
            tracing::warn!("SMTP not configured, customer emails will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let _reconciler = config.reconcile_interval.map(|period| {
        spawn_reconciler(
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.shop_name.clone(),
            period,
        )
    });

    let state = AppState::new(
        store,
        payments,
        notifier,
        CheckoutSettings {
            webhook_secret: config.stripe.webhook_secret.clone(),
            webhook_tolerance: config.stripe.webhook_tolerance,
            shop_name: config.shop_name.clone(),
        },
    );

    let app = muchio_server::app(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
