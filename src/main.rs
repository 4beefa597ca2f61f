use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use push_worker::{
    api::run_api_server,
    clients::{
        circuit_breaker::CircuitBreaker, directory::UserServiceClient, fcm::FcmClient,
        health::HealthChecker, log_sink::LogSink, rbmq::RabbitMqClient,
        redis::RedisIdempotencyStore, template::TemplateServiceClient,
    },
    config::{Config, DeliverySinkKind},
    traits::{DeliverySink, StatusPublisher},
    utils::shutdown_signal,
    worker::{
        consumer::ConsumerPool,
        processor::{Collaborators, JobProcessor},
    },
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<(), Error> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = Config::load()?;

    info!(
        queue = %config.push_queue_name,
        concurrency = config.worker_concurrency,
        sink = ?config.delivery_sink,
        "Starting push worker"
    );

    let store = RedisIdempotencyStore::connect(&config).await?;
    let broker = Arc::new(RabbitMqClient::connect(&config).await?);

    let breaker = Arc::new(CircuitBreaker::new(
        "push_delivery",
        config.circuit_breaker_config(),
    ));

    let sink: Arc<dyn DeliverySink> = match config.delivery_sink {
        DeliverySinkKind::Fcm => Arc::new(FcmClient::new(&config).await?),
        DeliverySinkKind::Log => {
            warn!("Using log delivery sink, notifications will not leave this process");
            Arc::new(LogSink)
        }
    };

    let status: Option<Arc<dyn StatusPublisher>> = if config.publish_status_events {
        Some(broker.clone() as Arc<dyn StatusPublisher>)
    } else {
        None
    };

    let processor = Arc::new(JobProcessor::new(
        Collaborators {
            store: Arc::new(store.clone()),
            directory: Arc::new(UserServiceClient::new(&config)?),
            templates: Arc::new(TemplateServiceClient::new(&config)?),
            sink,
            publisher: broker.clone(),
            status,
            breaker: Arc::clone(&breaker),
        },
        config.processor_settings(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let health_checker = HealthChecker::new(store, Arc::clone(&broker), breaker);
    let api_shutdown = wait_for(shutdown_rx.clone());
    let port = config.server_port;
    let api = tokio::spawn(async move {
        if let Err(e) = run_api_server(port, health_checker, api_shutdown).await {
            error!(error = %e, "Health check server failed");
        }
    });

    let pool = ConsumerPool::new(
        Arc::clone(&broker),
        processor,
        config.worker_concurrency,
        config.shutdown_grace(),
    );
    pool.run(wait_for(shutdown_rx)).await?;

    api.abort();

    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close RabbitMQ connection cleanly");
    }

    info!("Push worker stopped");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
