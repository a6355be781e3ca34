use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mention_service::listener::{EventListener, KafkaStoryListener};
use mention_service::{
    http, BrandSet, Config, MentionPipeline, MentionStore, PgMentionStore, Processor, Shutdown,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mention_service=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    info!("Starting mention-service");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.database.log_config();
    info!(
        brokers = %config.kafka.brokers,
        topic = %config.kafka.topic,
        workers = config.dispatcher.workers,
        capacity = config.dispatcher.capacity,
        brands = config.brands.len(),
        http_port = config.http_port,
        "Configuration loaded"
    );

    // Store and bus are verified up front; either being unreachable is fatal.
    let pg_pool = db_pool::create_pool(config.database.clone())
        .await
        .context("Failed to connect to database")?;

    let pg_store = PgMentionStore::new(pg_pool.clone());
    pg_store
        .migrate()
        .await
        .context("Failed to run database migrations")?;
    let store: Arc<dyn MentionStore> = Arc::new(pg_store);

    let listener: Arc<dyn EventListener> = Arc::new(
        KafkaStoryListener::connect(config.kafka.clone())
            .await
            .context("Failed to connect to Kafka")?,
    );

    let brands = Arc::new(BrandSet::new(&config.brands));
    info!(brands = brands.len(), "Brand set loaded");

    let (shutdown_tx, shutdown) = Shutdown::channel();

    let processor = Processor::new(brands, store).with_retry(config.write_retry);
    let pipeline = MentionPipeline::new(listener, processor, config.dispatcher, shutdown);
    let delivery = pipeline.start();

    let dispatcher = Arc::clone(pipeline.dispatcher());
    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let http_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(Arc::clone(&dispatcher)))
            .configure(http::configure)
    })
    .bind(&http_addr)
    .with_context(|| format!("Failed to bind HTTP server to {}", http_addr))?
    .disable_signals()
    .run();
    let http_handle = http_server.handle();
    let http_task = tokio::spawn(http_server);
    info!("HTTP server listening on http://{}", http_addr);

    info!("mention-service is running");

    run_until_shutdown(shutdown_tx, delivery, pipeline, http_handle, http_task).await;

    pg_pool.close().await;
    info!("mention-service stopped");
    Ok(())
}

/// Wait for a signal (or the delivery loop dying), then drain in order:
/// stop intake, finish queued work, stop HTTP.
async fn run_until_shutdown(
    shutdown_tx: watch::Sender<bool>,
    mut delivery: tokio::task::JoinHandle<Result<(), mention_service::ListenerError>>,
    pipeline: MentionPipeline,
    http_handle: actix_web::dev::ServerHandle,
    http_task: tokio::task::JoinHandle<std::io::Result<()>>,
) {
    let delivery_finished = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            false
        }
        result = &mut delivery => {
            log_delivery_result(result);
            true
        }
    };

    let _ = shutdown_tx.send(true);

    if !delivery_finished {
        log_delivery_result(delivery.await);
    }

    info!(
        queued = pipeline.dispatcher().queued(),
        in_flight = pipeline.dispatcher().in_flight(),
        "Waiting for dispatched work to finish"
    );
    pipeline.stopped().await;

    http_handle.stop(true).await;
    match http_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task panicked: {}", e),
    }
}

fn log_delivery_result(
    result: Result<Result<(), mention_service::ListenerError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => info!("Story consumer stopped"),
        Ok(Err(e)) => error!("Story consumer failed: {:#}", e),
        Err(e) => error!("Story consumer task panicked: {}", e),
    }
}
