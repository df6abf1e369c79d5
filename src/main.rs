use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use roomsync::config::Config;
use roomsync::desk::Desk;
use roomsync::feed::{FeedSource, SheetsFeed, StaticFeed};
use roomsync::reconcile::Reconciler;
use roomsync::store::Store;
use roomsync::{scheduler, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    roomsync::observability::init(config.metrics_port)?;

    let tls_acceptor =
        roomsync::tls::load_tls_acceptor(config.tls_cert.as_deref(), config.tls_key.as_deref())?;

    if config.staff.is_empty() {
        tracing::warn!("ROOMSYNC_STAFF is empty, nobody can log in");
    }

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(Store::new(config.data_dir.join("roomsync.wal"))?);

    let feed: Arc<dyn FeedSource> = match &config.sheets {
        Some(sheets) => Arc::new(SheetsFeed::new(
            &sheets.api_key,
            &sheets.spreadsheet_id,
            &sheets.range,
        )?),
        None => {
            tracing::warn!("no spreadsheet configured, resync will find no rooms");
            Arc::new(StaticFeed::new(Vec::new()))
        }
    };

    let desk = Arc::new(Desk::new(Reconciler::new(store.clone()), feed));
    if let Some(outcome) = desk.initial_sync().await? {
        info!(rows = outcome.rows, success = outcome.success, "initial sync finished");
    }

    tokio::spawn(scheduler::run_compactor(store.clone(), config.compact_threshold));
    if let Some(period) = config.sync_interval {
        tokio::spawn(scheduler::run_sync_loop(desk.clone(), period));
    }

    let factory = wire::RoomSyncFactory::new(desk, Arc::new(config.staff.clone()), config.report_start);
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("roomsync listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {max_connections}");
    info!("  staff: {}", config.staff.len());
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!(
        "  sync_interval: {}",
        config
            .sync_interval
            .map_or("disabled".to_string(), |d| format!("{}s", d.as_secs()))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("no SIGTERM handler ({e}), waiting for ctrl-c");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(roomsync::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(roomsync::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(roomsync::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let factory = factory.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, factory, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(roomsync::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("roomsync stopped");
    Ok(())
}
