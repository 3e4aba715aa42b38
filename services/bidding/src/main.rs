use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bidding::config::{Config, StoreBackend};
use bidding::connections::ConnectionRegistry;
use bidding::fanout::{Fanout, FanoutConfig};
use bidding::router::create_router;
use bidding::state::AppState;
use bidding::store::{MemoryStore, RedisStore, SharedStore};
use bidding::stream::{EventLog, MemoryEventLog, RedisEventLog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    info!(backend = ?config.backend, "starting bidding service");

    let (store, log): (Arc<dyn SharedStore>, Arc<dyn EventLog>) = match config.backend {
        StoreBackend::Redis => {
            let url = config.redis_url();
            let store = RedisStore::connect(&url)
                .await
                .context("connecting to redis store")?;
            store.ping().await.context("redis ping failed")?;
            let log = RedisEventLog::connect(&url, &config.stream_name)
                .await
                .context("connecting to redis event log")?;
            info!(%url, "store connection successful");
            (Arc::new(store), Arc::new(log))
        }
        StoreBackend::Memory => {
            tracing::warn!("in-process store backend: cross-instance fanout is disabled");
            (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryEventLog::new()),
            )
        }
    };

    let registry = Arc::new(ConnectionRegistry::new());
    let shutdown = CancellationToken::new();

    let fanout = Fanout::new(log.clone(), registry.clone(), FanoutConfig::from(&config));
    let fanout_task = tokio::spawn(fanout.run(shutdown.clone()));
    info!("started fanout broadcaster");

    let bind_addr = config.bind_addr;
    let state = AppState::new(store, log, registry, config);
    let app = create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // In-flight admissions are short and finish with the server; the
    // broadcaster stops at its next poll boundary.
    shutdown.cancel();
    fanout_task.await.context("fanout task panicked")?;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
    shutdown.cancel();
}
