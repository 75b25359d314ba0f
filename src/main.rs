//! ==============================================================================
//! main.rs - greenhouse-link entry point
//! ==============================================================================
//!
//! responsibilities:
//!     - load monitor.toml (or defaults) and set up logging
//!     - pick the backend: realtime database REST api, or `--offline` demo data
//!     - start the session task and the polling subscription
//!     - serve the json api until ctrl-c, then tear the subscription down
//!
//! ==============================================================================

use greenhouse_link::backend::{ControlWriter, MemoryBackend, PushSource, RtdbClient};
use greenhouse_link::config::MonitorConfig;
use greenhouse_link::server;
use greenhouse_link::session::{self, SessionOptions};
use greenhouse_link::subscription::Subscription;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let offline = std::env::args().skip(1).any(|a| a == "--offline");

    // step 1: load configuration (a scoped subscriber so loader messages show)
    let config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().finish(),
        MonitorConfig::load_or_default,
    );

    // step 2: logging, RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("greenhouse-link {}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    // step 3: backend
    if offline {
        tracing::info!("[STARTUP] offline mode, using in-memory demo documents");
        run(Arc::new(MemoryBackend::demo()), &config).await
    } else {
        run(Arc::new(RtdbClient::new(&config.backend)?), &config).await
    }
}

async fn run<B>(backend: Arc<B>, config: &MonitorConfig) -> Result<()>
where
    B: PushSource + ControlWriter,
{
    // step 4: session + subscription
    let (handle, session_task) =
        session::spawn(backend.clone(), SessionOptions::from_config(config));
    let mut subscription = Subscription::start(backend, handle.clone(), config.polling.interval());

    // step 5: api server in background
    let bind = config.server.bind.clone();
    let server_handle = handle.clone();
    let mut server_task =
        tokio::spawn(async move { server::run_server(server_handle, &bind).await });

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("[SHUTDOWN] ctrl-c received");
            signal.map_err(anyhow::Error::from)
        }
        joined = &mut server_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!("[ERROR] api server failed: {:#}", e);
                Err(e)
            }
            Err(e) => Err(anyhow::anyhow!("api server task failed: {}", e)),
        },
    };

    // step 6: teardown
    subscription.unsubscribe();
    server_task.abort();
    drop(handle);
    if tokio::time::timeout(Duration::from_secs(2), session_task).await.is_err() {
        tracing::warn!("[SHUTDOWN] session did not drain in time");
    }

    outcome
}
