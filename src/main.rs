// snapsolve entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (config.toml + environment credentials)
// 3. Build the broadcast hub and solver client
// 4. Spawn the clipboard watcher task
// 5. Spawn the cycle controller task
// 6. Run the viewer WebSocket server (bind failure is the only fatal error)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use snapsolve::clipboard;
use snapsolve::config;
use snapsolve::cycle::CycleController;
use snapsolve::hub::BroadcastHub;
use snapsolve::solver::{HunyuanSolver, Solver};
use snapsolve::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("snapsolve starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "config loaded: listen={}:{}, poll interval {}ms, model {}",
        config.server.host,
        config.server.port,
        config.watcher.poll_interval_ms,
        config.solver.model
    );

    if !config.credentials.configured() {
        // Not fatal: the watcher keeps running and every cycle reports a
        // configuration error to viewers instead.
        warn!(
            "API credentials missing or placeholders; set {} and {}",
            config::SECRET_ID_ENV,
            config::SECRET_KEY_ENV
        );
    }

    let hub = Arc::new(BroadcastHub::new());

    let solver: Arc<dyn Solver> = Arc::new(HunyuanSolver::new(
        config.credentials.clone(),
        config.solver.model.clone(),
        config.solver.max_tokens,
    ));

    let (image_tx, image_rx) = mpsc::channel(8);

    let poll_interval = Duration::from_millis(config.watcher.poll_interval_ms);
    tokio::spawn(clipboard::watch(poll_interval, image_tx));

    let controller = CycleController::new(Arc::clone(&hub), solver);
    tokio::spawn(controller.run(image_rx));

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind viewer server on {}:{}",
                config.server.host, config.server.port
            )
        })?;

    ws_server::run(listener, hub).await
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snapsolve=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
