use mimalloc::MiMalloc;
use mysql_broadcast::ingress::{ChangeListener, LogDispatch};
use mysql_broadcast::lifecycle::{Service, destroy_all, fault_channel, start_all};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = &mysql_broadcast::config::CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        loglevel = %cfg.basic.loglevel,
        entrypoint = %cfg.mysql.entrypoint.display(),
        args = ?cfg.mysql.args,
        socket_path = %cfg.mysql.socket_path.display(),
        user = %cfg.mysql.user,
        max_attempts = cfg.mysql.max_attempts,
        retry_interval_ms = cfg.mysql.retry_interval_ms,
        connect_timeout_ms = cfg.mysql.connect_timeout_ms,
        udf_library = %cfg.mysql.udf_library,
        ingress_addr = %cfg.ingress.socket_addr(),
        "Configuration loaded"
    );

    let (faults, mut fault_rx) = fault_channel();

    let supervisor = mysql_broadcast::mysql::spawn(&cfg.mysql, faults.clone()).await?;
    let listener = ChangeListener::new(&cfg.ingress, Arc::new(LogDispatch), faults);

    // Start order matters: the database must be ready before triggers can call back.
    let services: Vec<Arc<dyn Service>> = vec![Arc::new(supervisor), Arc::new(listener)];
    start_all(&services).await?;
    info!("All services started");

    let exit_fault = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            None
        }
        Some(fault) = fault_rx.recv() => {
            error!(component = fault.component(), error = %fault, "Fatal fault; shutting down");
            Some(fault)
        }
    };

    destroy_all(&services).await;
    info!("All services stopped");

    match exit_fault {
        Some(fault) => Err(fault.into()),
        None => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
