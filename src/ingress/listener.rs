use super::dispatch::Dispatch;
use super::router::{IngressState, ingress_router};
use crate::config::IngressConfig;
use crate::error::{Fault, IngressError, ServiceError};
use crate::lifecycle::{FaultSender, Service};
use async_trait::async_trait;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{Mutex, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info};

/// Listener for trigger callbacks. Bound or unbound; nothing else.
pub struct ChangeListener {
    addr: SocketAddr,
    dispatcher: Arc<dyn Dispatch>,
    faults: FaultSender,
    server: Mutex<Option<RunningServer>>,
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ChangeListener {
    pub fn new(cfg: &IngressConfig, dispatcher: Arc<dyn Dispatch>, faults: FaultSender) -> Self {
        Self::with_addr(cfg.socket_addr(), dispatcher, faults)
    }

    pub fn with_addr(addr: SocketAddr, dispatcher: Arc<dyn Dispatch>, faults: FaultSender) -> Self {
        Self {
            addr,
            dispatcher,
            faults,
            server: Mutex::new(None),
        }
    }

    /// Bound address while running (resolves port `0` to the real port).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|s| s.local_addr)
    }

    /// Binds and starts serving. A no-op while already listening.
    pub async fn start(&self) -> Result<(), IngressError> {
        let mut server = self.server.lock().await;
        if let Some(running) = server.as_ref() {
            debug!(local_addr = %running.local_addr, "Change listener already running");
            return Ok(());
        }

        let addr = self.addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| IngressError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| IngressError::Bind { addr, source })?;

        let app = ingress_router(IngressState::new(self.dispatcher.clone()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let faults = self.faults.clone();

        let task = tokio::spawn(async move {
            let res = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = &res {
                error!(error = %e, "Change listener server error");
                faults.report(Fault::Ingress(std::io::Error::new(e.kind(), e.to_string())));
            }
            res
        });

        info!(%local_addr, "Change listener accepting connections");
        *server = Some(RunningServer {
            local_addr,
            shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stops accepting and waits for the server task. A no-op when not started.
    pub async fn destroy(&self) -> Result<(), IngressError> {
        let Some(running) = self.server.lock().await.take() else {
            debug!("Change listener not running");
            return Ok(());
        };

        let _ = running.shutdown_tx.send(());
        let res = match running.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(IngressError::Serve(e)),
            Err(e) => Err(IngressError::Shutdown(e.to_string())),
        };
        info!(local_addr = %running.local_addr, "Change listener closed");
        res
    }
}

#[async_trait]
impl Service for ChangeListener {
    fn name(&self) -> &'static str {
        "change-listener"
    }

    async fn start(&self) -> Result<(), ServiceError> {
        ChangeListener::start(self).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ServiceError> {
        ChangeListener::destroy(self).await?;
        Ok(())
    }
}
