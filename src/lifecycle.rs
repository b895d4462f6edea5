//! Start/destroy contract shared by every long-lived component, plus the
//! channel used to surface failures that happen after startup.

use crate::error::{Fault, ServiceError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub type FaultReceiver = mpsc::UnboundedReceiver<Fault>;

/// Sending half of the fault channel. Cheap to clone; one per emitter.
#[derive(Debug, Clone)]
pub struct FaultSender {
    tx: mpsc::UnboundedSender<Fault>,
}

impl FaultSender {
    /// Returns `false` once the receiving side is gone.
    pub fn report(&self, fault: Fault) -> bool {
        self.tx.send(fault).is_ok()
    }
}

pub fn fault_channel() -> (FaultSender, FaultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FaultSender { tx }, rx)
}

#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolves once the component is usable. Idempotent.
    async fn start(&self) -> Result<(), ServiceError>;

    /// Safe to call before `start` and more than once.
    async fn destroy(&self) -> Result<(), ServiceError>;
}

/// Starts services in order. On the first failure, already-started services
/// are destroyed in reverse order and the failure is returned.
pub async fn start_all(services: &[Arc<dyn Service>]) -> Result<(), ServiceError> {
    for (idx, service) in services.iter().enumerate() {
        info!(service = service.name(), "Starting service");
        if let Err(e) = service.start().await {
            error!(service = service.name(), error = %e, "Service failed to start");
            destroy_all(&services[..idx]).await;
            return Err(e);
        }
    }
    Ok(())
}

/// Destroys services in reverse registration order. Never stops early.
pub async fn destroy_all(services: &[Arc<dyn Service>]) {
    for service in services.iter().rev() {
        info!(service = service.name(), "Destroying service");
        if let Err(e) = service.destroy().await {
            warn!(service = service.name(), error = %e, "Service destroy reported an error");
        }
    }
}
