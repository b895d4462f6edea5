mod fault;
mod ingress;
mod supervisor;

pub use fault::Fault;
pub use ingress::IngressError;
pub use supervisor::SupervisorError;

use thiserror::Error as ThisError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// Error surfaced through the [`Service`](crate::lifecycle::Service) contract.
#[derive(Debug, ThisError)]
pub enum ServiceError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Ingress(#[from] IngressError),
}
