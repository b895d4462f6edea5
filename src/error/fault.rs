use std::process::ExitStatus;
use thiserror::Error as ThisError;

/// Failure observed after a component finished starting.
///
/// Faults are never returned from a call; they are pushed onto the fault
/// channel handed to each component at construction.
#[derive(Debug, ThisError)]
pub enum Fault {
    #[error("mysqld exited unexpectedly: {status}")]
    ProcessExited { status: ExitStatus },

    #[error("failed to observe mysqld exit: {0}")]
    ProcessWait(#[source] std::io::Error),

    #[error("mysql connection failed health check: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("change listener server error: {0}")]
    Ingress(#[source] std::io::Error),
}

impl Fault {
    pub fn component(&self) -> &'static str {
        match self {
            Fault::ProcessExited { .. } | Fault::ProcessWait(_) | Fault::Connection(_) => {
                "mysql-supervisor"
            }
            Fault::Ingress(_) => "change-listener",
        }
    }
}
