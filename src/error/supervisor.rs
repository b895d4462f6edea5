use std::time::Duration;
use thiserror::Error as ThisError;

use super::IsRetryable;

#[derive(Debug, ThisError)]
pub enum SupervisorError {
    #[error("failed to spawn mysqld: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection attempt failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database unavailable after {attempts} connection attempts")]
    DatabaseUnavailable { attempts: u32 },

    #[error("failed to check mysql-udf-http functions: {0}")]
    ExtensionCheck(#[source] sqlx::Error),

    #[error("failed to install mysql-udf-http functions: {0}")]
    ExtensionInstall(#[source] sqlx::Error),

    #[error("Ractor error: {0}")]
    RactorError(String),
}

impl IsRetryable for SupervisorError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SupervisorError::ConnectTimeout(_) | SupervisorError::Connect(_)
        )
    }
}
