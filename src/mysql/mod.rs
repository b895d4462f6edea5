//! Supervision of the bundled MySQL server.
//!
//! Layout:
//! - `launcher.rs`: spawning and terminating the `mysqld` child process
//! - `connector.rs`: opening the client connection over the local socket
//! - `extension.rs`: verifying/installing the mysql-udf-http functions
//! - `retry.rs`: bounded connect-retry state machine
//! - `supervisor.rs`: actor that drives the startup sequence and owns all handles

pub mod connector;
pub mod extension;
pub mod launcher;
pub mod retry;
pub mod supervisor;

pub use connector::{Connector, MySqlConnector};
pub use extension::{DatabaseSession, ExtensionStatus, UDF_FUNCTIONS, ensure_extension};
pub use launcher::{Launcher, ProcessState, ServerProcess};
pub use retry::{ConnectRetry, RetryState, Tick};
pub use supervisor::{MysqlSupervisorHandle, SupervisorStatus};

use crate::config::MysqlConfig;
use crate::error::SupervisorError;
use crate::lifecycle::FaultSender;
use sqlx::MySqlPool;

/// Supervisor handle for the production MySQL connector.
pub type MysqlSupervisor = MysqlSupervisorHandle<MySqlPool>;

/// Spawns the supervisor actor for the configured server. Nothing is launched
/// until [`MysqlSupervisorHandle::start`] is called.
pub async fn spawn(cfg: &MysqlConfig, faults: FaultSender) -> Result<MysqlSupervisor, SupervisorError> {
    supervisor::spawn(
        cfg.supervisor_settings(),
        Launcher::from_config(cfg),
        MySqlConnector::from_config(cfg),
        faults,
    )
    .await
}
