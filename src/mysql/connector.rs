use super::extension::DatabaseSession;
use crate::config::MysqlConfig;
use async_trait::async_trait;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::time::Duration;

/// Opens a client session to the supervised server.
///
/// The supervisor applies its own per-attempt deadline around `connect`, so
/// implementations do not need to time out on their own.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: DatabaseSession + Clone + Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Conn, sqlx::Error>;
}

/// Connects over the server's unix socket.
///
/// The session is a single-connection pool: queries from every consumer are
/// serialized onto one server connection, and handles are cheap to clone.
/// The pool never recycles or silently reconnects that connection; once it is
/// gone the session stays broken until the supervisor is restarted.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
}

impl MySqlConnector {
    pub fn new(options: MySqlConnectOptions, connect_timeout: Duration) -> Self {
        Self {
            options,
            connect_timeout,
        }
    }

    pub fn from_config(cfg: &MysqlConfig) -> Self {
        let mut options = MySqlConnectOptions::new()
            .socket(&cfg.socket_path)
            .username(&cfg.user);
        if let Some(password) = cfg.password.as_deref() {
            options = options.password(password);
        }
        Self::new(options, Duration::from_millis(cfg.connect_timeout_ms))
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlPool;

    async fn connect(&self) -> Result<MySqlPool, sqlx::Error> {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .test_before_acquire(false)
            .connect_with(self.options.clone())
            .await
    }
}
