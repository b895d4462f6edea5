use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Supervised MySQL server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MysqlConfig {
    /// Executable that boots the server.
    /// TOML: `mysql.entrypoint`. Default: `/usr/local/bin/docker-entrypoint.sh`.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: PathBuf,

    /// Arguments passed to the entrypoint. TOML: `mysql.args`. Default: `["mysqld"]`.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Unix socket the server listens on.
    /// TOML: `mysql.socket_path`. Default: `/var/run/mysqld/mysqld.sock`.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// TOML: `mysql.user`. Default: `root`.
    #[serde(default = "default_user")]
    pub user: String,

    /// TOML: `mysql.password`. Default: unset.
    #[serde(default)]
    pub password: Option<String>,

    /// Per-attempt connection timeout. TOML: `mysql.connect_timeout_ms`. Default: `9500`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Interval between connection attempts. Keep it above `connect_timeout_ms`.
    /// TOML: `mysql.retry_interval_ms`. Default: `10000`.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// TOML: `mysql.max_attempts`. Default: `3`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Deadline for the server to exit after SIGTERM.
    /// TOML: `mysql.shutdown_timeout_ms`. Default: `3000`.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Shared library providing the `http_*` functions.
    /// TOML: `mysql.udf_library`. Default: `mysql-udf-http.so`.
    #[serde(default = "default_udf_library")]
    pub udf_library: String,

    /// Connection watchdog period; `0` disables it.
    /// TOML: `mysql.health_check_interval_secs`. Default: `30`.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// Forward server stdout/stderr into the debug log.
    /// TOML: `mysql.capture_output`. Default: `false`.
    #[serde(default)]
    pub capture_output: bool,
}

/// Resolved timings and limits consumed by the supervisor actor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub connect_timeout: Duration,
    pub retry_interval: Duration,
    pub max_attempts: u32,
    pub shutdown_timeout: Duration,
    pub udf_library: String,
    pub health_check_interval: Option<Duration>,
}

impl MysqlConfig {
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms.max(1)),
            max_attempts: self.max_attempts,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            udf_library: self.udf_library.clone(),
            health_check_interval: (self.health_check_interval_secs > 0)
                .then(|| Duration::from_secs(self.health_check_interval_secs)),
        }
    }
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint(),
            args: default_args(),
            socket_path: default_socket_path(),
            user: default_user(),
            password: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            max_attempts: default_max_attempts(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            udf_library: default_udf_library(),
            health_check_interval_secs: default_health_check_interval_secs(),
            capture_output: false,
        }
    }
}

fn default_entrypoint() -> PathBuf {
    PathBuf::from("/usr/local/bin/docker-entrypoint.sh")
}

fn default_args() -> Vec<String> {
    vec!["mysqld".to_string()]
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/mysqld/mysqld.sock")
}

fn default_user() -> String {
    "root".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    9_500
}

fn default_retry_interval_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_shutdown_timeout_ms() -> u64 {
    3_000
}

fn default_udf_library() -> String {
    "mysql-udf-http.so".to_string()
}

fn default_health_check_interval_secs() -> u64 {
    30
}
