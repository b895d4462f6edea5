mod basic;
mod ingress;
mod mysql;

pub use basic::BasicConfig;
pub use ingress::IngressConfig;
pub use mysql::{MysqlConfig, SupervisorSettings};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core process configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Supervised MySQL server settings (see `mysql` table in config.toml).
    #[serde(default)]
    pub mysql: MysqlConfig,

    /// Change ingress listener settings (see `ingress` table in config.toml).
    #[serde(default)]
    pub ingress: IngressConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "MYSQL_BROADCAST_";

impl Config {
    /// Builds a Figment that merges defaults, an optional config TOML file and
    /// `MYSQL_BROADCAST_`-prefixed environment variables (`__` separates tables).
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|err| panic!("failed to extract configuration: {err}"))
});

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml;
    use std::time::Duration;

    #[test]
    fn defaults_match_the_container_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.basic.loglevel, "info");
        assert_eq!(cfg.mysql.entrypoint, PathBuf::from("/usr/local/bin/docker-entrypoint.sh"));
        assert_eq!(cfg.mysql.args, vec!["mysqld".to_string()]);
        assert_eq!(cfg.mysql.socket_path, PathBuf::from("/var/run/mysqld/mysqld.sock"));
        assert_eq!(cfg.mysql.user, "root");
        assert_eq!(cfg.mysql.udf_library, "mysql-udf-http.so");
        assert_eq!(cfg.ingress.listen_port, 3000);
        assert_eq!(cfg.ingress.listen_addr.to_string(), "0.0.0.0");

        let settings = cfg.mysql.supervisor_settings();
        assert_eq!(settings.connect_timeout, Duration::from_millis(9500));
        assert_eq!(settings.retry_interval, Duration::from_secs(10));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(settings.health_check_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn toml_overrides_partial_tables() {
        let cfg: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [mysql]
                max_attempts = 5
                health_check_interval_secs = 0

                [ingress]
                listen_port = 3100
                "#,
            ))
            .extract()
            .expect("config should extract");

        assert_eq!(cfg.mysql.max_attempts, 5);
        assert_eq!(cfg.mysql.retry_interval_ms, 10_000);
        assert_eq!(cfg.mysql.supervisor_settings().health_check_interval, None);
        assert_eq!(cfg.ingress.listen_port, 3100);
    }
}
