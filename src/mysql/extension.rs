use crate::error::SupervisorError;
use async_trait::async_trait;
use sqlx::{Connection, MySqlPool};
use std::io;
use tracing::{error, info};

/// Functions exported by mysql-udf-http; triggers call these to reach the ingress listener.
pub const UDF_FUNCTIONS: [&str; 4] = ["http_get", "http_post", "http_put", "http_delete"];

const COUNT_UDF_SQL: &str = r#"
SELECT COUNT(*)
FROM mysql.func
WHERE dl = ?
  AND name IN ('http_get', 'http_post', 'http_put', 'http_delete')
"#;

/// Queries the supervisor issues against an established session.
#[async_trait]
pub trait DatabaseSession: Send + Sync {
    /// Number of [`UDF_FUNCTIONS`] registered against `library`.
    async fn count_extension_functions(&self, library: &str) -> Result<i64, sqlx::Error>;

    /// Drops and recreates every function in [`UDF_FUNCTIONS`] in one batch.
    async fn install_extension(&self, library: &str) -> Result<(), sqlx::Error>;

    async fn ping(&self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl DatabaseSession for MySqlPool {
    async fn count_extension_functions(&self, library: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(COUNT_UDF_SQL)
            .bind(library)
            .fetch_one(self)
            .await
    }

    async fn install_extension(&self, library: &str) -> Result<(), sqlx::Error> {
        let batch = install_statements(library);
        sqlx::raw_sql(&batch).execute(self).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        // Acquiring from an empty pool would dial a fresh connection.
        if self.size() == 0 {
            return Err(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "mysql session connection was dropped",
            )));
        }
        let mut conn = self.acquire().await?;
        conn.ping().await
    }
}

/// Renders the drop-then-create batch. Safe to run whatever subset already exists.
pub fn install_statements(library: &str) -> String {
    let soname = library.replace('\'', "''");
    let drops = UDF_FUNCTIONS
        .iter()
        .map(|name| format!("DROP FUNCTION IF EXISTS {name};"));
    let creates = UDF_FUNCTIONS
        .iter()
        .map(|name| format!("CREATE FUNCTION {name} RETURNS STRING SONAME '{soname}';"));
    drops.chain(creates).collect::<Vec<_>>().join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStatus {
    AlreadyInstalled,
    Installed,
}

/// Verifies the http functions are registered, installing them when any is missing.
pub async fn ensure_extension<S>(
    session: &S,
    library: &str,
) -> Result<ExtensionStatus, SupervisorError>
where
    S: DatabaseSession + ?Sized,
{
    info!(library, "Checking mysql-udf-http functions");

    let count = session
        .count_extension_functions(library)
        .await
        .map_err(|e| {
            error!(library, error = %e, "mysql-udf-http check failed");
            SupervisorError::ExtensionCheck(e)
        })?;

    if count == UDF_FUNCTIONS.len() as i64 {
        info!(library, count, "mysql-udf-http functions present");
        return Ok(ExtensionStatus::AlreadyInstalled);
    }

    info!(library, count, "Installing mysql-udf-http functions");
    session.install_extension(library).await.map_err(|e| {
        error!(library, error = %e, "mysql-udf-http install failed");
        SupervisorError::ExtensionInstall(e)
    })?;
    info!(library, "mysql-udf-http functions installed");

    Ok(ExtensionStatus::Installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_batch_drops_before_creating() {
        let batch = install_statements("mysql-udf-http.so");
        let lines: Vec<&str> = batch.lines().collect();

        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "DROP FUNCTION IF EXISTS http_get;");
        assert_eq!(lines[3], "DROP FUNCTION IF EXISTS http_delete;");
        assert_eq!(
            lines[4],
            "CREATE FUNCTION http_get RETURNS STRING SONAME 'mysql-udf-http.so';"
        );
        assert_eq!(
            lines[7],
            "CREATE FUNCTION http_delete RETURNS STRING SONAME 'mysql-udf-http.so';"
        );
    }

    #[test]
    fn soname_quotes_are_escaped() {
        let batch = install_statements("it's.so");
        assert!(batch.contains("SONAME 'it''s.so';"));
    }
}
