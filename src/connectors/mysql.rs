use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use std::time::Duration;

use super::{host_and_port, Connector, Operation, Outcome, SqlOperation};
use crate::error::DispatchError;
use crate::registry::{ResolvedTarget, TargetKind};

pub const DEFAULT_PORT: u16 = 3306;
/// Administrative catalog every MySQL server has.
pub const ADMIN_DATABASE: &str = "information_schema";

pub struct MysqlConnector {
    timeout: Duration,
}

impl MysqlConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn connect_options(target: &ResolvedTarget) -> Result<MySqlConnectOptions, DispatchError> {
        let (host, port) = host_and_port(&target.address, DEFAULT_PORT)?;
        Ok(MySqlConnectOptions::new()
            .host(&host)
            .port(port)
            .username(target.username())
            .password(target.password())
            .database(ADMIN_DATABASE)
            .charset("utf8mb4"))
    }
}

#[async_trait]
impl Connector for MysqlConnector {
    fn kind(&self) -> TargetKind {
        TargetKind::Mysql
    }

    async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError> {
        let Operation::Sql(SqlOperation::ExecuteStatement { sql }) = operation else {
            return Err(operation.unsupported(self.kind()));
        };

        let options = Self::connect_options(target)?;
        let mut conn = tokio::time::timeout(self.timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| DispatchError::connect(format!("timed out connecting to {}", target.address)))?
            .map_err(|e| match e {
                sqlx::Error::Database(db) => DispatchError::rejected(db.message().to_string()),
                other => DispatchError::connect(other.to_string()),
            })?;

        let result = tokio::time::timeout(self.timeout, sqlx::Executor::execute(&mut conn, sqlx::raw_sql(sql)))
            .await
            .map_err(|_| DispatchError::connect("statement timed out"));

        if let Err(e) = conn.close().await {
            tracing::debug!(target_name = %target.name, error = %e, "MySQL connection did not close cleanly");
        }

        let done = result??;
        tracing::info!(target_name = %target.name, rows = done.rows_affected(), "Executed MySQL statement");
        Ok(Outcome::Executed {
            rows_affected: done.rows_affected(),
        })
    }
}
