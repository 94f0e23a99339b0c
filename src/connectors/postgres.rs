use async_trait::async_trait;
use std::time::Duration;
use tokio_postgres::{NoTls, SimpleQueryMessage};

use super::{host_and_port, Connector, Operation, Outcome, SqlOperation};
use crate::error::DispatchError;
use crate::registry::{ResolvedTarget, TargetKind};

pub const DEFAULT_PORT: u16 = 5432;
pub const ADMIN_DATABASE: &str = "postgres";

pub struct PostgresConnector {
    timeout: Duration,
}

impl PostgresConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn connect_config(
        target: &ResolvedTarget,
        timeout: Duration,
    ) -> Result<tokio_postgres::Config, DispatchError> {
        let (host, port) = host_and_port(&target.address, DEFAULT_PORT)?;
        let mut config = tokio_postgres::Config::new();
        config
            .host(&host)
            .port(port)
            .user(target.username())
            .dbname(ADMIN_DATABASE)
            .connect_timeout(timeout)
            .ssl_mode(tokio_postgres::config::SslMode::Disable);
        if !target.password().is_empty() {
            config.password(target.password());
        }
        Ok(config)
    }
}

fn rows_affected(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .map(|m| match m {
            SimpleQueryMessage::CommandComplete(n) => *n,
            _ => 0,
        })
        .sum()
}

#[async_trait]
impl Connector for PostgresConnector {
    fn kind(&self) -> TargetKind {
        TargetKind::Postgres
    }

    async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError> {
        let Operation::Sql(SqlOperation::ExecuteStatement { sql }) = operation else {
            return Err(operation.unsupported(self.kind()));
        };

        let config = Self::connect_config(target, self.timeout)?;
        let (client, connection) = tokio::time::timeout(self.timeout, config.connect(NoTls))
            .await
            .map_err(|_| DispatchError::connect(format!("timed out connecting to {}", target.address)))?
            .map_err(|e| match e.as_db_error() {
                Some(db) => DispatchError::rejected(db.message().to_string()),
                None => DispatchError::connect(e.to_string()),
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        let result = tokio::time::timeout(self.timeout, client.simple_query(sql))
            .await
            .map_err(|_| DispatchError::connect("statement timed out"));

        // Dropping the client terminates the session; wait for the driver to finish.
        drop(client);
        let _ = driver.await;

        let messages = result??;
        let rows = rows_affected(&messages);
        tracing::info!(target_name = %target.name, rows, "Executed PostgreSQL statement");
        Ok(Outcome::Executed {
            rows_affected: rows,
        })
    }
}
