use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::error::DispatchError;
use crate::registry::{ResolvedTarget, TargetKind};

pub mod etcd;
pub mod jenkins;
pub mod mysql;
pub mod nacos;
pub mod postgres;

pub use jenkins::{JobSummary, ParameterDefinition};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum KvOperation {
    ListKeys,
    GetValue { key: String },
    PutValue { key: String, value: String },
    DeleteValue { key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConfigOperation {
    ListNamespaces,
    ListConfigs {
        page_size: u32,
        #[serde(default)]
        tenant: String,
    },
    SaveConfig {
        #[serde(default)]
        tenant: String,
        data_id: String,
        group: String,
        content: String,
        #[serde(default)]
        config_type: String,
    },
    DeleteConfig {
        #[serde(default)]
        tenant: String,
        data_id: String,
        group: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JobOperation {
    ListViews,
    ListJobs { view: String },
    GetBuildParameters { job: String },
    TriggerBuild {
        job: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SqlOperation {
    /// Runs operator-supplied SQL verbatim. No validation or restriction.
    ExecuteStatement { sql: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Operation {
    KeyValue(KvOperation),
    Config(ConfigOperation),
    Job(JobOperation),
    Sql(SqlOperation),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::KeyValue(KvOperation::ListKeys) => "list_keys",
            Operation::KeyValue(KvOperation::GetValue { .. }) => "get_value",
            Operation::KeyValue(KvOperation::PutValue { .. }) => "put_value",
            Operation::KeyValue(KvOperation::DeleteValue { .. }) => "delete_value",
            Operation::Config(ConfigOperation::ListNamespaces) => "list_namespaces",
            Operation::Config(ConfigOperation::ListConfigs { .. }) => "list_configs",
            Operation::Config(ConfigOperation::SaveConfig { .. }) => "save_config",
            Operation::Config(ConfigOperation::DeleteConfig { .. }) => "delete_config",
            Operation::Job(JobOperation::ListViews) => "list_views",
            Operation::Job(JobOperation::ListJobs { .. }) => "list_jobs",
            Operation::Job(JobOperation::GetBuildParameters { .. }) => "get_build_parameters",
            Operation::Job(JobOperation::TriggerBuild { .. }) => "trigger_build",
            Operation::Sql(SqlOperation::ExecuteStatement { .. }) => "execute_statement",
        }
    }

    pub fn unsupported(&self, kind: TargetKind) -> DispatchError {
        DispatchError::UnsupportedOperation {
            kind,
            operation: self.name(),
        }
    }
}

impl From<KvOperation> for Operation {
    fn from(op: KvOperation) -> Self {
        Operation::KeyValue(op)
    }
}

impl From<ConfigOperation> for Operation {
    fn from(op: ConfigOperation) -> Self {
        Operation::Config(op)
    }
}

impl From<JobOperation> for Operation {
    fn from(op: JobOperation) -> Self {
        Operation::Job(op)
    }
}

impl From<SqlOperation> for Operation {
    fn from(op: SqlOperation) -> Self {
        Operation::Sql(op)
    }
}

/// Successful result of one dispatched operation, in the backend's own shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Outcome {
    Keys(Vec<String>),
    Value { value: String },
    Document(serde_json::Value),
    Views(Vec<String>),
    Jobs(Vec<JobSummary>),
    Parameters(Vec<ParameterDefinition>),
    Executed { rows_affected: u64 },
    Accepted { message: &'static str },
}

impl Outcome {
    pub fn accepted() -> Self {
        Outcome::Accepted { message: "true" }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn kind(&self) -> TargetKind;
    async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError>;
}

/// One connector per target kind, chosen once per call.
pub struct BackendDispatcher {
    connectors: HashMap<TargetKind, Arc<dyn Connector>>,
}

impl BackendDispatcher {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Dispatcher with every built-in connector, each bounded by `timeout`.
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(etcd::EtcdConnector::new(timeout)));
        dispatcher.register(Arc::new(nacos::NacosConnector::new(timeout)));
        dispatcher.register(Arc::new(jenkins::JenkinsConnector::new(timeout)));
        dispatcher.register(Arc::new(mysql::MysqlConnector::new(timeout)));
        dispatcher.register(Arc::new(postgres::PostgresConnector::new(timeout)));
        dispatcher
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let kind = connector.kind();
        tracing::debug!(%kind, "Registering connector");
        self.connectors.insert(kind, connector);
    }

    pub async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError> {
        let connector = self
            .connectors
            .get(&target.kind)
            .ok_or_else(|| operation.unsupported(target.kind))?;
        connector.execute(target, operation).await
    }
}

impl Default for BackendDispatcher {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_TIMEOUT)
    }
}

pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        "***".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("***{}", tail)
    }
}

/// Turns literal `\n` escape sequences typed by an operator into newlines.
pub fn unescape_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}

/// Builds a throwaway HTTP client: no idle connections survive the call.
/// Cookies live only as long as the client, enough to tie a Jenkins crumb to its session.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, DispatchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(0)
        .cookie_store(true)
        .build()
        .map_err(|e| DispatchError::protocol(format!("failed to build HTTP client: {}", e)))
}

pub(crate) fn base_url(target: &ResolvedTarget) -> Result<String, DispatchError> {
    let address = target.address.trim().trim_end_matches('/');
    if address.is_empty() {
        return Err(DispatchError::InvalidTarget(format!(
            "target '{}' has no address",
            target.name
        )));
    }
    if address.starts_with("http://") || address.starts_with("https://") {
        Ok(address.to_string())
    } else {
        Ok(format!("http://{}", address))
    }
}

/// Reads the body of a response, turning non-success statuses into
/// `BackendRejected` with the body as message.
pub(crate) async fn read_body(
    response: reqwest::Response,
    backend: &str,
) -> Result<String, DispatchError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(DispatchError::rejected(format!(
            "{} API error ({}): {}",
            backend, status, text
        )));
    }
    Ok(text)
}

/// Splits `host[:port]`, falling back to `default_port`.
pub(crate) fn host_and_port(
    address: &str,
    default_port: u16,
) -> Result<(String, u16), DispatchError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(DispatchError::InvalidTarget("empty address".into()));
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !host.ends_with(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                DispatchError::InvalidTarget(format!("invalid port in address '{}'", address))
            })?;
            Ok((host.trim_matches(|c| c == '[' || c == ']').to_string(), port))
        }
        _ => Ok((address.to_string(), default_port)),
    }
}
