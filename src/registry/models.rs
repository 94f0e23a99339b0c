use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    KeyValue,
    ConfigCenter,
    JobServer,
    Mysql,
    Postgres,
}

impl TargetKind {
    pub const ALL: [TargetKind; 5] = [
        TargetKind::KeyValue,
        TargetKind::ConfigCenter,
        TargetKind::JobServer,
        TargetKind::Mysql,
        TargetKind::Postgres,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::KeyValue => "key_value",
            TargetKind::ConfigCenter => "config_center",
            TargetKind::JobServer => "job_server",
            TargetKind::Mysql => "mysql",
            TargetKind::Postgres => "postgres",
        }
    }

    pub fn is_sql(&self) -> bool {
        matches!(self, TargetKind::Mysql | TargetKind::Postgres)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "key_value" | "etcd" => Ok(TargetKind::KeyValue),
            "config_center" | "nacos" => Ok(TargetKind::ConfigCenter),
            "job_server" | "jenkins" => Ok(TargetKind::JobServer),
            "mysql" => Ok(TargetKind::Mysql),
            "postgres" | "postgresql" => Ok(TargetKind::Postgres),
            _ => {
                let expected: Vec<&str> = TargetKind::ALL.iter().map(|k| k.as_str()).collect();
                anyhow::bail!(
                    "Invalid target kind: {} (expected one of {})",
                    s,
                    expected.join(", ")
                )
            }
        }
    }
}

/// Persisted row. `encrypted_password` only ever holds vault output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: Uuid,
    pub kind: TargetKind,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub encrypted_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSummary {
    pub id: Uuid,
    pub kind: TargetKind,
    pub name: String,
    pub address: String,
    pub username: Option<String>,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TargetRecord> for TargetSummary {
    fn from(record: &TargetRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            name: record.name.clone(),
            address: record.address.clone(),
            username: record.username.clone(),
            has_password: record.encrypted_password.is_some(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTarget {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetUpdate {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Empty or absent keeps the stored ciphertext.
    #[serde(default)]
    pub password: Option<String>,
}

/// Dispatch-only view of a target with plaintext credentials.
#[derive(Clone)]
pub struct ResolvedTarget {
    pub id: Uuid,
    pub kind: TargetKind,
    pub name: String,
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ResolvedTarget {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    pub fn has_credentials(&self) -> bool {
        !self.username().is_empty()
    }
}

impl std::fmt::Debug for ResolvedTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTarget")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .field(
                "password",
                &self.password.as_deref().map(crate::connectors::mask_secret),
            )
            .finish()
    }
}
