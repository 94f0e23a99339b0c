//! etcd v3 over its JSON gateway (`/v3/kv/*`). Keys and values travel as
//! standard base64 inside JSON bodies.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{base_url, http_client, read_body, unescape_newlines, Connector, KvOperation, Operation, Outcome};
use crate::error::DispatchError;
use crate::registry::{ResolvedTarget, TargetKind};

pub struct EtcdConnector {
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

/// One short-lived session against an etcd endpoint.
struct Session {
    client: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl EtcdConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn open(&self, target: &ResolvedTarget) -> Result<Session, DispatchError> {
        let client = http_client(self.timeout)?;
        let base = base_url(target)?;

        let token = if target.has_credentials() {
            let response = client
                .post(format!("{}/v3/auth/authenticate", base))
                .json(&json!({ "name": target.username(), "password": target.password() }))
                .send()
                .await?;
            let body = read_body(response, "etcd").await?;
            let auth: AuthResponse = serde_json::from_str(&body)
                .map_err(|e| DispatchError::protocol(format!("invalid etcd auth response: {}", e)))?;
            Some(auth.token)
        } else {
            None
        };

        Ok(Session {
            client,
            base,
            token,
        })
    }
}

impl Session {
    async fn call(&self, path: &str, body: serde_json::Value) -> Result<String, DispatchError> {
        let mut request = self.client.post(format!("{}{}", self.base, path)).json(&body);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        let response = request.send().await?;
        read_body(response, "etcd").await
    }

    async fn range(&self, body: serde_json::Value) -> Result<RangeResponse, DispatchError> {
        let text = self.call("/v3/kv/range", body).await?;
        serde_json::from_str(&text)
            .map_err(|e| DispatchError::protocol(format!("invalid etcd range response: {}", e)))
    }
}

fn encode(raw: &str) -> String {
    STANDARD.encode(raw.as_bytes())
}

fn decode(encoded: &str) -> Result<String, DispatchError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| DispatchError::protocol(format!("invalid base64 from etcd: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| DispatchError::protocol("etcd returned non UTF-8 data"))
}

#[async_trait]
impl Connector for EtcdConnector {
    fn kind(&self) -> TargetKind {
        TargetKind::KeyValue
    }

    async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError> {
        let Operation::KeyValue(op) = operation else {
            return Err(operation.unsupported(self.kind()));
        };

        let session = self.open(target).await?;

        match op {
            KvOperation::ListKeys => {
                // "\0" as both key and range_end selects the whole keyspace.
                let all = encode("\0");
                let resp = session
                    .range(json!({ "key": all, "range_end": all, "keys_only": true }))
                    .await?;
                let keys = resp
                    .kvs
                    .iter()
                    .map(|kv| decode(&kv.key))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Outcome::Keys(keys))
            }
            KvOperation::GetValue { key } => {
                let resp = session.range(json!({ "key": encode(key) })).await?;
                let kv = resp
                    .kvs
                    .first()
                    .ok_or_else(|| DispatchError::KeyNotFound(key.clone()))?;
                let value = match &kv.value {
                    Some(v) => decode(v)?,
                    None => String::new(),
                };
                Ok(Outcome::Value { value })
            }
            KvOperation::PutValue { key, value } => {
                let value = unescape_newlines(value);
                session
                    .call(
                        "/v3/kv/put",
                        json!({ "key": encode(key), "value": encode(&value) }),
                    )
                    .await?;
                tracing::debug!(target_name = %target.name, %key, "Put etcd key");
                Ok(Outcome::accepted())
            }
            KvOperation::DeleteValue { key } => {
                session
                    .call("/v3/kv/deleterange", json!({ "key": encode(key) }))
                    .await?;
                tracing::debug!(target_name = %target.name, %key, "Deleted etcd key");
                Ok(Outcome::accepted())
            }
        }
    }
}
