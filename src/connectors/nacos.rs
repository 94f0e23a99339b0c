use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{
    base_url, http_client, read_body, unescape_newlines, ConfigOperation, Connector, Operation,
    Outcome,
};
use crate::error::DispatchError;
use crate::registry::{ResolvedTarget, TargetKind};

const SUCCESS_BODY: &str = "true";

pub struct NacosConnector {
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

impl NacosConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn login(
        &self,
        client: &reqwest::Client,
        base: &str,
        target: &ResolvedTarget,
    ) -> Result<Option<String>, DispatchError> {
        if !target.has_credentials() {
            return Ok(None);
        }

        let response = client
            .post(format!("{}/v1/auth/login", base))
            .form(&[("username", target.username()), ("password", target.password())])
            .send()
            .await?;
        let body = read_body(response, "Nacos").await?;
        let login: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| DispatchError::protocol(format!("invalid Nacos login response: {}", e)))?;
        Ok(Some(login.access_token))
    }
}

fn parse_document(body: &str) -> Result<serde_json::Value, DispatchError> {
    serde_json::from_str(body)
        .map_err(|e| DispatchError::protocol(format!("invalid Nacos response: {}", e)))
}

/// Nacos acknowledges writes with a bare `true` body; anything else is the error text.
async fn expect_true(response: reqwest::Response) -> Result<Outcome, DispatchError> {
    let body = response.text().await?;
    if body == SUCCESS_BODY {
        Ok(Outcome::accepted())
    } else {
        Err(DispatchError::rejected(body))
    }
}

#[async_trait]
impl Connector for NacosConnector {
    fn kind(&self) -> TargetKind {
        TargetKind::ConfigCenter
    }

    async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError> {
        let Operation::Config(op) = operation else {
            return Err(operation.unsupported(self.kind()));
        };

        let client = http_client(self.timeout)?;
        let base = base_url(target)?;
        let token = self.login(&client, &base, target).await?;
        let auth: Vec<(&str, &str)> = token
            .as_deref()
            .map(|t| vec![("accessToken", t)])
            .unwrap_or_default();

        match op {
            ConfigOperation::ListNamespaces => {
                let response = client
                    .get(format!("{}/v1/console/namespaces", base))
                    .query(&auth)
                    .send()
                    .await?;
                let body = read_body(response, "Nacos").await?;
                Ok(Outcome::Document(parse_document(&body)?))
            }
            ConfigOperation::ListConfigs { page_size, tenant } => {
                let page_size = page_size.to_string();
                let response = client
                    .get(format!("{}/v1/cs/configs", base))
                    .query(&[
                        ("dataId", ""),
                        ("group", ""),
                        ("appName", ""),
                        ("config_tags", ""),
                        ("pageNo", "1"),
                        ("pageSize", page_size.as_str()),
                        ("tenant", tenant.as_str()),
                        ("search", "accurate"),
                    ])
                    .query(&auth)
                    .send()
                    .await?;
                let body = read_body(response, "Nacos").await?;
                Ok(Outcome::Document(parse_document(&body)?))
            }
            ConfigOperation::SaveConfig {
                tenant,
                data_id,
                group,
                content,
                config_type,
            } => {
                let content = unescape_newlines(content);
                let response = client
                    .post(format!("{}/v1/cs/configs", base))
                    .query(&auth)
                    .form(&[
                        ("dataId", data_id.as_str()),
                        ("group", group.as_str()),
                        ("content", content.as_str()),
                        ("type", config_type.as_str()),
                        ("tenant", tenant.as_str()),
                    ])
                    .send()
                    .await?;
                let outcome = expect_true(response).await?;
                tracing::debug!(target_name = %target.name, %data_id, %group, "Saved Nacos config");
                Ok(outcome)
            }
            ConfigOperation::DeleteConfig {
                tenant,
                data_id,
                group,
            } => {
                let response = client
                    .delete(format!("{}/v1/cs/configs", base))
                    .query(&[
                        ("dataId", data_id.as_str()),
                        ("group", group.as_str()),
                        ("tenant", tenant.as_str()),
                    ])
                    .query(&auth)
                    .send()
                    .await?;
                let outcome = expect_true(response).await?;
                tracing::debug!(target_name = %target.name, %data_id, %group, "Deleted Nacos config");
                Ok(outcome)
            }
        }
    }
}
