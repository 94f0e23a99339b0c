use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{base_url, http_client, read_body, Connector, JobOperation, Operation, Outcome};
use crate::error::DispatchError;
use crate::registry::{ResolvedTarget, TargetKind};

/// Parameter type used by the hidden-parameter plugin; never shown to operators.
pub const HIDDEN_PARAMETER_TYPE: &str = "WHideParameterDefinition";

const PARAMETERS_TREE: &str =
    "property[parameterDefinitions[name,type,description,defaultParameterValue[name,value]]]";

pub struct JenkinsConnector {
    timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_parameter_value: Option<ParameterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterValue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl ParameterDefinition {
    pub fn is_hidden(&self) -> bool {
        self.kind == HIDDEN_PARAMETER_TYPE
    }
}

#[derive(Debug, Deserialize)]
struct ViewsResponse {
    #[serde(default)]
    views: Vec<NamedItem>,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Crumb {
    crumb: String,
    crumb_request_field: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(default)]
    property: Vec<JobProperty>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobProperty {
    #[serde(default)]
    parameter_definitions: Vec<ParameterDefinition>,
}

/// `folder/sub/job` becomes `job/folder/job/sub/job/job` path segments.
pub fn job_segments(job: &str) -> Vec<String> {
    job.split('/')
        .filter(|segment| !segment.is_empty())
        .flat_map(|segment| ["job".to_string(), segment.to_string()])
        .collect()
}

/// Appends percent-encoded path segments (and an optional `tree` filter) to the target's base URL.
pub fn endpoint(
    base: &str,
    segments: &[String],
    tree: Option<&str>,
) -> Result<reqwest::Url, DispatchError> {
    let mut url = reqwest::Url::parse(base).map_err(|e| {
        DispatchError::InvalidTarget(format!("invalid Jenkins address '{}': {}", base, e))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            DispatchError::InvalidTarget(format!("Jenkins address '{}' cannot take a path", base))
        })?
        .pop_if_empty()
        .extend(segments);
    if let Some(tree) = tree {
        url.query_pairs_mut().append_pair("tree", tree);
    }
    Ok(url)
}

fn with_api_json(mut segments: Vec<String>) -> Vec<String> {
    segments.push("api".into());
    segments.push("json".into());
    segments
}

/// Keeps upstream order, dropping hidden definitions.
pub fn visible_parameters(definitions: Vec<ParameterDefinition>) -> Vec<ParameterDefinition> {
    definitions.into_iter().filter(|p| !p.is_hidden()).collect()
}

impl JenkinsConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        target: &ResolvedTarget,
        url: reqwest::Url,
    ) -> Result<T, DispatchError> {
        let response = authed(client.get(url), target).send().await?;
        let body = read_body(response, "Jenkins").await?;
        serde_json::from_str(&body)
            .map_err(|e| DispatchError::protocol(format!("invalid Jenkins response: {}", e)))
    }

    /// Every declared definition, hidden ones included.
    async fn parameter_definitions(
        &self,
        client: &reqwest::Client,
        target: &ResolvedTarget,
        base: &str,
        job: &str,
    ) -> Result<Vec<ParameterDefinition>, DispatchError> {
        let url = endpoint(base, &with_api_json(job_segments(job)), Some(PARAMETERS_TREE))?;
        let resp: JobResponse = self.get_json(client, target, url).await?;
        Ok(resp
            .property
            .into_iter()
            .flat_map(|p| p.parameter_definitions)
            .collect())
    }

    async fn crumb(
        &self,
        client: &reqwest::Client,
        target: &ResolvedTarget,
        base: &str,
    ) -> Result<Crumb, DispatchError> {
        let url = endpoint(base, &with_api_json(vec!["crumbIssuer".into()]), None)?;
        self.get_json(client, target, url).await
    }

    /// Posts a build request. A 403 is retried once with a CSRF crumb; when no
    /// crumb can be issued the 403 rejection is returned.
    async fn post_build(
        &self,
        client: &reqwest::Client,
        target: &ResolvedTarget,
        base: &str,
        url: reqwest::Url,
        params: &BTreeMap<String, String>,
    ) -> Result<(), DispatchError> {
        let response = authed(client.post(url.clone()).form(params), target)
            .send()
            .await?;
        let forbidden = response.status() == StatusCode::FORBIDDEN;
        let denied = match read_body(response, "Jenkins").await {
            Ok(_) => return Ok(()),
            Err(e) if forbidden => e,
            Err(e) => return Err(e),
        };

        let crumb = match self.crumb(client, target, base).await {
            Ok(crumb) => crumb,
            Err(e) => {
                tracing::debug!(error = %e, "Jenkins issued no crumb");
                return Err(denied);
            }
        };

        let response = authed(client.post(url).form(params), target)
            .header(crumb.crumb_request_field.as_str(), crumb.crumb.as_str())
            .send()
            .await?;
        read_body(response, "Jenkins").await?;
        Ok(())
    }
}

fn authed(request: reqwest::RequestBuilder, target: &ResolvedTarget) -> reqwest::RequestBuilder {
    if target.has_credentials() {
        request.basic_auth(target.username(), Some(target.password()))
    } else {
        request
    }
}

#[async_trait]
impl Connector for JenkinsConnector {
    fn kind(&self) -> TargetKind {
        TargetKind::JobServer
    }

    async fn execute(
        &self,
        target: &ResolvedTarget,
        operation: &Operation,
    ) -> Result<Outcome, DispatchError> {
        let Operation::Job(op) = operation else {
            return Err(operation.unsupported(self.kind()));
        };

        let client = http_client(self.timeout)?;
        let base = base_url(target)?;

        match op {
            JobOperation::ListViews => {
                let url = endpoint(&base, &with_api_json(Vec::new()), Some("views[name]"))?;
                let resp: ViewsResponse = self.get_json(&client, target, url).await?;
                Ok(Outcome::Views(resp.views.into_iter().map(|v| v.name).collect()))
            }
            JobOperation::ListJobs { view } => {
                let url = endpoint(
                    &base,
                    &with_api_json(vec!["view".into(), view.clone()]),
                    Some("jobs[name,url,color]"),
                )?;
                let resp: ViewResponse = self.get_json(&client, target, url).await?;
                Ok(Outcome::Jobs(resp.jobs))
            }
            JobOperation::GetBuildParameters { job } => {
                let definitions = self
                    .parameter_definitions(&client, target, &base, job)
                    .await?;
                Ok(Outcome::Parameters(visible_parameters(definitions)))
            }
            JobOperation::TriggerBuild { job, params } => {
                // Parameterized jobs only accept buildWithParameters, even when
                // every value is left at its default.
                let parameterized = !params.is_empty()
                    || !self
                        .parameter_definitions(&client, target, &base, job)
                        .await?
                        .is_empty();
                let mut segments = job_segments(job);
                segments.push(if parameterized { "buildWithParameters" } else { "build" }.into());
                let url = endpoint(&base, &segments, None)?;

                self.post_build(&client, target, &base, url, params).await?;
                tracing::info!(target_name = %target.name, %job, parameterized, "Triggered Jenkins build");
                Ok(Outcome::accepted())
            }
        }
    }
}
