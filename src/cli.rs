use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Password;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::Config;
use crate::connectors::{ConfigOperation, JobOperation, KvOperation, Operation, SqlOperation};
use crate::registry::{NewTarget, TargetKind, TargetUpdate};

#[derive(Parser)]
#[command(name = "fleetgate")]
#[command(about = "Resolve. Decrypt. Dispatch. - Operate etcd, Nacos, Jenkins and SQL targets by name")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage registered targets
    Target {
        #[command(subcommand)]
        action: TargetAction,
    },

    /// Key-value store (etcd) operations
    Kv {
        #[command(subcommand)]
        action: KvAction,
    },

    /// Configuration center (Nacos) operations
    Nacos {
        #[command(subcommand)]
        action: NacosAction,
    },

    /// Job server (Jenkins) operations
    Jenkins {
        #[command(subcommand)]
        action: JenkinsAction,
    },

    /// Execute a SQL statement verbatim against a mysql or postgres target
    Sql {
        #[arg(help = "mysql or postgres")]
        kind: TargetKind,
        target: String,
        statement: String,
    },

    /// Show or initialize the fleetgate configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum TargetAction {
    Add {
        kind: TargetKind,
        name: String,

        #[arg(long, help = "Base URL (etcd/nacos/jenkins) or host:port (mysql/postgres)")]
        address: String,

        #[arg(long)]
        username: Option<String>,

        #[arg(long, help = "Prompt for the password instead of passing it on the command line")]
        prompt_password: bool,

        #[arg(long, env = "FLEETGATE_TARGET_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    List {
        kind: TargetKind,
    },
    Show {
        kind: TargetKind,
        id: Uuid,
    },
    Update {
        kind: TargetKind,
        id: Uuid,

        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long, help = "Prompt for a new password (empty keeps the current one)")]
        prompt_password: bool,

        #[arg(long, env = "FLEETGATE_TARGET_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Remove {
        kind: TargetKind,
        id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum KvAction {
    Keys { target: String },
    Get { target: String, key: String },
    Put { target: String, key: String, value: String },
    Delete { target: String, key: String },
}

#[derive(Subcommand)]
pub enum NacosAction {
    Namespaces {
        target: String,
    },
    Configs {
        target: String,
        #[arg(long, default_value_t = 100)]
        page_size: u32,
        #[arg(long, default_value = "")]
        tenant: String,
    },
    Save {
        target: String,
        #[arg(long, default_value = "")]
        tenant: String,
        #[arg(long)]
        data_id: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        content: String,
        #[arg(long = "type", default_value = "text")]
        config_type: String,
    },
    Delete {
        target: String,
        #[arg(long, default_value = "")]
        tenant: String,
        #[arg(long)]
        data_id: String,
        #[arg(long)]
        group: String,
    },
}

#[derive(Subcommand)]
pub enum JenkinsAction {
    Views {
        target: String,
    },
    Jobs {
        target: String,
        view: String,
    },
    Params {
        target: String,
        job: String,
    },
    Build {
        target: String,
        job: String,
        #[arg(short = 'p', long = "param", value_parser = parse_param, help = "KEY=VALUE, repeatable")]
        params: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets masked
    Show,
    /// Write a default config with a freshly generated vault key
    Init,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_password(prompt: bool, password: Option<String>, allow_empty: bool) -> Result<Option<String>> {
    if prompt {
        let entered = Password::new()
            .with_prompt("Password")
            .allow_empty_password(allow_empty)
            .interact()?;
        return Ok(Some(entered));
    }
    Ok(password)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { action } => match action {
            Some(ConfigAction::Init) => crate::config::init_config().await,
            Some(ConfigAction::Show) | None => crate::config::show_config().await,
        },
        Commands::Target { action } => run_target(action).await,
        Commands::Kv { action } => {
            let (target, op) = match action {
                KvAction::Keys { target } => (target, KvOperation::ListKeys),
                KvAction::Get { target, key } => (target, KvOperation::GetValue { key }),
                KvAction::Put { target, key, value } => {
                    (target, KvOperation::PutValue { key, value })
                }
                KvAction::Delete { target, key } => (target, KvOperation::DeleteValue { key }),
            };
            perform(&target, TargetKind::KeyValue, op.into()).await
        }
        Commands::Nacos { action } => {
            let (target, op) = match action {
                NacosAction::Namespaces { target } => (target, ConfigOperation::ListNamespaces),
                NacosAction::Configs {
                    target,
                    page_size,
                    tenant,
                } => (target, ConfigOperation::ListConfigs { page_size, tenant }),
                NacosAction::Save {
                    target,
                    tenant,
                    data_id,
                    group,
                    content,
                    config_type,
                } => (
                    target,
                    ConfigOperation::SaveConfig {
                        tenant,
                        data_id,
                        group,
                        content,
                        config_type,
                    },
                ),
                NacosAction::Delete {
                    target,
                    tenant,
                    data_id,
                    group,
                } => (
                    target,
                    ConfigOperation::DeleteConfig {
                        tenant,
                        data_id,
                        group,
                    },
                ),
            };
            perform(&target, TargetKind::ConfigCenter, op.into()).await
        }
        Commands::Jenkins { action } => {
            let (target, op) = match action {
                JenkinsAction::Views { target } => (target, JobOperation::ListViews),
                JenkinsAction::Jobs { target, view } => (target, JobOperation::ListJobs { view }),
                JenkinsAction::Params { target, job } => {
                    (target, JobOperation::GetBuildParameters { job })
                }
                JenkinsAction::Build {
                    target,
                    job,
                    params,
                } => (
                    target,
                    JobOperation::TriggerBuild {
                        job,
                        params: params.into_iter().collect::<BTreeMap<_, _>>(),
                    },
                ),
            };
            perform(&target, TargetKind::JobServer, op.into()).await
        }
        Commands::Sql {
            kind,
            target,
            statement,
        } => {
            if !kind.is_sql() {
                anyhow::bail!("sql requires a mysql or postgres target kind, got {}", kind);
            }
            perform(&target, kind, SqlOperation::ExecuteStatement { sql: statement }.into()).await
        }
    }
}

async fn perform(target: &str, kind: TargetKind, operation: Operation) -> Result<()> {
    let config = Config::load()?;
    let facade = config.build_facade().await?;
    let outcome = facade
        .perform(target, kind, operation)
        .await
        .with_context(|| format!("{} target '{}'", kind, target))?;
    print_json(&outcome)
}

async fn run_target(action: TargetAction) -> Result<()> {
    let config = Config::load()?;
    let facade = config.build_facade().await?;
    let registry = facade.registry();

    match action {
        TargetAction::Add {
            kind,
            name,
            address,
            username,
            prompt_password,
            password,
        } => {
            let password = read_password(prompt_password, password, false)?;
            let summary = registry
                .register(
                    kind,
                    NewTarget {
                        name,
                        address,
                        username,
                        password,
                    },
                )
                .await?;
            println!("✅ Registered {} target '{}'", kind, summary.name);
            print_json(&summary)
        }
        TargetAction::List { kind } => print_json(&registry.list(kind).await?),
        TargetAction::Show { kind, id } => print_json(&registry.get(kind, id).await?),
        TargetAction::Update {
            kind,
            id,
            address,
            username,
            prompt_password,
            password,
        } => {
            let password = read_password(prompt_password, password, true)?;
            let summary = registry
                .update(
                    kind,
                    id,
                    TargetUpdate {
                        address,
                        username,
                        password,
                    },
                )
                .await?;
            println!("✅ Updated {} target '{}'", kind, summary.name);
            print_json(&summary)
        }
        TargetAction::Remove { kind, id } => {
            registry.remove(kind, id).await?;
            println!("✅ Removed {} target {}", kind, id);
            Ok(())
        }
    }
}
