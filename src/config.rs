use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::connectors::BackendDispatcher;
use crate::facade::OperationFacade;
use crate::registry::{FileStore, PostgresStore, TargetRegistry, TargetStore};
use crate::vault::CredentialVault;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hex-encoded 32-byte credential key.
    #[serde(default)]
    pub vault_key: Option<String>,

    #[serde(default = "default_dispatch_timeout_seconds")]
    pub dispatch_timeout_seconds: u64,

    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_dispatch_timeout_seconds() -> u64 {
    5
}

fn default_store_path() -> PathBuf {
    Config::fleetgate_dir().join("targets.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            database_url: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_key: None,
            dispatch_timeout_seconds: default_dispatch_timeout_seconds(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        std::env::var("FLEETGATE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::fleetgate_dir().join("config.toml"))
    }

    pub fn fleetgate_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fleetgate")
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds.max(1))
    }

    pub fn vault(&self) -> Result<CredentialVault> {
        let key = self
            .vault_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("FLEETGATE_VAULT_KEY not configured"))?;
        CredentialVault::from_hex(key).context("Invalid vault key (expected 64 hex characters)")
    }

    pub async fn open_store(&self) -> Result<Arc<dyn TargetStore>> {
        match self.store.backend {
            StoreBackend::File => {
                let store = FileStore::new(&self.store.path).with_context(|| {
                    format!("Failed to open target store at {}", self.store.path.display())
                })?;
                Ok(Arc::new(store))
            }
            StoreBackend::Postgres => {
                let url = self
                    .store
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not configured"))?;
                let store = PostgresStore::connect(url, self.dispatch_timeout())
                    .await
                    .context("Failed to connect to target database")?;
                Ok(Arc::new(store))
            }
        }
    }

    pub async fn build_facade(&self) -> Result<OperationFacade> {
        let vault = self.vault()?;
        let store = self.open_store().await?;
        let registry = TargetRegistry::new(store, vault);
        let dispatcher = BackendDispatcher::with_defaults(self.dispatch_timeout());
        Ok(OperationFacade::new(registry, Arc::new(dispatcher)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLEETGATE_VAULT_KEY") {
            self.vault_key = Some(val);
        }

        if let Ok(val) = std::env::var("FLEETGATE_DISPATCH_TIMEOUT_SECONDS") {
            if let Ok(seconds) = val.parse() {
                self.dispatch_timeout_seconds = seconds;
            }
        }

        if let Ok(path) = std::env::var("FLEETGATE_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.store.database_url = Some(url);
            self.store.backend = StoreBackend::Postgres;
        }
    }

    fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.vault_key = masked
            .vault_key
            .as_deref()
            .map(crate::connectors::mask_secret);
        masked.store.database_url = masked
            .store
            .database_url
            .as_deref()
            .map(crate::connectors::mask_secret);
        masked
    }
}

pub async fn show_config() -> Result<()> {
    let config = Config::load()?;
    println!("{}", toml::to_string_pretty(&config.masked())?);
    Ok(())
}

pub async fn init_config() -> Result<()> {
    let config_path = Config::config_path();

    if config_path.exists() {
        anyhow::bail!("Config file already exists at: {}", config_path.display());
    }

    let config = Config {
        vault_key: Some(CredentialVault::generate_key_hex()),
        ..Config::default()
    };
    config.save()?;

    println!("Initialized config at: {}", config_path.display());
    println!("⚠️  The vault key in this file decrypts every stored credential. Keep it safe.");
    Ok(())
}
