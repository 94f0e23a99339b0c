use uuid::Uuid;

use crate::registry::TargetKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("invalid key size: expected 32 bytes, got {0}")]
    InvalidKeySize(usize),

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("decryption failed")]
    Decryption,

    #[error("encryption failed")]
    Encryption,
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("{kind} target '{name}' already exists")]
    DuplicateName { kind: TargetKind, name: String },

    #[error("{kind} target '{key}' not found")]
    NotFound { kind: TargetKind, key: String },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Stored credentials for the named target could not be decrypted.
    #[error("failed to decrypt credentials for {kind} target '{name}'")]
    Decryption { kind: TargetKind, name: String },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn not_found_id(kind: TargetKind, id: Uuid) -> Self {
        Self::NotFound {
            kind,
            key: id.to_string(),
        }
    }

    pub fn not_found_name(kind: TargetKind, name: &str) -> Self {
        Self::NotFound {
            kind,
            key: name.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    BackendRejected(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("operation '{operation}' is not supported by {kind} targets")]
    UnsupportedOperation {
        kind: TargetKind,
        operation: &'static str,
    },

    #[error("invalid target address: {0}")]
    InvalidTarget(String),
}

impl DispatchError {
    pub fn connect<S: Into<String>>(message: S) -> Self {
        Self::Connect(message.into())
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::BackendRejected(message.into())
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            Self::Connect(e.to_string())
        } else {
            Self::Protocol(e.to_string())
        }
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => Self::BackendRejected(db.message().to_string()),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                Self::Connect(e.to_string())
            }
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for DispatchError {
    fn from(e: tokio_postgres::Error) -> Self {
        if let Some(db) = e.as_db_error() {
            return Self::BackendRejected(db.message().to_string());
        }
        if e.is_closed() {
            return Self::Connect(e.to_string());
        }
        Self::Protocol(e.to_string())
    }
}

/// Error returned by [`crate::facade::OperationFacade::perform`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl Error {
    /// True when either the target or the addressed key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Registry(RegistryError::NotFound { .. })
                | Error::Dispatch(DispatchError::KeyNotFound(_))
        )
    }

    pub fn is_misconfigured(&self) -> bool {
        matches!(
            self,
            Error::Registry(RegistryError::Decryption { .. })
                | Error::Dispatch(DispatchError::InvalidTarget(_))
                | Error::Dispatch(DispatchError::UnsupportedOperation { .. })
        )
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Dispatch(DispatchError::Connect(_)))
    }
}
