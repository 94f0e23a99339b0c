pub mod cli;
pub mod config;
pub mod connectors;
pub mod error;
pub mod facade;
pub mod registry;
pub mod vault;

pub use error::{DispatchError, Error, RegistryError, VaultError};
pub use facade::OperationFacade;
