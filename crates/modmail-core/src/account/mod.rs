//! Account management: the settings model, validation, the on-disk
//! config store and the secret vault.

pub mod credentials;
mod model;
mod store;
mod validation;

pub use credentials::{
    CredentialError, CredentialResult, CredentialVault, KeyringVault, MemoryVault, SERVICE_NAME,
};
pub use model::{Account, ConnectionSettings};
pub use store::{ConfigError, ConfigStore};
pub(crate) use validation::validate_secret;
pub use validation::{ValidationError, ValidationResult, validate_account};
