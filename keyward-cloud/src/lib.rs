//! Keyward control plane client.
//!
//! The server only ever holds the account's public key. This crate talks
//! to it:
//! - JWT authentication with token refresh on 401
//! - Fetching and publishing the armored public key
//! - [`CloudKeyDirectory`], the [`keyward_vault::PublicKeyDirectory`]
//!   backed by the API

pub mod api_client;
pub mod config;
mod directory;
pub mod error;
pub mod types;

pub use api_client::CloudApiClient;
pub use config::CloudConfig;
pub use directory::CloudKeyDirectory;
pub use error::{CloudError, CloudResult};
pub use types::*;
