//! Derivault: deterministic password derivation over an encrypted,
//! mergeable service catalog.
//!
//! No password is ever stored. Each service keeps only non-secret metadata;
//! its password is re-derived on demand from the master passphrase plus
//! that metadata ([`derive::derive`]). The catalog itself is persisted as a
//! single authenticated-encrypted file ([`store`]) and reconciles divergent
//! copies with last-writer-wins merge over soft-deleted tombstones
//! ([`catalog::ServiceCatalog::merge`]).

pub mod catalog;
pub mod codec;
pub mod config;
pub mod derive;
pub mod error;
pub mod models;
pub mod passphrase;
pub mod store;

pub use catalog::ServiceCatalog;
pub use config::{CoreConfig, KdfParams, PasswordPolicy};
pub use error::{CatalogError, Result};
pub use models::{PassphraseEpoch, ServiceRecord};
pub use passphrase::UnlockedKey;
