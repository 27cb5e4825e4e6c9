use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Failure kinds surfaced by the catalog core. The caller's remediation
/// differs per variant, so nothing here is ever collapsed into a default
/// value: wrong passphrase means re-prompt, a corrupted file means stop,
/// an I/O error means the previous file on disk is still intact.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("catalog decryption failed: {0}")]
    Decryption(String),

    #[error("malformed catalog: {0}")]
    Format(String),

    #[error("i/o error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("crypto failure: {0}")]
    Crypto(String),
}
