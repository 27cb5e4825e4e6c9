use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::KdfParams;
use crate::error::{CatalogError, Result};

pub const KEY_LEN: usize = 32;
pub const KDF_SALT_LEN: usize = 16;
pub const TAG_LEN: usize = 32;

/// Key material derived from a master passphrase, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Non-secret validation tag: a one-way fingerprint of the key. Proves
    /// a candidate passphrase correct without storing anything invertible
    /// short of the full KDF work factor per guess.
    pub fn tag(&self) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey").field("key", &"[redacted]").finish()
    }
}

pub fn derive_key(passphrase: &str, salt: &[u8], params: KdfParams) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(CatalogError::Validation(
            "passphrase must not be empty".to_string(),
        ));
    }
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| CatalogError::Crypto(format!("invalid KDF params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CatalogError::Crypto(format!("key derivation failed: {e}")))?;
    Ok(DerivedKey { key })
}

/// Salt and tag pair persisted for one passphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassphraseTag {
    pub kdf_salt: [u8; KDF_SALT_LEN],
    pub tag: [u8; TAG_LEN],
}

impl PassphraseTag {
    fn for_passphrase(passphrase: &str, params: KdfParams) -> Result<(Self, DerivedKey)> {
        let mut kdf_salt = [0u8; KDF_SALT_LEN];
        OsRng.fill_bytes(&mut kdf_salt);
        let key = derive_key(passphrase, &kdf_salt, params)?;
        let tag = Self {
            kdf_salt,
            tag: key.tag(),
        };
        Ok((tag, key))
    }

    pub fn matches(&self, passphrase: &str, params: KdfParams) -> Result<bool> {
        let key = derive_key(passphrase, &self.kdf_salt, params)?;
        Ok(key.tag() == self.tag)
    }
}

/// Session key material for an opened catalog: the encryption key, the
/// validation material it was checked against, and the previous passphrase's
/// material while a rotation transition window is open.
pub struct UnlockedKey {
    key: DerivedKey,
    pub kdf: KdfParams,
    pub current: PassphraseTag,
    pub previous: Option<PassphraseTag>,
}

impl UnlockedKey {
    /// Fresh material for a brand-new catalog.
    pub fn create(passphrase: &str, params: KdfParams) -> Result<UnlockedKey> {
        let (current, key) = PassphraseTag::for_passphrase(passphrase, params)?;
        Ok(UnlockedKey {
            key,
            kdf: params,
            current,
            previous: None,
        })
    }

    /// Re-derive the key for stored material and check it against the tag.
    /// The tag mismatch case is the user-facing wrong-passphrase condition,
    /// reported before any ciphertext is touched.
    pub fn unlock(
        passphrase: &str,
        params: KdfParams,
        current: PassphraseTag,
        previous: Option<PassphraseTag>,
    ) -> Result<UnlockedKey> {
        let key = derive_key(passphrase, &current.kdf_salt, params)?;
        if key.tag() != current.tag {
            return Err(CatalogError::WrongPassphrase);
        }
        Ok(UnlockedKey {
            key,
            kdf: params,
            current,
            previous,
        })
    }

    pub fn key_bytes(&self) -> &[u8; KEY_LEN] {
        self.key.as_bytes()
    }

    pub fn validate(&self, passphrase: &str) -> Result<bool> {
        self.current.matches(passphrase, self.kdf)
    }

    /// Check a candidate against the retained previous passphrase, needed to
    /// derive passwords for records still on the pre-rotation passphrase.
    pub fn validate_previous(&self, passphrase: &str) -> Result<bool> {
        match &self.previous {
            Some(previous) => previous.matches(passphrase, self.kdf),
            None => Ok(false),
        }
    }

    /// Swap in a new passphrase after verifying the current one. Both
    /// passphrases get fresh salts and tags under `params`; the outgoing
    /// one is retained for the transition window.
    pub fn rotate(
        &self,
        current_passphrase: &str,
        new_passphrase: &str,
        params: KdfParams,
    ) -> Result<UnlockedKey> {
        if !self.validate(current_passphrase)? {
            return Err(CatalogError::WrongPassphrase);
        }
        if new_passphrase.is_empty() {
            return Err(CatalogError::Validation(
                "new passphrase must not be empty".to_string(),
            ));
        }
        let (previous, _) = PassphraseTag::for_passphrase(current_passphrase, params)?;
        let (current, key) = PassphraseTag::for_passphrase(new_passphrase, params)?;
        Ok(UnlockedKey {
            key,
            kdf: params,
            current,
            previous: Some(previous),
        })
    }
}

impl std::fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("key", &"[redacted]")
            .field("kdf", &self.kdf)
            .field("previous", &self.previous.is_some())
            .finish()
    }
}
