use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ServiceCatalog;
use crate::config::KdfParams;
use crate::error::{CatalogError, Result};
use crate::models::ServiceRecord;
use crate::passphrase::{KDF_SALT_LEN, PassphraseTag, TAG_LEN, UnlockedKey};

pub const CATALOG_FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

// On-disk envelope. The KDF parameters travel with the file so a catalog
// written under one work factor stays readable after the local default
// changes. Binary fields are base64.
#[derive(Serialize, Deserialize)]
struct EnvelopeFile {
    version: u8,
    kdf: KdfParams,
    current: TagSpec,
    #[serde(default)]
    previous: Option<TagSpec>,
    nonce: String,
    data: String,
}

#[derive(Serialize, Deserialize)]
struct TagSpec {
    kdf_salt: String,
    key_tag: String,
}

#[derive(Serialize, Deserialize)]
struct CatalogPayload {
    services: Vec<ServiceRecord>,
}

fn tag_to_spec(tag: &PassphraseTag) -> TagSpec {
    TagSpec {
        kdf_salt: BASE64.encode(tag.kdf_salt),
        key_tag: BASE64.encode(tag.tag),
    }
}

fn spec_to_tag(spec: &TagSpec) -> Result<PassphraseTag> {
    let corrupted = |what: &str| CatalogError::Decryption(format!("corrupted envelope: {what}"));
    let kdf_salt: [u8; KDF_SALT_LEN] = BASE64
        .decode(&spec.kdf_salt)
        .map_err(|_| corrupted("salt encoding"))?
        .try_into()
        .map_err(|_| corrupted("salt length"))?;
    let tag: [u8; TAG_LEN] = BASE64
        .decode(&spec.key_tag)
        .map_err(|_| corrupted("tag encoding"))?
        .try_into()
        .map_err(|_| corrupted("tag length"))?;
    Ok(PassphraseTag { kdf_salt, tag })
}

/// Serialize the full record set (tombstones included, ascending
/// abbreviation) and encrypt it under the session key with a fresh nonce.
pub fn encode(catalog: &ServiceCatalog, key: &UnlockedKey) -> Result<Vec<u8>> {
    let payload = CatalogPayload {
        services: catalog.all_records().cloned().collect(),
    };
    let plaintext = serde_json::to_vec(&payload)
        .map_err(|e| CatalogError::Format(format!("serialization failed: {e}")))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.key_bytes()));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|e| CatalogError::Crypto(format!("encryption failed: {e}")))?;

    let envelope = EnvelopeFile {
        version: CATALOG_FORMAT_VERSION,
        kdf: key.kdf,
        current: tag_to_spec(&key.current),
        previous: key.previous.as_ref().map(tag_to_spec),
        nonce: BASE64.encode(nonce_bytes),
        data: BASE64.encode(&ciphertext),
    };
    let bytes = serde_json::to_string_pretty(&envelope)
        .map_err(|e| CatalogError::Format(format!("envelope serialization failed: {e}")))?
        .into_bytes();
    debug!(
        records = payload.services.len(),
        bytes = bytes.len(),
        "encoded catalog"
    );
    Ok(bytes)
}

/// Decrypt and rebuild a catalog. The passphrase is checked against the
/// stored validation tag before the expensive decrypt path, so a wrong
/// passphrase and a tampered file are reported as different conditions.
pub fn decode(bytes: &[u8], passphrase: &str) -> Result<(ServiceCatalog, UnlockedKey)> {
    let envelope: EnvelopeFile = serde_json::from_slice(bytes).map_err(|_| {
        CatalogError::Decryption("not a catalog file, or the file is corrupted".to_string())
    })?;
    if envelope.version != CATALOG_FORMAT_VERSION {
        return Err(CatalogError::Format(format!(
            "unsupported catalog version: {}",
            envelope.version
        )));
    }

    let current = spec_to_tag(&envelope.current)?;
    let previous = envelope
        .previous
        .as_ref()
        .map(spec_to_tag)
        .transpose()?;
    let key = UnlockedKey::unlock(passphrase, envelope.kdf, current, previous)?;

    let nonce_bytes = BASE64
        .decode(&envelope.nonce)
        .map_err(|_| CatalogError::Decryption("corrupted envelope: nonce".to_string()))?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CatalogError::Decryption(
            "corrupted envelope: nonce length".to_string(),
        ));
    }
    let ciphertext = BASE64
        .decode(&envelope.data)
        .map_err(|_| CatalogError::Decryption("corrupted envelope: data".to_string()))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.key_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| {
            CatalogError::Decryption("catalog file is corrupted or was tampered with".to_string())
        })?;

    let payload: CatalogPayload = serde_json::from_slice(&plaintext)
        .map_err(|e| CatalogError::Format(format!("invalid catalog structure: {e}")))?;
    let catalog = ServiceCatalog::from_records(payload.services)?;
    debug!(records = catalog.all_records().count(), "decoded catalog");
    Ok((catalog, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceRecord;

    fn test_kdf() -> KdfParams {
        KdfParams {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn sample_catalog() -> ServiceCatalog {
        let mut catalog = ServiceCatalog::new();
        catalog.upsert(ServiceRecord::new("mail")).unwrap();
        catalog.upsert(ServiceRecord::new("bank")).unwrap();
        catalog.upsert(ServiceRecord::new("shop")).unwrap();
        catalog.soft_delete("shop");
        catalog
    }

    #[test]
    fn round_trip_preserves_catalog_and_tombstones() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let catalog = sample_catalog();

        let bytes = encode(&catalog, &key).unwrap();
        let (decoded, decoded_key) = decode(&bytes, "open sesame").unwrap();

        assert_eq!(decoded, catalog);
        assert!(decoded.get("shop").unwrap().deleted);
        assert_eq!(decoded_key.key_bytes(), key.key_bytes());
    }

    #[test]
    fn round_trip_preserves_previous_passphrase_material() {
        let key = UnlockedKey::create("old pass", test_kdf()).unwrap();
        let rotated = key.rotate("old pass", "new pass", test_kdf()).unwrap();

        let bytes = encode(&sample_catalog(), &rotated).unwrap();
        let (_, decoded_key) = decode(&bytes, "new pass").unwrap();

        assert!(decoded_key.validate_previous("old pass").unwrap());
    }

    #[test]
    fn empty_catalog_round_trips() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let bytes = encode(&ServiceCatalog::new(), &key).unwrap();
        let (decoded, _) = decode(&bytes, "open sesame").unwrap();
        assert_eq!(decoded.all_records().count(), 0);
    }

    #[test]
    fn wrong_passphrase_is_reported_as_such() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let bytes = encode(&sample_catalog(), &key).unwrap();

        let result = decode(&bytes, "open sesame!");
        assert!(matches!(result, Err(CatalogError::WrongPassphrase)));
    }

    #[test]
    fn fresh_nonce_per_encode() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let catalog = sample_catalog();
        let a = encode(&catalog, &key).unwrap();
        let b = encode(&catalog, &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_input_is_not_an_empty_catalog() {
        let result = decode(b"definitely not an envelope", "open sesame");
        assert!(matches!(result, Err(CatalogError::Decryption(_))));
    }

    #[test]
    fn any_flipped_byte_fails_decode() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let catalog = sample_catalog();
        let bytes = encode(&catalog, &key).unwrap();

        for i in (0..bytes.len()).step_by(7) {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let result = decode(&tampered, "open sesame");
            assert!(result.is_err(), "flip at byte {i} decoded successfully");
        }
    }

    #[test]
    fn tampered_ciphertext_is_a_decryption_error() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let bytes = encode(&sample_catalog(), &key).unwrap();

        // flip one character inside the base64 payload only
        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let data = envelope["data"].as_str().unwrap().to_string();
        let mut chars: Vec<char> = data.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        envelope["data"] = serde_json::Value::String(chars.into_iter().collect());
        let tampered = serde_json::to_vec(&envelope).unwrap();

        let result = decode(&tampered, "open sesame");
        assert!(matches!(result, Err(CatalogError::Decryption(_))));
    }

    #[test]
    fn unsupported_version_is_reported() {
        let key = UnlockedKey::create("open sesame", test_kdf()).unwrap();
        let bytes = encode(&sample_catalog(), &key).unwrap();

        let mut envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        envelope["version"] = serde_json::Value::from(99);
        let altered = serde_json::to_vec(&envelope).unwrap();

        let result = decode(&altered, "open sesame");
        assert!(matches!(result, Err(CatalogError::Format(_))));
    }
}
