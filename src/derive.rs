use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::config::{KdfParams, PasswordPolicy};
use crate::error::{CatalogError, Result};
use crate::models::ServiceRecord;
use crate::passphrase::derive_key;

// Separator between salt inputs, so ("ab", "c") and ("a", "bc") hash apart.
const SALT_SEPARATOR: u8 = 0x1f;

/// Deterministic byte stream seeded from KDF output: block i is
/// SHA-256(seed || i as big-endian u64), consumed front to back. No clock,
/// no RNG, no platform dependence anywhere on this path.
struct EntropyStream {
    seed: [u8; 32],
    block: [u8; 32],
    pos: usize,
    counter: u64,
}

impl EntropyStream {
    fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            block: [0u8; 32],
            pos: 32,
            counter: 0,
        }
    }

    fn next_byte(&mut self) -> u8 {
        if self.pos == self.block.len() {
            let mut hasher = Sha256::new();
            hasher.update(self.seed);
            hasher.update(self.counter.to_be_bytes());
            self.block = hasher.finalize().into();
            self.counter += 1;
            self.pos = 0;
        }
        let byte = self.block[self.pos];
        self.pos += 1;
        byte
    }

    // Unbiased index in 0..limit: bytes past the largest multiple of limit
    // are discarded instead of wrapped.
    fn next_index(&mut self, limit: usize) -> usize {
        debug_assert!(limit > 0 && limit <= 256);
        let bound = 256 - (256 % limit);
        loop {
            let byte = self.next_byte() as usize;
            if byte < bound {
                return byte % limit;
            }
        }
    }
}

impl Drop for EntropyStream {
    fn drop(&mut self) {
        self.seed.zeroize();
        self.block.zeroize();
    }
}

fn service_salt(abbreviation: &str, additional_info: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(abbreviation.as_bytes());
    hasher.update([SALT_SEPARATOR]);
    hasher.update(additional_info.as_bytes());
    hasher.finalize().into()
}

/// Derive the password for a service. Pure: identical
/// `(passphrase, abbreviation, additional_info, policy, kdf)` always yields
/// the identical string; no other record field participates.
pub fn derive(
    passphrase: &str,
    record: &ServiceRecord,
    policy: &PasswordPolicy,
    kdf: KdfParams,
) -> Result<String> {
    if passphrase.is_empty() {
        return Err(CatalogError::Validation(
            "passphrase must not be empty".to_string(),
        ));
    }
    if record.abbreviation.is_empty() {
        return Err(CatalogError::Validation(
            "service abbreviation must not be empty".to_string(),
        ));
    }
    policy.validate()?;

    let salt = service_salt(&record.abbreviation, &record.additional_info);
    let seed = derive_key(passphrase, &salt, kdf)?;
    let mut stream = EntropyStream::new(*seed.as_bytes());

    // One character from every required class first, then fill from the
    // combined alphabet, then a deterministic Fisher-Yates so the class
    // representatives do not sit at fixed positions.
    let mut chars: Vec<char> = Vec::with_capacity(policy.length);
    for class in policy.required_classes() {
        chars.push(class[stream.next_index(class.len())]);
    }
    let alphabet = policy.alphabet();
    while chars.len() < policy.length {
        chars.push(alphabet[stream.next_index(alphabet.len())]);
    }
    for i in (1..chars.len()).rev() {
        let j = stream.next_index(i + 1);
        chars.swap(i, j);
    }

    Ok(chars.into_iter().collect())
}
