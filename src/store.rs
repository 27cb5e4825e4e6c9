use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::catalog::ServiceCatalog;
use crate::codec;
use crate::config::KdfParams;
use crate::error::{CatalogError, Result};
use crate::passphrase::UnlockedKey;

/// Read and decrypt a catalog file. A missing file or unreadable path is an
/// I/O error; a wrong passphrase surfaces as `WrongPassphrase`, not as a
/// generic failure.
pub fn load(path: &Path, passphrase: &str) -> Result<(ServiceCatalog, UnlockedKey)> {
    debug!(path = %path.display(), "loading catalog");
    let bytes = fs::read(path)?;
    let (catalog, key) = codec::decode(&bytes, passphrase)?;
    info!(
        path = %path.display(),
        records = catalog.all_records().count(),
        "catalog loaded"
    );
    Ok((catalog, key))
}

/// Fresh empty catalog with new key material. Touches no file; the first
/// `save` creates it.
pub fn create(passphrase: &str, kdf: KdfParams) -> Result<(ServiceCatalog, UnlockedKey)> {
    let key = UnlockedKey::create(passphrase, kdf)?;
    Ok((ServiceCatalog::new(), key))
}

/// Encrypt and persist. The bytes go to a temporary file in the target
/// directory first and replace the destination in one rename, so an
/// interrupted write leaves the previous file readable. The temp file is
/// removed on every early exit.
pub fn save(path: &Path, catalog: &ServiceCatalog, key: &UnlockedKey) -> Result<()> {
    let bytes = codec::encode(catalog, key)?;
    atomic_write(path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "catalog saved");
    Ok(())
}

/// Switch the catalog to a new master passphrase. All active records move
/// to the previous-passphrase epoch and migrate back one by one via
/// explicit re-derivation. Only one transition window may be open: rotation
/// is refused while any record still derives with the previous passphrase.
pub fn rotate_passphrase(
    catalog: &mut ServiceCatalog,
    key: &UnlockedKey,
    current_passphrase: &str,
    new_passphrase: &str,
    kdf: KdfParams,
) -> Result<UnlockedKey> {
    if catalog.any_on_previous_passphrase() {
        return Err(CatalogError::Validation(
            "records still use the previous passphrase; re-derive them before rotating again"
                .to_string(),
        ));
    }
    let rotated = key.rotate(current_passphrase, new_passphrase, kdf)?;
    catalog.mark_all_previous();
    info!("passphrase rotated");
    Ok(rotated)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CatalogError::Validation("invalid catalog path".to_string()))?;
    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| CatalogError::Io { source: e.error })?;
    Ok(())
}
