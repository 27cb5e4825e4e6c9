use std::collections::BTreeMap;

use crate::error::{CatalogError, Result};
use crate::models::{PassphraseEpoch, ServiceRecord, now_millis};

/// In-memory service catalog, keyed and iterated by ascending abbreviation
/// so serialization is deterministic. Deletions are tombstones: the record
/// stays, flagged, so divergent copies of the same file merge without a
/// deletion ever reappearing as silent data loss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    records: BTreeMap<String, ServiceRecord>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog from a decoded record list. Duplicate or empty
    /// abbreviations mean the plaintext is structurally broken.
    pub fn from_records(records: Vec<ServiceRecord>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for record in records {
            if record.abbreviation.is_empty() {
                return Err(CatalogError::Format(
                    "record with empty abbreviation".to_string(),
                ));
            }
            let abbreviation = record.abbreviation.clone();
            if map.insert(abbreviation.clone(), record).is_some() {
                return Err(CatalogError::Format(format!(
                    "duplicate abbreviation: {abbreviation}"
                )));
            }
        }
        Ok(Self { records: map })
    }

    pub fn get(&self, abbreviation: &str) -> Option<&ServiceRecord> {
        self.records.get(abbreviation)
    }

    /// Insert or replace, stamping a strictly increasing logical timestamp
    /// and clearing any tombstone.
    pub fn upsert(&mut self, mut record: ServiceRecord) -> Result<()> {
        if record.abbreviation.is_empty() {
            return Err(CatalogError::Validation(
                "service abbreviation must not be empty".to_string(),
            ));
        }
        let prev = self
            .records
            .get(&record.abbreviation)
            .map(|r| r.last_update)
            .unwrap_or(0);
        record.last_update = now_millis().max(prev + 1);
        record.deleted = false;
        self.records.insert(record.abbreviation.clone(), record);
        Ok(())
    }

    /// Tombstone a record. Returns whether it was present; deleting an
    /// absent abbreviation is a no-op.
    pub fn soft_delete(&mut self, abbreviation: &str) -> bool {
        match self.records.get_mut(abbreviation) {
            Some(record) => {
                record.deleted = true;
                record.last_update = now_millis().max(record.last_update + 1);
                true
            }
            None => false,
        }
    }

    /// Non-deleted records, ascending abbreviation. Display path.
    pub fn services(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.values().filter(|r| r.is_active())
    }

    /// Every record including tombstones. Export, merge and codec path.
    pub fn all_records(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.values()
    }

    pub fn any_on_previous_passphrase(&self) -> bool {
        self.records
            .values()
            .any(|r| r.is_active() && r.passphrase_epoch == PassphraseEpoch::Previous)
    }

    /// Mark every active record as derived with the previous passphrase.
    /// Applied when the master passphrase rotates.
    pub fn mark_all_previous(&mut self) {
        for record in self.records.values_mut() {
            if record.is_active() {
                record.passphrase_epoch = PassphraseEpoch::Previous;
            }
        }
    }

    /// Last-writer-wins union of two independently edited copies. Later
    /// `last_update` wins; ties favor the non-deleted record; remaining
    /// ties fall back to a total order on content, so the result does not
    /// depend on which side is local. Tombstones are never dropped.
    pub fn merge(&self, remote: &ServiceCatalog) -> ServiceCatalog {
        let mut merged = self.records.clone();
        for (abbreviation, theirs) in &remote.records {
            let keep_ours = match merged.get(abbreviation) {
                Some(ours) => wins_over(ours, theirs),
                None => false,
            };
            if !keep_ours {
                merged.insert(abbreviation.clone(), theirs.clone());
            }
        }
        ServiceCatalog { records: merged }
    }
}

fn wins_over(a: &ServiceRecord, b: &ServiceRecord) -> bool {
    if a.last_update != b.last_update {
        return a.last_update > b.last_update;
    }
    if a.deleted != b.deleted {
        return !a.deleted;
    }
    merge_rank(a) > merge_rank(b)
}

// Arbitrary but symmetric content order for exact-timestamp conflicts.
fn merge_rank(r: &ServiceRecord) -> (&str, &str, &str, &str, u8) {
    let epoch = match r.passphrase_epoch {
        PassphraseEpoch::Current => 0,
        PassphraseEpoch::Previous => 1,
    };
    (
        &r.additional_info,
        &r.login_url,
        &r.login_info,
        &r.additional_login_info,
        epoch,
    )
}
