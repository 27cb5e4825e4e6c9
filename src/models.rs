use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

/// Which master passphrase a record's password is derived with. `Previous`
/// marks a record still on the pre-rotation passphrase; the only way back to
/// `Current` is an explicit re-derivation via [`ServiceRecord::use_current_passphrase`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PassphraseEpoch {
    #[default]
    Current,
    Previous,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub abbreviation: String,
    #[serde(default)]
    pub additional_info: String,
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub login_info: String,
    #[serde(default)]
    pub additional_login_info: String,
    #[serde(default)]
    pub passphrase_epoch: PassphraseEpoch,
    #[serde(default)]
    pub last_update: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl ServiceRecord {
    pub fn new(abbreviation: impl Into<String>) -> Self {
        Self {
            abbreviation: abbreviation.into(),
            additional_info: current_date(),
            login_url: String::new(),
            login_info: String::new(),
            additional_login_info: String::new(),
            passphrase_epoch: PassphraseEpoch::Current,
            last_update: 0,
            deleted: false,
        }
    }

    pub fn reset_additional_info(&mut self) {
        self.additional_info = current_date();
    }

    /// Move the record back to the current passphrase after a rotation.
    /// Resets the additional info to today's date, so the newly derived
    /// password differs from the one the old passphrase produced.
    pub fn use_current_passphrase(&mut self) {
        self.reset_additional_info();
        self.passphrase_epoch = PassphraseEpoch::Current;
    }

    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}

pub fn current_date() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
