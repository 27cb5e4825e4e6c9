use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

// Character repertoire for generated passwords. Every installation sharing
// a catalog file must run with identical policy values, otherwise the same
// service derives different passwords on different machines.
pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";
pub const SPECIALS: &str = ",.;:!$&()=?+-*/#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Output shape of derived passwords: target length plus the character
/// classes that must each contribute at least one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digits: bool,
    pub require_specials: bool,
    pub uppercase: String,
    pub lowercase: String,
    pub digits: String,
    pub specials: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 16,
            require_uppercase: true,
            require_lowercase: true,
            require_digits: true,
            require_specials: true,
            uppercase: UPPERCASE.to_string(),
            lowercase: LOWERCASE.to_string(),
            digits: DIGITS.to_string(),
            specials: SPECIALS.to_string(),
        }
    }
}

impl PasswordPolicy {
    pub fn required_classes(&self) -> Vec<Vec<char>> {
        let mut classes = Vec::new();
        if self.require_uppercase {
            classes.push(self.uppercase.chars().collect());
        }
        if self.require_lowercase {
            classes.push(self.lowercase.chars().collect());
        }
        if self.require_digits {
            classes.push(self.digits.chars().collect());
        }
        if self.require_specials {
            classes.push(self.specials.chars().collect());
        }
        classes
    }

    pub fn alphabet(&self) -> Vec<char> {
        let mut all = Vec::new();
        for class in self.required_classes() {
            all.extend(class);
        }
        all
    }

    pub fn validate(&self) -> Result<()> {
        let classes = self.required_classes();
        if classes.is_empty() {
            return Err(CatalogError::Validation(
                "password policy enables no character class".to_string(),
            ));
        }
        if self.length < classes.len() {
            return Err(CatalogError::Validation(format!(
                "password length {} cannot cover {} required character classes",
                self.length,
                classes.len()
            )));
        }
        for class in &classes {
            if class.is_empty() {
                return Err(CatalogError::Validation(
                    "required character class has an empty charset".to_string(),
                ));
            }
            if class.len() > 256 {
                return Err(CatalogError::Validation(
                    "charset exceeds 256 characters".to_string(),
                ));
            }
        }
        if self.alphabet().len() > 256 {
            return Err(CatalogError::Validation(
                "combined alphabet exceeds 256 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide configuration, loaded once at startup by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub kdf: KdfParams,
    #[serde(default)]
    pub policy: PasswordPolicy,
}

impl CoreConfig {
    pub fn load(path: &Path) -> Result<Option<CoreConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let cfg: CoreConfig = serde_json::from_str(&raw)
            .map_err(|e| CatalogError::Format(format!("invalid config file: {e}")))?;
        cfg.policy.validate()?;
        Ok(Some(cfg))
    }
}
