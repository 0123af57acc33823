//! Language type: validated language representation.
//!
//! A `Language` can only be built from a code present in the registry, so
//! anything holding one can rely on the lookup tables keyed by it.

use crate::i18n::{LanguageConfig, LanguageGroup, LanguageRegistry};
use anyhow::{bail, Result};
use std::fmt;

/// A validated language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    code: &'static str,
}

impl Language {
    pub const ENGLISH: Language = Language { code: "en" };
    pub const HEBREW: Language = Language { code: "he" };
    pub const RUSSIAN: Language = Language { code: "ru" };

    /// Create a Language from a language code string.
    ///
    /// # Returns
    /// * `Ok(Language)` if the code is registered
    /// * `Err` if the code is unknown
    pub fn from_code(code: &str) -> Result<Language> {
        match LanguageRegistry::get().get_by_code(code) {
            Some(config) => Ok(Language { code: config.code }),
            None => bail!("Unknown language code: '{}'", code),
        }
    }

    /// All supported languages, in registry order.
    pub fn all() -> Vec<Language> {
        LanguageRegistry::get()
            .codes()
            .into_iter()
            .map(|code| Language { code })
            .collect()
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the full language configuration from the registry.
    ///
    /// # Panics
    /// Panics if the code is not registered, which cannot happen for a
    /// Language built through `from_code`, `all` or the constants.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    pub fn name(&self) -> &'static str {
        self.config().name
    }

    pub fn is_in(&self, group: LanguageGroup) -> bool {
        group.contains(self.code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}
