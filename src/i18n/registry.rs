//! Language registry: Single source of truth for all supported languages.
//!
//! Every language the search backend indexes is listed here. The registry is
//! initialized once through `OnceLock` and is immutable thereafter.

use std::sync::OnceLock;

/// Configuration for a supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Language code used in index names and artifact paths (e.g., "en", "he")
    pub code: &'static str,

    /// English name of the language (e.g., "English", "Hebrew")
    pub name: &'static str,
}

/// Global language registry singleton.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

/// Global registry instance (initialized lazily)
static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Get a language configuration by its code.
    ///
    /// # Returns
    /// * `Some(&LanguageConfig)` if the language exists
    /// * `None` if the language is not found
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Get all languages, in registry order.
    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    /// All language codes, in registry order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.languages.iter().map(|lang| lang.code).collect()
    }

    /// Check if a language code is supported.
    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }
}

macro_rules! languages {
    ($($code:literal => $name:literal),* $(,)?) => {
        vec![$(LanguageConfig { code: $code, name: $name }),*]
    };
}

/// Default language configurations.
///
/// Ukrainian keeps the historical "ua" code: downstream consumers read
/// `results-ua.json`.
fn default_languages() -> Vec<LanguageConfig> {
    languages![
        "en" => "English",
        "he" => "Hebrew",
        "ru" => "Russian",
        "es" => "Spanish",
        "it" => "Italian",
        "de" => "German",
        "nl" => "Dutch",
        "fr" => "French",
        "pt" => "Portuguese",
        "tr" => "Turkish",
        "pl" => "Polish",
        "ar" => "Arabic",
        "hu" => "Hungarian",
        "fi" => "Finnish",
        "lt" => "Lithuanian",
        "ja" => "Japanese",
        "bg" => "Bulgarian",
        "ka" => "Georgian",
        "no" => "Norwegian",
        "sv" => "Swedish",
        "hr" => "Croatian",
        "zh" => "Chinese",
        "fa" => "Persian",
        "ro" => "Romanian",
        "hi" => "Hindi",
        "mk" => "Macedonian",
        "sl" => "Slovenian",
        "lv" => "Latvian",
        "sk" => "Slovak",
        "cs" => "Czech",
        "ua" => "Ukrainian",
    ]
}
