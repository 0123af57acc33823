//! Supported languages and language groups.
//!
//! - `registry`: Single source of truth for all supported language codes
//! - `language`: Type-safe `Language`, constructible only from registered codes
//! - `group`: Named sets of languages sharing special-case analysis rules
//!
//! # Example
//!
//! ```rust,ignore
//! use search_devtools::i18n::{Language, LanguageGroup};
//!
//! let russian = Language::from_code("ru")?;
//! assert!(russian.is_in(LanguageGroup::Cyrillic));
//! ```

mod group;
mod language;
mod registry;

pub use group::LanguageGroup;
pub use language::Language;
pub use registry::{LanguageConfig, LanguageRegistry};
