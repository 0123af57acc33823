//! Elasticsearch index mappings.
//!
//! Some analysis features exist for some languages only, and some languages
//! need special treatment (transliteration for Cyrillic, tokenization for
//! CJK), so mappings are written as templates and resolved once per language.
//!
//! The default results mapping needs the hunspell `he_IL` dictionary
//! (`he_IL.aff`, `he_IL.dic` and `settings.yml` under
//! `config/hunspell/he_IL`).

pub mod analyzers;
pub mod generate;
pub mod resolve;
pub mod results;
pub mod search_logs;
pub mod template;

pub use generate::{MappingGenerator, DEFAULT_OUTPUT_DIR};
pub use resolve::{resolve, resolve_document, to_json_pretty};
pub use results::{results_template, ResultsOptions};
pub use search_logs::search_logs_template;
pub use template::{ResolveError, Template};
