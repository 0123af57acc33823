//! Writes resolved mapping documents to disk.
//!
//! Layout under the output root (read by the indexer, keep it stable):
//!
//! ```text
//! results/results-<lang>.json
//! search_logs.json
//! ```

use crate::i18n::Language;
use crate::mappings::resolve::{resolve_document, to_json_pretty};
use crate::mappings::results::{results_template, ResultsOptions};
use crate::mappings::search_logs::{search_logs_template, SEARCH_LOGS_LANGUAGE};
use crate::mappings::template::Template;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_OUTPUT_DIR: &str = "data/es/mappings";

/// Generates the mapping artifacts for a set of languages.
#[derive(Debug, Clone)]
pub struct MappingGenerator {
    output_dir: PathBuf,
    options: ResultsOptions,
}

impl MappingGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            options: ResultsOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResultsOptions) -> Self {
        self.options = options;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn results_path(&self, language: Language) -> PathBuf {
        self.output_dir
            .join("results")
            .join(format!("results-{}.json", language.code()))
    }

    pub fn search_logs_path(&self) -> PathBuf {
        self.output_dir.join("search_logs.json")
    }

    /// Resolved results mapping for one language, as JSON text.
    pub fn render_results(&self, language: Language) -> Result<String> {
        render(language.code(), &results_template(self.options))
            .with_context(|| format!("Failed to render results mapping for '{}'", language))
    }

    pub fn render_search_logs(&self) -> Result<String> {
        render(SEARCH_LOGS_LANGUAGE, &search_logs_template())
            .context("Failed to render search logs mapping")
    }

    /// Render every document, then write them all.
    ///
    /// Nothing is written if any document fails to resolve.
    pub fn generate(&self, languages: &[Language]) -> Result<Vec<PathBuf>> {
        let mut documents = Vec::with_capacity(languages.len() + 1);
        for language in languages {
            documents.push((self.results_path(*language), self.render_results(*language)?));
        }
        documents.push((self.search_logs_path(), self.render_search_logs()?));

        let mut written = Vec::with_capacity(documents.len());
        for (path, contents) in documents {
            write_document(&path, &contents)?;
            written.push(path);
        }

        info!(
            "Wrote {} mapping files under {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }
}

fn render(code: &str, template: &Template) -> Result<String> {
    let document = resolve_document(code, template)?;
    Ok(to_json_pretty(&document)?)
}

fn write_document(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    // ==================== Path Tests ====================

    #[test]
    fn test_artifact_paths() {
        let generator = MappingGenerator::new("out");
        assert_eq!(
            generator.results_path(Language::HEBREW),
            PathBuf::from("out/results/results-he.json")
        );
        assert_eq!(generator.search_logs_path(), PathBuf::from("out/search_logs.json"));
    }

    // ==================== Generation Tests ====================

    #[test]
    fn test_generate_writes_all_languages_and_search_logs() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let generator = MappingGenerator::new(temp_dir.path());

        let written = generator.generate(&Language::all()).expect("Should generate");
        assert_eq!(written.len(), 32);

        for language in Language::all() {
            let path = generator.results_path(language);
            let contents = fs::read_to_string(&path).expect("results file should exist");
            let doc: Value = serde_json::from_str(&contents).expect("valid JSON");
            assert!(doc["mappings"]["result"]["properties"]["title"].is_object());
        }
        assert!(generator.search_logs_path().exists());
    }

    #[test]
    fn test_generate_subset() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let generator = MappingGenerator::new(temp_dir.path());

        generator
            .generate(&[Language::RUSSIAN])
            .expect("Should generate");

        assert!(generator.results_path(Language::RUSSIAN).exists());
        assert!(!generator.results_path(Language::ENGLISH).exists());
        assert!(generator.search_logs_path().exists());
    }

    #[test]
    fn test_generation_is_byte_identical_across_runs() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let generator = MappingGenerator::new(temp_dir.path());

        generator.generate(&[Language::HEBREW]).unwrap();
        let first = fs::read(generator.results_path(Language::HEBREW)).unwrap();
        generator.generate(&[Language::HEBREW]).unwrap();
        let second = fs::read(generator.results_path(Language::HEBREW)).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            generator.render_results(Language::HEBREW).unwrap().into_bytes(),
            first
        );
    }

    #[test]
    fn test_phonetic_option_reaches_output() {
        let generator = MappingGenerator::new("unused").with_options(ResultsOptions { phonetic: true });
        let rendered = generator.render_results(Language::RUSSIAN).unwrap();
        assert!(rendered.contains("icu_transliterate"));

        let plain = MappingGenerator::new("unused").render_results(Language::RUSSIAN).unwrap();
        assert!(!plain.contains("icu_transliterate"));
    }
}
