//! Mapping for the per-language `results` indexes.
//!
//! Title, description and content share the same shape across every result
//! type (units, collections, sources, tags, ...) so that tf/idf stays
//! comparable between them.

use crate::i18n::LanguageGroup;
use crate::mappings::analyzers::{language_analyzer_placeholder, languageset_placeholder, only_in_group};
use crate::mappings::template::Template;
use serde_json::json;

/// Optional parts of the results template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultsOptions {
    /// Add the Beider-Morse phonetic analyzer. Requires the `analysis-phonetic`
    /// plugin, and `analysis-icu` for Cyrillic transliteration.
    pub phonetic: bool,
}

/// Results index template: settings plus the strict `result` mapping.
pub fn results_template(options: ResultsOptions) -> Template {
    Template::mapping([
        ("settings", settings(options)),
        (
            "mappings",
            Template::mapping([(
                "result",
                Template::mapping([
                    ("dynamic", Template::from("strict")),
                    ("properties", result_properties()),
                ]),
            )]),
        ),
    ])
}

fn settings(options: ResultsOptions) -> Template {
    let mut analyzers = vec![(
        "he",
        Template::from(json!({
            "tokenizer": "standard",
            "filter": ["he_IL"],
            "char_filter": ["quotes"],
        })),
    )];
    let mut filters = vec![(
        "he_IL",
        Template::from(json!({
            "type": "hunspell",
            "locale": "he_IL",
            "dedup": true,
        })),
    )];

    if options.phonetic {
        analyzers.push((
            "phonetic_analyzer",
            Template::mapping([
                ("tokenizer", Template::from("standard")),
                ("char_filter", Template::from(json!(["quotes"]))),
                (
                    "filter",
                    Template::sequence([
                        Template::from("standard"),
                        Template::from("lowercase"),
                        only_in_group(LanguageGroup::Cyrillic, Template::from("icu_transliterate")),
                        Template::from("custom_phonetic"),
                    ]),
                ),
            ]),
        ));
        filters.push((
            "icu_transliterate",
            only_in_group(
                LanguageGroup::Cyrillic,
                Template::from(json!({
                    "type": "icu_transform",
                    "id": "Any-Latin; NFD; [:Nonspacing Mark:] Remove; NFC",
                })),
            ),
        ));
        filters.push((
            "custom_phonetic",
            Template::mapping([
                ("type", Template::from("phonetic")),
                ("encoder", Template::from("beider_morse")),
                ("replace", Template::from(true)),
                ("languageset", languageset_placeholder()),
            ]),
        ));
    }

    Template::mapping([(
        "index",
        Template::mapping([
            ("number_of_shards", Template::from(1i64)),
            ("number_of_replicas", Template::from(0i64)),
            (
                "analysis",
                Template::mapping([
                    ("analyzer", Template::mapping(analyzers)),
                    ("char_filter", quotes_char_filter()),
                    ("filter", Template::mapping(filters)),
                ]),
            ),
        ]),
    )])
}

// Typographic quotes become an apostrophe, double quotes are dropped. The
// escapes are literal: Elasticsearch decodes them.
fn quotes_char_filter() -> Template {
    Template::from(json!({
        "quotes": {
            "type": "mapping",
            "mappings": [
                "\\u0091=>\\u0027",
                "\\u0092=>\\u0027",
                "\\u2018=>\\u0027",
                "\\u2019=>\\u0027",
                "\\u201B=>\\u0027",
                "\\u0022=>",
                "\\u201C=>",
                "\\u201D=>",
            ],
        },
    }))
}

fn keyword() -> Template {
    Template::from(json!({"type": "keyword"}))
}

/// Standard-analyzed text with a `language` sub-field analyzed per language.
fn text_with_language_field() -> Template {
    Template::mapping([
        ("type", Template::from("text")),
        ("analyzer", Template::from("standard")),
        (
            "fields",
            Template::mapping([(
                "language",
                Template::mapping([
                    ("type", Template::from("text")),
                    ("analyzer", language_analyzer_placeholder()),
                ]),
            )]),
        ),
    ])
}

fn result_properties() -> Template {
    Template::mapping([
        // unit, collection, source, tag, ...
        ("result_type", keyword()),
        ("mdb_uid", keyword()),
        // Entities this document depends on, e.g. "content_unit:lHDLZWxq".
        // A change to any of them triggers a reindex of the document.
        ("typed_uids", keyword()),
        // filter:value pairs, e.g. "content_type:DAILY_LESSON". Time is
        // filtered through effective_date.
        ("filter_values", keyword()),
        ("title", text_with_language_field()),
        ("description", text_with_language_field()),
        ("content", text_with_language_field()),
        (
            "title_suggest",
            Template::mapping([
                ("type", Template::from("completion")),
                ("analyzer", language_analyzer_placeholder()),
                (
                    "contexts",
                    Template::from(json!([{
                        "name": "result_type",
                        "type": "category",
                        "path": "result_type",
                    }])),
                ),
            ]),
        ),
        (
            "effective_date",
            Template::from(json!({"type": "date", "format": "strict_date"})),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Language;
    use crate::mappings::resolve::{resolve_document, to_json_pretty};
    use crate::mappings::template::ResolveError;
    use serde_json::Value;

    fn resolved(code: &str, options: ResultsOptions) -> Value {
        resolve_document(code, &results_template(options)).expect("should resolve")
    }

    fn properties(doc: &Value) -> &Value {
        &doc["mappings"]["result"]["properties"]
    }

    // ==================== Default Template Tests ====================

    #[test]
    fn test_language_sub_fields_use_language_analyzer() {
        let doc = resolved("ru", ResultsOptions::default());
        for field in ["title", "description", "content"] {
            assert_eq!(properties(&doc)[field]["analyzer"], "standard");
            assert_eq!(properties(&doc)[field]["fields"]["language"]["analyzer"], "russian");
        }
        assert_eq!(properties(&doc)["title_suggest"]["analyzer"], "russian");
    }

    #[test]
    fn test_strict_mapping_and_settings() {
        let doc = resolved("en", ResultsOptions::default());
        assert_eq!(doc["mappings"]["result"]["dynamic"], "strict");
        assert_eq!(doc["settings"]["index"]["number_of_shards"], 1);
        assert_eq!(doc["settings"]["index"]["number_of_replicas"], 0);
        assert_eq!(
            doc["settings"]["index"]["analysis"]["filter"]["he_IL"]["dedup"],
            true
        );
        assert_eq!(properties(&doc)["effective_date"]["format"], "strict_date");
    }

    #[test]
    fn test_quotes_mappings_are_literal_escapes() {
        let doc = resolved("he", ResultsOptions::default());
        let mappings = &doc["settings"]["index"]["analysis"]["char_filter"]["quotes"]["mappings"];
        assert_eq!(mappings[0], "\\u0091=>\\u0027");
        assert_eq!(mappings.as_array().map(Vec::len), Some(8));
    }

    #[test]
    fn test_default_has_no_phonetic_parts() {
        let doc = resolved("ru", ResultsOptions::default());
        let analysis = &doc["settings"]["index"]["analysis"];
        assert!(analysis["analyzer"].get("phonetic_analyzer").is_none());
        assert!(analysis["filter"].get("icu_transliterate").is_none());
        assert!(analysis["filter"].get("custom_phonetic").is_none());
    }

    #[test]
    fn test_every_language_resolves() {
        for language in Language::all() {
            let rendered = to_json_pretty(&resolved(language.code(), ResultsOptions::default())).unwrap();
            assert!(!rendered.contains("null"), "null leaked for {}", language);
        }
    }

    #[test]
    fn test_unknown_language_is_rejected() {
        let err = resolve_document("xx", &results_template(ResultsOptions::default())).unwrap_err();
        assert!(matches!(err, ResolveError::MissingLookup { .. }));
    }

    // ==================== Phonetic Option Tests ====================

    #[test]
    fn test_phonetic_cyrillic_gets_transliteration() {
        let doc = resolved("bg", ResultsOptions { phonetic: true });
        let analysis = &doc["settings"]["index"]["analysis"];
        assert_eq!(
            analysis["analyzer"]["phonetic_analyzer"]["filter"],
            serde_json::json!(["standard", "lowercase", "icu_transliterate", "custom_phonetic"])
        );
        assert_eq!(analysis["filter"]["icu_transliterate"]["type"], "icu_transform");
        assert_eq!(analysis["filter"]["custom_phonetic"]["languageset"], "cyrillic");
    }

    #[test]
    fn test_phonetic_non_cyrillic_omits_transliteration() {
        let doc = resolved("he", ResultsOptions { phonetic: true });
        let analysis = &doc["settings"]["index"]["analysis"];
        assert_eq!(
            analysis["analyzer"]["phonetic_analyzer"]["filter"],
            serde_json::json!(["standard", "lowercase", "custom_phonetic"])
        );
        assert!(analysis["filter"].get("icu_transliterate").is_none());
        assert_eq!(analysis["filter"]["custom_phonetic"]["languageset"], "hebrew");
    }

    #[test]
    fn test_phonetic_without_languageset_drops_key() {
        let doc = resolved("zh", ResultsOptions { phonetic: true });
        let phonetic = &doc["settings"]["index"]["analysis"]["filter"]["custom_phonetic"];
        assert_eq!(phonetic["encoder"], "beider_morse");
        assert!(phonetic.get("languageset").is_none());
    }
}
