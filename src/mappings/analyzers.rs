//! Per-language lookup tables and the placeholders that consult them.

use crate::i18n::LanguageGroup;
use crate::mappings::template::{ResolveError, Template};

/// Elasticsearch analyzer used for each language's `language` sub-fields.
const LANGUAGE_ANALYZERS: &[(&str, &str)] = &[
    ("en", "english"),
    ("he", "he"),
    ("ru", "russian"),
    ("es", "spanish"),
    ("it", "italian"),
    ("de", "german"),
    ("nl", "dutch"),
    ("fr", "french"),
    ("pt", "portuguese"),
    ("tr", "turkish"),
    ("pl", "standard"),
    ("ar", "arabic"),
    ("hu", "hungarian"),
    ("fi", "finnish"),
    ("lt", "lithuanian"),
    ("ja", "cjk"),
    ("bg", "bulgarian"),
    ("ka", "standard"),
    ("no", "norwegian"),
    ("sv", "swedish"),
    ("hr", "standard"),
    ("zh", "cjk"),
    ("fa", "persian"),
    ("ro", "romanian"),
    ("hi", "hindi"),
    ("ua", "standard"),
    ("mk", "standard"),
    ("sl", "standard"),
    ("lv", "latvian"),
    ("sk", "standard"),
    ("cs", "czech"),
];

/// Beider-Morse phonetic language sets. Keys are language codes, plus group
/// names for languages covered through their group.
const BEIDER_MORSE_LANGUAGESETS: &[(&str, &str)] = &[
    ("CYRILLIC", "cyrillic"),
    ("en", "english"),
    ("fr", "french"),
    ("de", "german"),
    ("he", "hebrew"),
    ("hu", "hungarian"),
    ("pl", "polish"),
    ("ro", "romanian"),
    ("ru", "russian"),
    ("es", "spanish"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Analyzer for `code`. Unknown codes are an error: a missing analyzer would
/// otherwise yield a mapping that looks valid but indexes with the wrong
/// analysis chain.
pub fn language_analyzer(code: &str) -> Result<&'static str, ResolveError> {
    lookup(LANGUAGE_ANALYZERS, code).ok_or_else(|| ResolveError::MissingLookup {
        table: "language_analyzer",
        code: code.to_string(),
    })
}

/// Phonetic language set for `code`, falling back to the Cyrillic set for
/// Cyrillic languages without their own entry. `None` means "no set".
pub fn beider_morse_languageset(code: &str) -> Option<&'static str> {
    lookup(BEIDER_MORSE_LANGUAGESETS, code).or_else(|| {
        if LanguageGroup::Cyrillic.contains(code) {
            lookup(BEIDER_MORSE_LANGUAGESETS, LanguageGroup::Cyrillic.name())
        } else {
            None
        }
    })
}

/// Placeholder resolving to the language analyzer name.
pub fn language_analyzer_placeholder() -> Template {
    Template::placeholder(|code| language_analyzer(code).map(|analyzer| Some(Template::from(analyzer))))
}

/// Placeholder resolving to the Beider-Morse language set, absent when the
/// language has none.
pub fn languageset_placeholder() -> Template {
    Template::placeholder(|code| Ok(beider_morse_languageset(code).map(Template::from)))
}

/// Placeholder yielding `template` for members of `group` and nothing for
/// everyone else.
pub fn only_in_group(group: LanguageGroup, template: Template) -> Template {
    Template::placeholder(move |code| Ok(group.contains(code).then(|| template.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Language;
    use crate::mappings::resolve::resolve;
    use serde_json::json;

    // ==================== Language Analyzer Tests ====================

    #[test]
    fn test_every_language_has_an_analyzer() {
        for language in Language::all() {
            assert!(
                language_analyzer(language.code()).is_ok(),
                "no analyzer for {}",
                language
            );
        }
    }

    #[test]
    fn test_analyzer_table_has_no_unregistered_codes() {
        for (code, _) in LANGUAGE_ANALYZERS {
            assert!(Language::from_code(code).is_ok(), "{} is not registered", code);
        }
    }

    #[test]
    fn test_known_analyzers() {
        assert_eq!(language_analyzer("en").unwrap(), "english");
        assert_eq!(language_analyzer("he").unwrap(), "he");
        assert_eq!(language_analyzer("zh").unwrap(), "cjk");
        assert_eq!(language_analyzer("ja").unwrap(), "cjk");
        assert_eq!(language_analyzer("ua").unwrap(), "standard");
    }

    #[test]
    fn test_unknown_language_fails() {
        let err = language_analyzer("xx").unwrap_err();
        assert_eq!(
            err,
            ResolveError::MissingLookup {
                table: "language_analyzer",
                code: "xx".to_string()
            }
        );
    }

    #[test]
    fn test_analyzer_placeholder_fails_fast() {
        assert!(resolve("xx", &language_analyzer_placeholder()).is_err());
        assert_eq!(
            resolve("ru", &language_analyzer_placeholder()).unwrap(),
            Some(json!("russian"))
        );
    }

    // ==================== Beider-Morse Tests ====================

    #[test]
    fn test_languageset_direct_entries() {
        assert_eq!(beider_morse_languageset("he"), Some("hebrew"));
        assert_eq!(beider_morse_languageset("ru"), Some("russian"));
    }

    #[test]
    fn test_languageset_cyrillic_fallback() {
        assert_eq!(beider_morse_languageset("bg"), Some("cyrillic"));
        assert_eq!(beider_morse_languageset("ua"), Some("cyrillic"));
        assert_eq!(beider_morse_languageset("mk"), Some("cyrillic"));
    }

    #[test]
    fn test_languageset_absent_for_others() {
        assert_eq!(beider_morse_languageset("zh"), None);
        assert_eq!(beider_morse_languageset("xx"), None);
        assert_eq!(resolve("zh", &languageset_placeholder()).unwrap(), None);
    }

    // ==================== Group Placeholder Tests ====================

    #[test]
    fn test_only_in_group() {
        let template = Template::mapping([(
            "icu_transliterate",
            only_in_group(LanguageGroup::Cyrillic, Template::from(json!({"type": "icu_transform"}))),
        )]);
        assert_eq!(
            resolve("ua", &template).unwrap(),
            Some(json!({"icu_transliterate": {"type": "icu_transform"}}))
        );
        assert_eq!(resolve("he", &template).unwrap(), Some(json!({})));
    }
}
