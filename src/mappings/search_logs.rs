//! Mapping for the language-independent `search_logs` index.

use crate::mappings::template::Template;
use serde_json::json;

/// Code the search logs template is resolved with. It is not a supported
/// language, so any placeholder added here that needs a real one will fail.
pub const SEARCH_LOGS_LANGUAGE: &str = "xx";

/// Search logs are the only index with dynamic mapping: unknown string fields
/// become keywords.
pub fn search_logs_template() -> Template {
    Template::from(json!({
        "mappings": {
            "search_logs": {
                "dynamic_templates": [
                    {
                        "strings_as_keywords": {
                            "match_mapping_type": "string",
                            "mapping": {"type": "keyword"},
                        },
                    },
                ],
                "dynamic": "strict",
                "properties": {
                    "search_id": {"type": "keyword"},
                    "created": {"type": "date"},
                    // "query" or "click"
                    "log_type": {"type": "keyword"},

                    "query": {
                        "type": "object",
                        "properties": {
                            "term": {"type": "keyword"},
                            "exact_terms": {"type": "keyword"},
                            "filters": {"dynamic": true, "type": "object"},
                            "language_order": {"type": "keyword"},
                            "deb": {"type": "boolean"},
                            "intents": {"type": "object", "enabled": false},
                        },
                    },
                    "from": {"type": "integer"},
                    "size": {"type": "integer"},
                    "sort_by": {"type": "keyword"},
                    "query_result": {"type": "object", "enabled": false},
                    "error": {"type": "object", "enabled": false},

                    // Click logs.
                    "mdb_uid": {"type": "keyword"},
                    "index": {"type": "keyword"},
                    "result_type": {"type": "keyword"},
                    "rank": {"type": "integer"},

                    "execution_time_log": {
                        "type": "nested",
                        "properties": {
                            "operation": {"type": "keyword"},
                            "time": {"type": "integer"},
                        },
                    },
                    "is_debug": {"type": "boolean"},
                },
            },
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::resolve::resolve_document;

    #[test]
    fn test_search_logs_has_no_placeholders() {
        assert!(!search_logs_template().has_placeholders());
    }

    #[test]
    fn test_search_logs_resolves_with_placeholder_language() {
        let doc = resolve_document(SEARCH_LOGS_LANGUAGE, &search_logs_template()).unwrap();
        let logs = &doc["mappings"]["search_logs"];
        assert_eq!(logs["dynamic"], "strict");
        assert_eq!(
            logs["dynamic_templates"][0]["strings_as_keywords"]["mapping"]["type"],
            "keyword"
        );
        assert_eq!(logs["properties"]["query"]["properties"]["intents"]["enabled"], false);
        assert_eq!(logs["properties"]["execution_time_log"]["type"], "nested");
    }

    #[test]
    fn test_search_logs_is_language_independent() {
        let template = search_logs_template();
        assert_eq!(
            resolve_document("en", &template).unwrap(),
            resolve_document(SEARCH_LOGS_LANGUAGE, &template).unwrap()
        );
    }
}
