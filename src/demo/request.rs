//! `/start` request body and its validation.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::OnceLock;
use thiserror::Error;

static NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn name_regex() -> &'static Regex {
    NAME_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid demo name regex"))
}

/// Demo names end up in directory names, index names and URLs.
pub fn is_valid_name(name: &str) -> bool {
    name_regex().is_match(name)
}

/// How a demo uses Elasticsearch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElasticMode {
    /// Build dedicated indexes named after the demo; deleted on cleanup.
    Reindex,
    /// Use whatever indexes the backend config points at.
    Existing(String),
}

impl ElasticMode {
    pub fn is_reindex(&self) -> bool {
        matches!(self, ElasticMode::Reindex)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ElasticMode::Reindex => "reindex",
            ElasticMode::Existing(mode) => mode,
        }
    }
}

impl From<&str> for ElasticMode {
    fn from(value: &str) -> Self {
        match value {
            "reindex" => ElasticMode::Reindex,
            other => ElasticMode::Existing(other.to_string()),
        }
    }
}

impl Serialize for ElasticMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Body of `POST /start`. Every field is required and must be non-empty;
/// absent and `null` fields deserialize as empty so `validate` reports them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub comment: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub backend_branch: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub frontend_branch: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub elastic: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartRejection {
    #[error("Please set field values: {}.", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("\"name\" should be simple letters, digits or underscore without spaces.")]
    InvalidName,

    #[error("Invalid branch name: [{0}].")]
    InvalidBranch(String),

    #[error("Demo with name: [{0}] already exist.")]
    AlreadyExists(String),
}

impl StartRequest {
    pub fn validate(&self) -> Result<(), StartRejection> {
        let fields = [
            ("name", &self.name),
            ("comment", &self.comment),
            ("backend_branch", &self.backend_branch),
            ("frontend_branch", &self.frontend_branch),
            ("elastic", &self.elastic),
        ];
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(StartRejection::MissingFields(missing));
        }

        if !is_valid_name(&self.name) {
            return Err(StartRejection::InvalidName);
        }

        // Branches are passed to git as arguments.
        for branch in [&self.backend_branch, &self.frontend_branch] {
            if branch.starts_with('-') || branch.chars().any(char::is_whitespace) {
                return Err(StartRejection::InvalidBranch(branch.clone()));
            }
        }

        Ok(())
    }

    pub fn elastic_mode(&self) -> ElasticMode {
        ElasticMode::from(self.elastic.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> StartRequest {
        StartRequest {
            name: "search_v2".to_string(),
            comment: "new ranking".to_string(),
            backend_branch: "feature/ranking".to_string(),
            frontend_branch: "master".to_string(),
            elastic: "reindex".to_string(),
        }
    }

    // ==================== Name Tests ====================

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("demo"));
        assert!(is_valid_name("Demo_42"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("with space"));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("dash-name"));
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_valid_request() {
        assert_eq!(valid_request().validate(), Ok(()));
    }

    #[test]
    fn test_missing_fields_listed_in_order() {
        let request = StartRequest {
            comment: String::new(),
            elastic: "  ".to_string(),
            ..valid_request()
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err, StartRejection::MissingFields(vec!["comment", "elastic"]));
        assert_eq!(err.to_string(), "Please set field values: comment, elastic.");
    }

    #[test]
    fn test_deserialize_missing_keys_as_empty() {
        let request: StartRequest = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please set field values: comment, backend_branch, frontend_branch, elastic."
        );
    }

    #[test]
    fn test_deserialize_null_as_missing() {
        let request: StartRequest = serde_json::from_str(
            r#"{"name": "d", "comment": null, "backend_branch": "master",
                "frontend_branch": null, "elastic": "reindex"}"#,
        )
        .unwrap();
        assert_eq!(
            request.validate().unwrap_err().to_string(),
            "Please set field values: comment, frontend_branch."
        );
    }

    #[test]
    fn test_invalid_name_rejected() {
        let request = StartRequest {
            name: "bad name".to_string(),
            ..valid_request()
        };
        assert_eq!(request.validate(), Err(StartRejection::InvalidName));
    }

    #[test]
    fn test_option_like_branch_rejected() {
        let request = StartRequest {
            backend_branch: "--upload-pack=x".to_string(),
            ..valid_request()
        };
        assert!(matches!(request.validate(), Err(StartRejection::InvalidBranch(_))));
    }

    #[test]
    fn test_already_exists_message() {
        assert_eq!(
            StartRejection::AlreadyExists("x".to_string()).to_string(),
            "Demo with name: [x] already exist."
        );
    }

    // ==================== ElasticMode Tests ====================

    #[test]
    fn test_elastic_mode() {
        assert!(valid_request().elastic_mode().is_reindex());
        let existing = ElasticMode::from("production");
        assert!(!existing.is_reindex());
        assert_eq!(existing.as_str(), "production");
        assert_eq!(serde_json::to_string(&existing).unwrap(), r#""production""#);
    }
}
