//! Language-parameterized JSON templates.
//!
//! A `Template` is a JSON tree in which any node may be a placeholder: a
//! function of the language code that produces the node's value (or nothing,
//! in which case the node is pruned). See `resolve` for the evaluation rules.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while resolving a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A placeholder consulted a lookup table that has no entry for the code.
    #[error("lookup table '{table}' has no entry for language '{code}'")]
    MissingLookup { table: &'static str, code: String },

    /// The root of the template resolved to nothing.
    #[error("template resolved to an empty document for language '{code}'")]
    EmptyDocument { code: String },
}

/// Signature of a placeholder: language code in, optional template out.
pub type PlaceholderFn = dyn Fn(&str) -> Result<Option<Template>, ResolveError> + Send + Sync;

/// A node of a mapping template.
#[derive(Clone)]
pub enum Template {
    /// Literal JSON. A literal `null` is treated as absent.
    Scalar(Value),
    Sequence(Vec<Template>),
    Mapping(BTreeMap<String, Template>),
    Placeholder(Arc<PlaceholderFn>),
}

impl Template {
    /// Wrap a function of the language code as a placeholder node.
    pub fn placeholder<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<Option<Template>, ResolveError> + Send + Sync + 'static,
    {
        Template::Placeholder(Arc::new(f))
    }

    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Template)>,
    {
        Template::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn sequence<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Template>,
    {
        Template::Sequence(items.into_iter().collect())
    }

    /// True if any node in the tree is a placeholder.
    ///
    /// Placeholders inside a placeholder's result are not visible here; they
    /// only exist once the placeholder is invoked.
    pub fn has_placeholders(&self) -> bool {
        match self {
            Template::Scalar(_) => false,
            Template::Sequence(items) => items.iter().any(Template::has_placeholders),
            Template::Mapping(entries) => entries.values().any(Template::has_placeholders),
            Template::Placeholder(_) => true,
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Scalar(value) => write!(f, "{}", value),
            Template::Sequence(items) => f.debug_list().entries(items).finish(),
            Template::Mapping(entries) => f.debug_map().entries(entries).finish(),
            Template::Placeholder(_) => f.write_str("<placeholder>"),
        }
    }
}

/// Literal JSON becomes a tree of template nodes, so nested literals are
/// pruned the same way as resolved placeholders.
impl From<Value> for Template {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Template::Sequence(items.into_iter().map(Template::from).collect()),
            Value::Object(entries) => Template::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Template::from(value)))
                    .collect(),
            ),
            scalar => Template::Scalar(scalar),
        }
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Template::Scalar(Value::from(value))
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Template::Scalar(Value::from(value))
    }
}

impl From<bool> for Template {
    fn from(value: bool) -> Self {
        Template::Scalar(Value::from(value))
    }
}

impl From<i64> for Template {
    fn from(value: i64) -> Self {
        Template::Scalar(Value::from(value))
    }
}
