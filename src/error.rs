use std::collections::BTreeSet;
use std::fmt;

use serde_yaml::Value;
use thiserror::Error;

/// Field names reported by a validation error, rendered the way they read in
/// the message: `"a"` for one field, `"a", "b"` for several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields(BTreeSet<String>);

impl Fields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn is_many(&self) -> bool {
        self.0.len() > 1
    }

    #[cfg(test)]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    fn plural(&self) -> &'static str {
        if self.is_many() { "s" } else { "" }
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(String::as_str).collect();
        write!(f, "{}", joined.join("\", \""))
    }
}

/// Errors raised while validating compact-form input or resolving labels.
///
/// None of these are recovered internally: they abort the whole batch and
/// surface at the command boundary with the offending block attached.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Missing required field{} \"{fields}\" in block \"{block}\".", .fields.plural())]
    MissingFields { fields: Fields, block: String },

    #[error("Unknown field{} \"{fields}\" in block \"{block}\".", .fields.plural())]
    UnknownFields { fields: Fields, block: String },

    #[error("Unknown field{} \"{fields}\" in filter block \"{block}\".", .fields.plural())]
    UnknownFilterFields { fields: Fields, block: String },

    #[error("Unknown field{} \"{fields}\" in action block \"{block}\".", .fields.plural())]
    UnknownActionFields { fields: Fields, block: String },

    #[error(
        "Field \"{field}\" is expected to be the only one, but additional fields were found in block \"{block}\""
    )]
    OnlyOneExpected { field: String, block: String },

    #[error(
        "Field \"{field}\" is expected with value \"true\", but value \"{value}\" was found in block \"{block}\""
    )]
    OnlyTrueExpected {
        field: String,
        value: String,
        block: String,
    },

    #[error("Field \"{field}\" is expected to be {expected} in block \"{block}\"")]
    InvalidValue {
        field: String,
        expected: &'static str,
        block: String,
    },

    #[error("Label \"{0}\" not found")]
    NotFound(String),

    #[error("Expected a list of filters, found {0}")]
    InvalidDocument(String),

    #[error("Failed to decode filters: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FilterError {
    pub fn missing_fields<I, S>(fields: I, block: &Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingFields {
            fields: Fields::new(fields),
            block: render_block(block),
        }
    }

    pub fn unknown_fields<I, S>(fields: I, block: &Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnknownFields {
            fields: Fields::new(fields),
            block: render_block(block),
        }
    }

    pub fn unknown_filter_fields<I, S>(fields: I, block: &Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnknownFilterFields {
            fields: Fields::new(fields),
            block: render_block(block),
        }
    }

    pub fn unknown_action_fields<I, S>(fields: I, block: &Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UnknownActionFields {
            fields: Fields::new(fields),
            block: render_block(block),
        }
    }

    pub fn only_one_expected(field: &str, block: &Value) -> Self {
        Self::OnlyOneExpected {
            field: field.to_string(),
            block: render_block(block),
        }
    }

    pub fn only_true_expected(field: &str, value: &Value, block: &Value) -> Self {
        Self::OnlyTrueExpected {
            field: field.to_string(),
            value: render_block(value),
            block: render_block(block),
        }
    }

    pub fn invalid_value(field: &str, expected: &'static str, block: &Value) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            expected,
            block: render_block(block),
        }
    }
}

/// Single-line rendering of a decoded YAML subtree for error messages.
pub fn render_block(block: &Value) -> String {
    match block {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}
