//! The human-editable form of a filter and its translation to the native one.
//!
//! A compact rule names an intent (`move_to`, `copy_to`, `delete`, or plain
//! `label`/`unlabel`) instead of raw label id lists:
//!
//! ```yaml
//! - filter:
//!     list: announce.example.org
//!   action:
//!     move_to: Lists/Announce
//!     important: true
//! ```

use crate::error::{FilterError, render_block};
use crate::models::{Criteria, FilterAction, IMPORTANT, INBOX, NativeFilter, SPAM, TRASH};
use serde_yaml::{Mapping, Value};

const FILTER: &str = "filter";
const ACTION: &str = "action";
const LIST: &str = "list";

const RULE_FIELDS: [&str; 2] = [FILTER, ACTION];
const RAW_CRITERIA: [&str; 4] = ["from", "to", "subject", "query"];

const MOVE_TO: &str = "move_to";
const COPY_TO: &str = "copy_to";
const DELETE: &str = "delete";
const LABEL: &str = "label";
const UNLABEL: &str = "unlabel";
const IMPORTANT_KEY: &str = "important";

const INTENTS: [&str; 3] = [COPY_TO, MOVE_TO, DELETE];
const ACTION_FIELDS: [&str; 6] = [MOVE_TO, COPY_TO, DELETE, LABEL, UNLABEL, IMPORTANT_KEY];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactFilter {
    /// Mailing-list match, stored natively as `query: list:(<id>)`.
    List(String),
    Criteria(Criteria),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    MoveTo(String),
    CopyTo(String),
    Delete,
    Labels {
        label: Vec<String>,
        unlabel: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactAction {
    pub intent: Intent,
    /// Adds IMPORTANT on top of whatever the intent does.
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactRule {
    pub filter: CompactFilter,
    pub action: CompactAction,
}

/// Validates a decoded compact record and converts it to native form.
///
/// Label references in the result are still names; they become ids once
/// the owning rule resolves them against the label directory.
pub fn normalize(block: &Value) -> Result<NativeFilter, FilterError> {
    Ok(CompactRule::parse(block)?.to_native())
}

/// Splits a YAML document into its records. An empty document has none.
pub fn decode_document(text: &str) -> Result<Vec<Value>, FilterError> {
    let document: Value = serde_yaml::from_str(text)?;
    match document {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(records) => Ok(records),
        other => Err(FilterError::InvalidDocument(render_block(&other))),
    }
}

/// Decodes and validates every record; one malformed record rejects the
/// whole document.
pub fn parse_document(text: &str) -> Result<Vec<CompactRule>, FilterError> {
    decode_document(text)?.iter().map(CompactRule::parse).collect()
}

impl CompactRule {
    pub fn parse(block: &Value) -> Result<Self, FilterError> {
        let map = block
            .as_mapping()
            .ok_or_else(|| FilterError::invalid_value("rule", "a mapping", block))?;
        let keys = field_names(map, block)?;

        let missing: Vec<&str> = RULE_FIELDS
            .iter()
            .copied()
            .filter(|f| !keys.contains(f))
            .collect();
        if !missing.is_empty() {
            return Err(FilterError::missing_fields(missing, block));
        }

        let unknown = keys.iter().filter(|k| !RULE_FIELDS.contains(k));
        let unknown: Vec<&str> = unknown.copied().collect();
        if !unknown.is_empty() {
            return Err(FilterError::unknown_fields(unknown, block));
        }

        let filter = CompactFilter::parse(&map[FILTER], block)?;
        let action = CompactAction::parse(&map[ACTION], block)?;
        Ok(Self { filter, action })
    }

    pub fn to_native(&self) -> NativeFilter {
        let mut criteria = self.filter.to_criteria();
        criteria.set_marker();
        NativeFilter {
            id: None,
            criteria,
            action: self.action.to_native(),
        }
    }

    /// Renders the rule back into the generic tree, keys in display order.
    pub fn to_value(&self) -> Result<Value, FilterError> {
        let mut rule = Mapping::new();
        rule.insert(FILTER.into(), self.filter.to_value()?);
        rule.insert(ACTION.into(), self.action.to_value());
        Ok(Value::Mapping(rule))
    }
}

impl CompactFilter {
    fn parse(value: &Value, rule: &Value) -> Result<Self, FilterError> {
        let map = value
            .as_mapping()
            .ok_or_else(|| FilterError::invalid_value(FILTER, "a mapping", rule))?;
        let keys = field_names(map, value)?;

        if keys.contains(&LIST) {
            if keys.len() != 1 {
                return Err(FilterError::only_one_expected(LIST, value));
            }
            return Ok(Self::List(scalar(&map[LIST], LIST, value)?));
        }

        let unknown: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !RAW_CRITERIA.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(FilterError::unknown_filter_fields(unknown, rule));
        }

        let get = |key: &str| -> Result<Option<String>, FilterError> {
            map.get(key).map(|v| scalar(v, key, value)).transpose()
        };
        Ok(Self::Criteria(Criteria {
            from: get("from")?,
            to: get("to")?,
            subject: get("subject")?,
            query: get("query")?,
            ..Default::default()
        }))
    }

    fn to_criteria(&self) -> Criteria {
        match self {
            Self::List(list) => Criteria {
                query: Some(format!("list:({})", list)),
                ..Default::default()
            },
            Self::Criteria(criteria) => criteria.clone(),
        }
    }

    fn to_value(&self) -> Result<Value, FilterError> {
        match self {
            Self::List(list) => {
                let mut map = Mapping::new();
                map.insert(LIST.into(), list.as_str().into());
                Ok(Value::Mapping(map))
            }
            Self::Criteria(criteria) => Ok(serde_yaml::to_value(criteria)?),
        }
    }
}

impl CompactAction {
    fn parse(value: &Value, rule: &Value) -> Result<Self, FilterError> {
        let empty = Mapping::new();
        let map = match value {
            Value::Null => &empty,
            Value::Mapping(map) => map,
            _ => return Err(FilterError::invalid_value(ACTION, "a mapping", rule)),
        };
        let keys = field_names(map, value)?;

        let unknown: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !ACTION_FIELDS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(FilterError::unknown_action_fields(unknown, rule));
        }

        let important = match map.get(IMPORTANT_KEY) {
            None => false,
            Some(Value::Bool(true)) => true,
            Some(other) => return Err(FilterError::only_true_expected(IMPORTANT_KEY, other, rule)),
        };

        // Everything except `important` takes part in the exclusivity check.
        let rest: Vec<&str> = keys.into_iter().filter(|k| *k != IMPORTANT_KEY).collect();
        let intents: Vec<&str> = INTENTS
            .iter()
            .copied()
            .filter(|i| rest.contains(i))
            .collect();

        let intent = match (intents.as_slice(), rest.len()) {
            ([], _) => Intent::Labels {
                label: string_list(map.get(LABEL), LABEL, value)?,
                unlabel: string_list(map.get(UNLABEL), UNLABEL, value)?,
            },
            ([MOVE_TO], 1) => Intent::MoveTo(scalar(&map[MOVE_TO], MOVE_TO, value)?),
            ([COPY_TO], 1) => Intent::CopyTo(scalar(&map[COPY_TO], COPY_TO, value)?),
            ([DELETE], 1) => match &map[DELETE] {
                Value::Bool(true) => Intent::Delete,
                other => return Err(FilterError::only_true_expected(DELETE, other, rule)),
            },
            ([first, ..], _) => return Err(FilterError::only_one_expected(first, value)),
        };

        Ok(Self { intent, important })
    }

    fn to_native(&self) -> FilterAction {
        let mut builder = ActionBuilder::default();
        if self.important {
            builder.add(IMPORTANT);
        }
        match &self.intent {
            Intent::CopyTo(label) => {
                builder.add(label);
                builder.remove(SPAM);
            }
            Intent::MoveTo(label) => {
                builder.add(label);
                builder.remove(SPAM);
                builder.remove(INBOX);
            }
            Intent::Delete => {
                builder.add(TRASH);
                builder.remove(SPAM);
                builder.remove(INBOX);
            }
            Intent::Labels { label, unlabel } => {
                label.iter().for_each(|l| builder.add(l));
                unlabel.iter().for_each(|l| builder.remove(l));
            }
        }
        builder.finish()
    }

    fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        match &self.intent {
            Intent::MoveTo(label) => {
                map.insert(MOVE_TO.into(), label.as_str().into());
            }
            Intent::CopyTo(label) => {
                map.insert(COPY_TO.into(), label.as_str().into());
            }
            Intent::Delete => {
                map.insert(DELETE.into(), true.into());
            }
            Intent::Labels { label, unlabel } => {
                if !label.is_empty() {
                    map.insert(LABEL.into(), sequence(label));
                }
                if !unlabel.is_empty() {
                    map.insert(UNLABEL.into(), sequence(unlabel));
                }
            }
        }
        if self.important {
            map.insert(IMPORTANT_KEY.into(), true.into());
        }
        Value::Mapping(map)
    }
}

/// Accumulates label references; empty lists vanish on `finish`.
#[derive(Debug, Default)]
struct ActionBuilder {
    add: Vec<String>,
    remove: Vec<String>,
}

impl ActionBuilder {
    fn add(&mut self, label: &str) {
        push_unique(&mut self.add, label);
    }

    fn remove(&mut self, label: &str) {
        push_unique(&mut self.remove, label);
    }

    fn finish(self) -> FilterAction {
        FilterAction {
            add_label_ids: self.add,
            remove_label_ids: self.remove,
            forward: None,
        }
    }
}

fn push_unique(labels: &mut Vec<String>, label: &str) {
    if !labels.iter().any(|l| l == label) {
        labels.push(label.to_string());
    }
}

fn field_names<'a>(map: &'a Mapping, block: &Value) -> Result<Vec<&'a str>, FilterError> {
    map.keys()
        .map(|k| {
            k.as_str()
                .ok_or_else(|| FilterError::invalid_value("key", "a string", block))
        })
        .collect()
}

fn scalar(value: &Value, field: &str, block: &Value) -> Result<String, FilterError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(FilterError::invalid_value(field, "a string", block)),
    }
}

/// Accepts either a list of names or a single name.
fn string_list(value: Option<&Value>, field: &str, block: &Value) -> Result<Vec<String>, FilterError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items.iter().map(|v| scalar(v, field, block)).collect(),
        Some(other) => Ok(vec![scalar(other, field, block)?]),
    }
}

fn sequence(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| s.as_str().into()).collect())
}
