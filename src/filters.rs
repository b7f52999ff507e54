use crate::compact::{self, CompactAction, CompactFilter, CompactRule, Intent};
use crate::error::FilterError;
use crate::labels::LabelDirectory;
use crate::models::{IMPORTANT, INBOX, NativeFilter, SPAM, TRASH, UNREAD};
use crate::service::GmailService;
use anyhow::Result;
use regex::Regex;
use serde_yaml::Value;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static LIST_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^list:\(?(.+?)\)?$").expect("list query pattern is valid")
});

/// One Gmail filter in native form.
///
/// A rule is "managed" when its criteria carry the provenance marker and
/// "custom" otherwise; custom rules are never rewritten or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    filter: NativeFilter,
}

impl Rule {
    pub fn from_native(filter: NativeFilter) -> Self {
        Self { filter }
    }

    /// Builds a rule from a decoded compact record, validating it first.
    pub fn from_compact(block: &Value) -> Result<Self, FilterError> {
        Ok(Self::from_native(compact::normalize(block)?))
    }

    pub fn id(&self) -> Option<&str> {
        self.filter.id.as_deref()
    }

    pub fn native(&self) -> &NativeFilter {
        &self.filter
    }

    pub fn is_custom(&self) -> bool {
        !self.filter.criteria.has_marker()
    }

    pub fn is_managed(&self) -> bool {
        !self.is_custom()
    }

    /// The mailing list id when the criteria are a bare `list:` query.
    pub fn criteria_list(&self) -> Option<String> {
        let criteria = self.filter.criteria.without_marker();
        let query = criteria.sole_query()?;
        LIST_QUERY.captures(query).map(|c| c[1].to_string())
    }

    fn labels(&self) -> Vec<&str> {
        self.filter
            .action
            .add_label_ids
            .iter()
            .map(String::as_str)
            .filter(|id| *id != IMPORTANT)
            .collect()
    }

    fn unlabels(&self) -> Vec<&str> {
        self.filter
            .action
            .remove_label_ids
            .iter()
            .map(String::as_str)
            .filter(|id| *id != SPAM)
            .collect()
    }

    pub fn is_important(&self) -> bool {
        self.filter.action.add_label_ids.iter().any(|id| id == IMPORTANT)
    }

    fn skips_spam(&self) -> bool {
        self.filter.action.remove_label_ids.iter().any(|id| id == SPAM)
    }

    /// Recognizes the canonical shapes `normalize` produces, falling back to
    /// plain label lists. IMPORTANT adds and SPAM removes are ignored while
    /// matching, but `move_to`/`copy_to` only match when SPAM is removed so
    /// that a plain `label` never reads back as a copy. TRASH with an INBOX
    /// removal, or without the SPAM removal, reads as `delete`.
    pub fn to_compact(&self, labels: &LabelDirectory) -> Result<CompactRule, FilterError> {
        let filter = match self.criteria_list() {
            Some(list) => CompactFilter::List(list),
            None => CompactFilter::Criteria(self.filter.criteria.without_marker()),
        };

        let adds = self.labels();
        let removes = self.unlabels();
        let spam = self.skips_spam();
        let intent = match (adds.as_slice(), removes.as_slice()) {
            ([target], [INBOX]) if spam && *target != TRASH => {
                Intent::MoveTo(labels.name_of(target)?)
            }
            ([target], []) if spam => Intent::CopyTo(labels.name_of(target)?),
            ([TRASH], [] | [UNREAD] | [INBOX]) => Intent::Delete,
            _ => Intent::Labels {
                label: names(labels, &adds)?,
                unlabel: names(labels, &removes)?,
            },
        };

        Ok(CompactRule {
            filter,
            action: CompactAction {
                intent,
                important: self.is_important(),
            },
        })
    }

    pub fn dump_for_yaml(&self, labels: &LabelDirectory) -> Result<Value, FilterError> {
        self.to_compact(labels)?.to_value()
    }

    /// Rewrites label names in the action into label ids, creating labels
    /// when the directory's policy allows it.
    pub async fn normalize_labels(
        &mut self,
        labels: &mut LabelDirectory,
        service: &dyn GmailService,
    ) -> Result<()> {
        let action = &mut self.filter.action;
        for label in action
            .add_label_ids
            .iter_mut()
            .chain(action.remove_label_ids.iter_mut())
        {
            let id = labels.id_or_create(service, label).await?;
            if id != *label {
                debug!("Resolved label {} to {}", label, id);
                *label = id;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.filter).map_err(|_| fmt::Error)?;
        write!(f, "{}", json)
    }
}

fn names(labels: &LabelDirectory, ids: &[&str]) -> Result<Vec<String>, FilterError> {
    ids.iter().map(|id| labels.name_of(id)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Managed,
    Custom,
}

/// The in-memory rule collection, loaded either from Gmail or from a
/// compact YAML document.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub async fn load_remote(service: &dyn GmailService) -> Result<Self> {
        let rules: Vec<Rule> = service
            .list_filters()
            .await?
            .into_iter()
            .map(Rule::from_native)
            .collect();
        debug!("Loaded {} filters", rules.len());
        Ok(Self::new(rules))
    }

    /// Decodes a YAML list of compact records into managed rules whose
    /// actions still reference labels by name. One malformed record rejects
    /// the whole document.
    pub fn from_yaml(text: &str) -> Result<Self, FilterError> {
        let rules = compact::decode_document(text)?
            .iter()
            .map(Rule::from_compact)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules))
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn managed(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_managed())
    }

    pub fn custom(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_custom())
    }

    pub fn subset(&self, subset: Subset) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| match subset {
            Subset::Managed => r.is_managed(),
            Subset::Custom => r.is_custom(),
        })
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Removes the first managed rule, keeping the others in order.
    pub fn take_first_managed(&mut self) -> Option<Rule> {
        let index = self.rules.iter().position(Rule::is_managed)?;
        Some(self.rules.remove(index))
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    /// Renders a subset as a compact YAML document; empty subsets render as
    /// an empty string.
    pub fn export(&self, subset: Subset, labels: &LabelDirectory) -> Result<String, FilterError> {
        let records = self
            .subset(subset)
            .map(|r| r.dump_for_yaml(labels))
            .collect::<Result<Vec<_>, _>>()?;
        if records.is_empty() {
            return Ok(String::new());
        }
        Ok(serde_yaml::to_string(&Value::Sequence(records))?)
    }
}
