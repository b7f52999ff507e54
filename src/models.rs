use serde::{Deserialize, Serialize};

pub const INBOX: &str = "INBOX";
pub const IMPORTANT: &str = "IMPORTANT";
pub const TRASH: &str = "TRASH";
pub const SPAM: &str = "SPAM";
pub const UNREAD: &str = "UNREAD";

/// Well-known Gmail labels. Their ids double as their names and they can
/// never be created.
pub const SYSTEM_LABELS: &[&str] = &[
    "CHAT",
    "SENT",
    "DRAFT",
    INBOX,
    IMPORTANT,
    TRASH,
    SPAM,
    "STARRED",
    UNREAD,
    "CATEGORY_FORUMS",
    "CATEGORY_UPDATES",
    "CATEGORY_PERSONAL",
    "CATEGORY_PROMOTIONS",
    "CATEGORY_SOCIAL",
];

pub fn is_system_label(id: &str) -> bool {
    SYSTEM_LABELS.contains(&id)
}

/// Criteria pair stamped on every filter this tool creates.
pub const MARKER_SIZE: i32 = 1;
pub const MARKER_SIZE_COMPARISON: &str = "larger";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub label_type: String, // 'system' or 'user'
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_list_visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_list_visibility: Option<String>,
}

/// Match predicates of a Gmail filter. Field order is the order keys are
/// written out in compact form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negated_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_chats: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_comparison: Option<String>,
}

impl Criteria {
    pub fn has_marker(&self) -> bool {
        self.size == Some(MARKER_SIZE)
            && self.size_comparison.as_deref() == Some(MARKER_SIZE_COMPARISON)
    }

    pub fn set_marker(&mut self) {
        self.size = Some(MARKER_SIZE);
        self.size_comparison = Some(MARKER_SIZE_COMPARISON.to_string());
    }

    /// A copy with the provenance marker removed. Criteria carrying any other
    /// size predicate are returned unchanged.
    pub fn without_marker(&self) -> Criteria {
        let mut criteria = self.clone();
        if criteria.has_marker() {
            criteria.size = None;
            criteria.size_comparison = None;
        }
        criteria
    }

    /// Returns the query when it is the only predicate set.
    pub fn sole_query(&self) -> Option<&str> {
        let only_query = Criteria {
            query: self.query.clone(),
            ..Default::default()
        };
        if self.query.is_some() && *self == only_query {
            self.query.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,
}

impl FilterAction {
    pub fn is_empty(&self) -> bool {
        self.add_label_ids.is_empty() && self.remove_label_ids.is_empty() && self.forward.is_none()
    }
}

/// A filter as the Gmail settings API stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub criteria: Criteria,
    #[serde(default, skip_serializing_if = "FilterAction::is_empty")]
    pub action: FilterAction,
}
