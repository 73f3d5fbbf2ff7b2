//! Group domain model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group in the managed realm.
///
/// Breakglass transitions are expressed entirely in terms of group names;
/// the id is only needed when talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Unique identifier.
    pub id: Uuid,
    /// Group name.
    pub name: String,
    /// Full path (e.g. `/tenant/tenant-debug`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Custom group attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Vec<String>>,
}

impl Group {
    /// Creates a new top-level group with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::now_v7(),
            path: Some(format!("/{name}")),
            name,
            attributes: HashMap::new(),
        }
    }

    /// Returns whether the group name ends with the given suffix.
    #[must_use]
    pub fn has_suffix(&self, suffix: &str) -> bool {
        self.name.ends_with(suffix)
    }
}

/// Finds a group by exact name in a slice.
#[must_use]
pub fn find_by_name<'a>(groups: &'a [Group], name: &str) -> Option<&'a Group> {
    groups.iter().find(|g| g.name == name)
}
