//! User domain model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::marker;

/// A user in the managed realm.
///
/// Only the fields the escalation engine reads or must round-trip on update
/// are modelled. Attributes are multi-valued, as in the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,
    /// Username, unique within the realm.
    pub username: String,
    /// Whether the account is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// First name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Custom user attributes.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

const fn default_enabled() -> bool {
    true
}

impl User {
    /// Creates a new enabled user with a fresh id.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            enabled: true,
            email: None,
            first_name: None,
            last_name: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets first and last name.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Gets the user's full name, falling back to the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.username.clone(),
        }
    }

    /// Returns whether the user carries no attributes at all.
    #[must_use]
    pub fn has_no_attributes(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns the raw grant marker values for a group, if any.
    #[must_use]
    pub fn marker_values(&self, group_name: &str) -> Option<&[String]> {
        self.attributes
            .get(&marker::marker_key(group_name))
            .map(Vec::as_slice)
    }

    /// Stamps a grant marker, replacing every prior value for that group.
    pub fn set_marker(&mut self, group_name: &str, expiry: i64) {
        self.attributes.insert(
            marker::marker_key(group_name),
            vec![marker::encode_expiry(expiry)],
        );
    }

    /// Removes the grant marker for a group. Returns whether one was present.
    pub fn clear_marker(&mut self, group_name: &str) -> bool {
        self.attributes
            .remove(&marker::marker_key(group_name))
            .is_some()
    }
}
