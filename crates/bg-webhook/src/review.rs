//! Review records and the subject they are keyed by.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The resource an admission query is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributes {
    /// Namespace of the object.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Requested verb.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verb: String,
    /// API group.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    /// API version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Resource kind.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,
    /// Subresource.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subresource: String,
    /// Object name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// A non-resource URL query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonResourceAttributes {
    /// URL path.
    #[serde(default)]
    pub path: String,
    /// HTTP verb.
    #[serde(default)]
    pub verb: String,
}

/// Who wants to do what. Reviews match on the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReviewSpec {
    /// Username.
    #[serde(default)]
    pub user: String,
    /// User uid.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Groups of the user.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Resource being accessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_attributes: Option<ResourceAttributes>,
    /// Non-resource URL being accessed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_resource_attributes: Option<NonResourceAttributes>,
    /// Extra authenticator data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl SubjectAccessReviewSpec {
    /// Creates a resource query.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        groups: Vec<String>,
        resource_attributes: ResourceAttributes,
    ) -> Self {
        Self {
            user: user.into(),
            groups,
            resource_attributes: Some(resource_attributes),
            ..Self::default()
        }
    }
}

/// Review state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    /// Waiting for an administrator.
    Pending,
    /// Allowed by an administrator.
    Accepted,
    /// Denied by an administrator.
    Rejected,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An admission review for one subject on one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// Cluster the query came from.
    pub cluster: String,
    /// The query subject.
    pub subject: SubjectAccessReviewSpec,
    /// Current status.
    pub status: ReviewStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The review is stale from this instant on.
    pub valid_until: DateTime<Utc>,
}

impl ReviewRecord {
    /// Creates a pending review.
    #[must_use]
    pub fn pending(
        cluster: impl Into<String>,
        subject: SubjectAccessReviewSpec,
        now: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            cluster: cluster.into(),
            subject,
            status: ReviewStatus::Pending,
            created_at: now,
            valid_until,
        }
    }

    /// Returns whether the validity has elapsed.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }

    /// Returns whether this review is for the given cluster and subject.
    #[must_use]
    pub fn matches(&self, cluster: &str, subject: &SubjectAccessReviewSpec) -> bool {
        self.cluster == cluster && &self.subject == subject
    }
}
