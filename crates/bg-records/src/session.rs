//! Breakglass session records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::selector::{FieldSelector, Selectable};
use crate::store::{ObjectMeta, Record};

/// How long an approved session record is retained.
pub const STORE_DURATION_DAYS: i64 = 30;

/// What a session escalates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSpec {
    /// Target cluster.
    #[serde(default)]
    pub cluster: String,
    /// Escalated user.
    #[serde(default)]
    pub username: String,
    /// Escalated group.
    #[serde(default)]
    pub group: String,
}

/// Session lifecycle flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// The session ran out.
    #[serde(default)]
    pub expired: bool,
    /// An approver accepted the session.
    #[serde(default)]
    pub approved: bool,
    /// The session idled out.
    #[serde(default)]
    pub idle_timeout_reached: bool,
    /// When the status was first set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Retain the record until this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_until: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// Status of a freshly approved session.
    #[must_use]
    pub fn approved(now: DateTime<Utc>) -> Self {
        Self {
            expired: false,
            approved: true,
            idle_timeout_reached: false,
            created_at: Some(now),
            store_until: Some(now + Duration::days(STORE_DURATION_DAYS)),
        }
    }

    /// Returns whether the session grants access.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.approved && !self.expired && !self.idle_timeout_reached
    }
}

/// An escalated session of one user on one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakglassSession {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Session subject.
    pub spec: SessionSpec,
    /// Session state.
    #[serde(default)]
    pub status: SessionStatus,
}

impl BreakglassSession {
    /// Creates an unapproved session named `<cluster>-<username>-<group>`.
    #[must_use]
    pub fn new(
        cluster: impl Into<String>,
        username: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        let spec = SessionSpec {
            cluster: cluster.into(),
            username: username.into(),
            group: group.into(),
        };
        Self {
            metadata: ObjectMeta::named(format!(
                "{}-{}-{}",
                spec.cluster, spec.username, spec.group
            )),
            spec,
            status: SessionStatus::default(),
        }
    }

    /// Selects the active sessions of `username` on `cluster`.
    #[must_use]
    pub fn active_selector(cluster: &str, username: &str) -> FieldSelector {
        FieldSelector::everything()
            .with("spec.cluster", cluster)
            .with("spec.username", username)
            .with("status.approved", true)
            .with("status.expired", false)
            .with("status.idleTimeoutReached", false)
    }
}

impl Selectable for BreakglassSession {
    const KIND: &'static str = "BreakglassSession";
    const FIELDS: &'static [&'static str] = &[
        "metadata.name",
        "spec.cluster",
        "spec.username",
        "spec.group",
        "status.expired",
        "status.approved",
        "status.idleTimeoutReached",
    ];

    fn field(&self, label: &str) -> Option<String> {
        match label {
            "metadata.name" => Some(self.metadata.name.clone()),
            "spec.cluster" => Some(self.spec.cluster.clone()),
            "spec.username" => Some(self.spec.username.clone()),
            "spec.group" => Some(self.spec.group.clone()),
            "status.expired" => Some(self.status.expired.to_string()),
            "status.approved" => Some(self.status.approved.to_string()),
            "status.idleTimeoutReached" => Some(self.status.idle_timeout_reached.to_string()),
            _ => None,
        }
    }
}

impl Record for BreakglassSession {
    type Status = SessionStatus;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }
}
