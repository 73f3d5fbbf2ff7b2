//! Privilege transitions.
//!
//! A transition names a `from` group whose members may request temporary
//! membership of a `to` group, together with the approval rules for it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A permitted escalation from one group to another.
///
/// Equality compares `from`, `to`, `duration`, `self_approval` and the
/// approval groups as a set. `global_excluded` is a catalog hint and is not
/// part of a transition's identity; it is also never serialized, so it does
/// not leak into signed approval claims.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// Group the requester must currently hold.
    pub from: String,
    /// Group granted on approval.
    pub to: String,
    /// Grant duration in seconds.
    pub duration: i64,
    /// Whether the requester may approve their own request.
    #[serde(default)]
    pub self_approval: bool,
    /// Groups whose members may approve.
    #[serde(default)]
    pub approval_groups: Vec<String>,
    /// Excluded from the global breakglass fan-out.
    #[serde(default, rename = "globalBreakglassExcluded", skip_serializing)]
    pub global_excluded: bool,
}

impl Transition {
    /// Creates a transition with no approval groups.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, duration: i64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            duration,
            self_approval: false,
            approval_groups: Vec::new(),
            global_excluded: false,
        }
    }

    /// Adds an approval group.
    #[must_use]
    pub fn with_approval_group(mut self, group: impl Into<String>) -> Self {
        self.approval_groups.push(group.into());
        self
    }

    /// Sets the self-approval flag.
    #[must_use]
    pub const fn with_self_approval(mut self, allowed: bool) -> Self {
        self.self_approval = allowed;
        self
    }

    /// Sets the global breakglass exclusion flag.
    #[must_use]
    pub const fn with_global_excluded(mut self, excluded: bool) -> Self {
        self.global_excluded = excluded;
        self
    }

    /// Returns whether this transition covers the given `(from, to)` pair.
    #[must_use]
    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.from == from && self.to == to
    }

    /// Returns whether any of the given group names is an approval group.
    pub fn is_approval_group_any<'a>(&self, groups: impl IntoIterator<Item = &'a str>) -> bool {
        groups
            .into_iter()
            .any(|g| self.approval_groups.iter().any(|a| a == g))
    }

    fn approval_set(&self) -> BTreeSet<&str> {
        self.approval_groups.iter().map(String::as_str).collect()
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from
            && self.to == other.to
            && self.duration == other.duration
            && self.self_approval == other.self_approval
            && self.approval_set() == other.approval_set()
    }
}

/// Identity of whoever asked for an escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requestor {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}
