//! Breakglass escalation records.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::selector::Selectable;
use crate::store::{ObjectMeta, Record};

/// Who may approve an escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationApprovers {
    /// Approving users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    /// Approving groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Escalation rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationSpec {
    /// Cluster the rule applies to.
    #[serde(default)]
    pub cluster: String,
    /// User the rule applies to.
    #[serde(default)]
    pub username: String,
    /// Members of any of these groups may use the rule.
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    /// Group granted by the rule.
    #[serde(default)]
    pub escalated_group: String,
    /// Approvers.
    #[serde(default)]
    pub approvers: EscalationApprovers,
}

/// A permitted escalation on a cluster. Escalations carry no status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakglassEscalation {
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The rule.
    pub spec: EscalationSpec,
}

impl Selectable for BreakglassEscalation {
    const KIND: &'static str = "BreakglassEscalation";
    const FIELDS: &'static [&'static str] = &[
        "metadata.name",
        "spec.cluster",
        "spec.username",
        "spec.escalatedGroup",
    ];

    fn field(&self, label: &str) -> Option<String> {
        match label {
            "metadata.name" => Some(self.metadata.name.clone()),
            "spec.cluster" => Some(self.spec.cluster.clone()),
            "spec.username" => Some(self.spec.username.clone()),
            "spec.escalatedGroup" => Some(self.spec.escalated_group.clone()),
            _ => None,
        }
    }
}

impl Record for BreakglassEscalation {
    type Status = ();

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn set_status(&mut self, _status: ()) {}
}

/// Keeps the escalations whose allowed groups intersect `user_groups`.
pub fn possible_escalations<S: AsRef<str>>(
    escalations: Vec<BreakglassEscalation>,
    user_groups: &[S],
) -> Vec<BreakglassEscalation> {
    let groups: HashSet<&str> = user_groups.iter().map(|g| g.as_ref()).collect();
    escalations
        .into_iter()
        .filter(|e| {
            e.spec
                .allowed_groups
                .iter()
                .any(|g| groups.contains(g.as_str()))
        })
        .collect()
}
