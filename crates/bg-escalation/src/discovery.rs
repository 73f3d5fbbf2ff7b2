//! Transitions derived from group naming conventions.
//!
//! A tenant `T` is described by up to four groups: `T-appowner` (the
//! approvers), `T-debug` (the escalation target), and `T-collaborator` /
//! `T-poweruser` (the groups allowed to escalate). The convention is a
//! heuristic, so it sits behind [`TransitionDiscovery`] and can be replaced
//! by an explicit mapping.

use async_trait::async_trait;
use bg_directory::GroupDirectory;
use bg_model::{group, Group, Transition};

use crate::error::EscalationResult;

/// Suffix of approver groups.
pub const APPOWNER_SUFFIX: &str = "-appowner";
/// Suffix of the regular-access group.
pub const COLLABORATOR_SUFFIX: &str = "-collaborator";
/// Suffix of the elevated-access group.
pub const POWERUSER_SUFFIX: &str = "-poweruser";
/// Suffix of the escalation target group.
pub const DEBUG_SUFFIX: &str = "-debug";

/// Source of transitions beyond the configured ones.
#[async_trait]
pub trait TransitionDiscovery: Send + Sync {
    /// Discovers the current set of transitions.
    async fn discover(&self) -> EscalationResult<Vec<Transition>>;
}

/// Discovery by the `-appowner` / `-collaborator` / `-poweruser` / `-debug`
/// naming convention.
pub struct SuffixConventionDiscovery {
    directory: GroupDirectory,
    duration_secs: i64,
}

impl SuffixConventionDiscovery {
    /// Creates a discovery over `directory` granting `duration_secs`.
    #[must_use]
    pub fn new(directory: GroupDirectory, duration_secs: i64) -> Self {
        Self {
            directory,
            duration_secs,
        }
    }
}

#[async_trait]
impl TransitionDiscovery for SuffixConventionDiscovery {
    async fn discover(&self) -> EscalationResult<Vec<Transition>> {
        let appowners = self.directory.search_groups(APPOWNER_SUFFIX).await?;
        let collaborators = self.directory.search_groups(COLLABORATOR_SUFFIX).await?;
        let powerusers = self.directory.search_groups(POWERUSER_SUFFIX).await?;
        let debug = self.directory.search_groups(DEBUG_SUFFIX).await?;

        Ok(derive_transitions(
            &appowners,
            &collaborators,
            &powerusers,
            &debug,
            self.duration_secs,
        ))
    }
}

/// Derives transitions from the four suffix searches.
///
/// Search results are substring matches, so every name is checked exactly.
#[must_use]
pub fn derive_transitions(
    appowners: &[Group],
    collaborators: &[Group],
    powerusers: &[Group],
    debug: &[Group],
    duration_secs: i64,
) -> Vec<Transition> {
    let mut transitions = Vec::new();

    for approver in appowners {
        let Some(tenant) = approver.name.strip_suffix(APPOWNER_SUFFIX) else {
            continue;
        };
        let target = format!("{tenant}{DEBUG_SUFFIX}");
        if group::find_by_name(debug, &target).is_none() {
            tracing::debug!(tenant, "no debug group, skipping tenant");
            continue;
        }

        let collaborator = format!("{tenant}{COLLABORATOR_SUFFIX}");
        if group::find_by_name(collaborators, &collaborator).is_some() {
            transitions.push(
                Transition::new(collaborator, target.clone(), duration_secs)
                    .with_approval_group(approver.name.clone())
                    .with_self_approval(true),
            );
        }

        let poweruser = format!("{tenant}{POWERUSER_SUFFIX}");
        if group::find_by_name(powerusers, &poweruser).is_some() {
            // same target as the collaborator transition
            transitions.push(
                Transition::new(poweruser, target, duration_secs)
                    .with_approval_group(approver.name.clone())
                    .with_self_approval(true)
                    .with_global_excluded(true),
            );
        }
    }

    transitions
}
