//! Periodic reconciliation of breakglass membership.
//!
//! Every sweep walks the target group of every transition and removes any
//! member that does not carry a live expiry marker for that group. It then
//! clears expired markers left on users who are no longer members. The sweep
//! is level-triggered, so missed or interrupted sweeps are corrected by the
//! next one.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bg_core::event::{Event, EventType};
use bg_core::Clock;
use bg_directory::GroupDirectory;
use bg_model::marker::{self, MarkerStatus};
use bg_model::{Group, User};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::TransitionSource;
use crate::grant::GrantLifecycleManager;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Target groups resolved and listed.
    pub groups_checked: usize,
    /// Members inspected.
    pub members_checked: usize,
    /// Members removed.
    pub revoked: usize,
    /// Members left alone because their marker did not parse.
    pub malformed: usize,
    /// Markers cleared from users outside the group.
    pub orphans_cleared: usize,
    /// Group or member level failures.
    pub failures: Vec<String>,
}

impl SweepReport {
    /// Returns whether anything went wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.malformed == 0 && self.failures.is_empty()
    }
}

/// Removes expired or untracked breakglass memberships.
pub struct Reaper {
    transitions: Arc<dyn TransitionSource>,
    directory: GroupDirectory,
    grants: GrantLifecycleManager,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reaper {
    /// Default pause between sweeps.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    /// Creates a reaper.
    #[must_use]
    pub fn new(
        transitions: Arc<dyn TransitionSource>,
        directory: GroupDirectory,
        grants: GrantLifecycleManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transitions,
            directory,
            grants,
            clock,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    /// Sets the pause between sweeps.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one full sweep.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_until(&CancellationToken::new()).await
    }

    /// Runs one sweep, stopping between groups once `cancel` fires.
    pub async fn sweep_until(&self, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();

        let transitions = match self.transitions.transitions().await {
            Ok(transitions) => transitions,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch transitions for cleanup");
                report.failures.push(format!("transitions: {e}"));
                return report;
            }
        };
        let targets: BTreeSet<String> = transitions.into_iter().map(|t| t.to).collect();

        for name in targets {
            if cancel.is_cancelled() {
                tracing::info!("sweep cancelled");
                break;
            }
            tracing::debug!(group = %name, "cleaning up group");

            let group = match self.directory.group_by_exact_name(&name).await {
                Ok(group) => group,
                Err(e) => {
                    tracing::error!(group = %name, error = %e, "failed to fetch group during cleanup");
                    report.failures.push(format!("{name}: {e}"));
                    continue;
                }
            };
            let members = match self.directory.list_members(&group).await {
                Ok(members) => members,
                Err(e) => {
                    tracing::error!(group = %name, error = %e, "failed to list group members during cleanup");
                    report.failures.push(format!("{name}: {e}"));
                    continue;
                }
            };

            report.groups_checked += 1;
            let member_ids: HashSet<_> = members.iter().map(|m| m.id).collect();
            for member in members {
                report.members_checked += 1;
                self.reconcile_member(&group, member, &mut report).await;
            }
            self.clear_orphans(&group, &member_ids, &mut report).await;
        }

        report
    }

    /// Clears markers held by users who are not members of `group`.
    ///
    /// A live marker is left alone: a grant in flight writes the marker
    /// before the membership. It is cleared once it expires.
    async fn clear_orphans(
        &self,
        group: &Group,
        member_ids: &HashSet<Uuid>,
        report: &mut SweepReport,
    ) {
        let holders = match self.directory.users_with_marker(&group.name).await {
            Ok(holders) => holders,
            Err(e) => {
                tracing::error!(group = %group.name, error = %e, "failed to list marker holders during cleanup");
                report.failures.push(format!("{}: {e}", group.name));
                return;
            }
        };

        let now = self.clock.unix_now();
        for user in holders {
            if member_ids.contains(&user.id) {
                continue;
            }
            if let Ok(MarkerStatus::Active { .. }) =
                marker::evaluate(&user.attributes, &group.name, now)
            {
                continue;
            }

            let user_id = user.id;
            match self.grants.clear_orphan(user, &group.name).await {
                Ok(true) => report.orphans_cleared += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(user_id = %user_id, group = %group.name, error = %e, "failed to clear orphaned marker");
                    report.failures.push(format!("{}/{user_id}: {e}", group.name));
                }
            }
        }
    }

    async fn reconcile_member(&self, group: &Group, member: User, report: &mut SweepReport) {
        let now = self.clock.unix_now();
        let status = match marker::evaluate(&member.attributes, &group.name, now) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    user_id = %member.id,
                    username = %member.username,
                    group = %group.name,
                    error = %e,
                    "skipping member with malformed marker"
                );
                report.malformed += 1;
                return;
            }
        };

        let reason = match status {
            MarkerStatus::Active { .. } => return,
            MarkerStatus::Absent => "user is in group without tracked expiry".to_string(),
            MarkerStatus::Expired { expiry } => format!("time expired ({expiry} <= {now})"),
        };

        tracing::info!(
            user_id = %member.id,
            username = %member.username,
            group = %group.name,
            reason = %reason,
            "removing user from group"
        );
        let user_id = member.id;
        match self.grants.revoke(member, group).await {
            Ok(()) => {
                report.revoked += 1;
                Event::builder(EventType::GrantRevoked)
                    .at(self.clock.now())
                    .user(user_id)
                    .group(&group.name)
                    .detail("reason", &reason)
                    .emit();
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, group = %group.name, error = %e, "failed to revoke");
                report.failures.push(format!("{}/{user_id}: {e}", group.name));
                Event::builder(EventType::GrantRevoked)
                    .at(self.clock.now())
                    .user(user_id)
                    .group(&group.name)
                    .failure(e.to_string())
                    .emit();
            }
        }
    }

    /// Sweeps on the configured interval until `cancel` fires.
    ///
    /// Cancellation interrupts both an in-flight sweep and the pause.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "reaper started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            tracing::info!("running cleanup task");
            tokio::select! {
                () = cancel.cancelled() => break,
                report = self.sweep_until(&cancel) => {
                    tracing::info!(
                        groups = report.groups_checked,
                        members = report.members_checked,
                        revoked = report.revoked,
                        malformed = report.malformed,
                        orphans = report.orphans_cleared,
                        failures = report.failures.len(),
                        "finished cleanup task"
                    );
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("reaper stopped");
    }

    /// Spawns [`Self::run`] on the runtime.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
