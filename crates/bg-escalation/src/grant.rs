//! Applying and revoking temporary group membership.
//!
//! The expiry marker is always written before membership is added and
//! removed before membership is dropped. A crash between the two steps can
//! therefore only leave a marker without membership, never membership
//! without a marker. Nothing is rolled back; the reaper reconciles.

use std::sync::Arc;

use bg_core::event::{Event, EventType};
use bg_core::Clock;
use bg_directory::GroupDirectory;
use bg_model::marker::earliest_expiry;
use bg_model::{GrantMarker, Group, User};
use chrono::Duration;
use uuid::Uuid;

use crate::error::{EscalationError, EscalationResult};

/// Grants, drops and lists breakglass memberships.
#[derive(Clone)]
pub struct GrantLifecycleManager {
    directory: GroupDirectory,
    clock: Arc<dyn Clock>,
}

impl GrantLifecycleManager {
    /// Creates a manager over `directory`.
    #[must_use]
    pub fn new(directory: GroupDirectory, clock: Arc<dyn Clock>) -> Self {
        Self { directory, clock }
    }

    /// Grants `group_name` to the user for `duration_secs`.
    ///
    /// Any previous expiry for the same group is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::InvalidDuration`] if the expiry is not
    /// representable, or a directory error if the group or user cannot be
    /// resolved or either write fails. A failed membership write leaves the
    /// marker in place for the reaper.
    pub async fn apply(
        &self,
        user_id: Uuid,
        group_name: &str,
        duration_secs: i64,
    ) -> EscalationResult<GrantMarker> {
        let now = self.clock.now();
        let expiry = Duration::try_seconds(duration_secs)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(EscalationError::InvalidDuration(duration_secs))?
            .timestamp();

        let group = self.directory.group_by_exact_name(group_name).await?;
        let mut user = self.directory.get_user(user_id).await?;
        user.set_marker(&group.name, expiry);

        self.directory.update_user_attributes(&user).await?;
        self.directory.add_user_to_group(user.id, &group).await?;

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            group = %group.name,
            expiry,
            "breakglass granted"
        );
        Event::builder(EventType::GrantApplied)
            .at(now)
            .user(user.id)
            .group(&group.name)
            .detail("expires_at", expiry)
            .emit();

        Ok(GrantMarker::new(group.name, expiry))
    }

    /// Gives up an active grant before it expires.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::NoActiveGrant`] if the user holds no
    /// tracked grant for the group, or a directory error.
    pub async fn drop(&self, user_id: Uuid, group_name: &str) -> EscalationResult<()> {
        let active = self.active_grants(user_id).await?;
        if !active.iter().any(|g| g.group == group_name) {
            return Err(EscalationError::NoActiveGrant(group_name.to_string()));
        }

        let group = self.directory.group_by_exact_name(group_name).await?;
        let user = self.directory.get_user(user_id).await?;
        self.revoke(user, &group).await?;

        Event::builder(EventType::GrantDropped)
            .at(self.clock.now())
            .user(user_id)
            .group(group_name)
            .emit();
        Ok(())
    }

    /// Lists the tracked grants of a user.
    ///
    /// Reports every group the user belongs to that carries a marker, with
    /// the earliest parseable expiry. Values that do not parse are skipped
    /// here; the reaper reports them.
    ///
    /// # Errors
    ///
    /// Returns a directory error if the user or their groups cannot be read.
    pub async fn active_grants(&self, user_id: Uuid) -> EscalationResult<Vec<GrantMarker>> {
        let user = self.directory.get_user(user_id).await?;
        if user.has_no_attributes() {
            return Ok(Vec::new());
        }
        let groups = self.directory.user_groups(user_id).await?;

        Ok(groups
            .into_iter()
            .filter_map(|group| {
                let expiry = earliest_expiry(user.marker_values(&group.name)?)?;
                Some(GrantMarker::new(group.name, expiry))
            })
            .collect())
    }

    /// Deletes the marker (when present) and then removes membership.
    ///
    /// # Errors
    ///
    /// Returns a directory error if either write fails.
    pub async fn revoke(&self, mut user: User, group: &Group) -> EscalationResult<()> {
        if user.clear_marker(&group.name) {
            self.directory.update_user_attributes(&user).await?;
        }
        self.directory.remove_user_from_group(user.id, group).await?;

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            group = %group.name,
            "breakglass revoked"
        );
        Ok(())
    }

    /// Deletes a marker left behind without membership.
    ///
    /// Returns whether an attribute was removed.
    ///
    /// # Errors
    ///
    /// Returns a directory error if the attribute write fails.
    pub async fn clear_orphan(&self, mut user: User, group_name: &str) -> EscalationResult<bool> {
        if !user.clear_marker(group_name) {
            return Ok(false);
        }
        self.directory.update_user_attributes(&user).await?;

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            group = group_name,
            "orphaned grant marker cleared"
        );
        Ok(true)
    }
}
