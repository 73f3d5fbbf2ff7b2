//! Escalation request and approval flow.

use std::sync::Arc;

use bg_core::event::{Event, EventType};
use bg_core::Clock;
use bg_directory::GroupDirectory;
use bg_model::{GrantMarker, Requestor, Transition};
use uuid::Uuid;

use crate::approval::{is_allowed_approver, ApprovalClaims, ApprovalTokenProtocol};
use crate::catalog::TransitionCatalog;
use crate::error::{EscalationError, EscalationResult};
use crate::grant::GrantLifecycleManager;

/// An identity acting on an approval token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approver {
    /// User id.
    pub id: Uuid,
    /// Names of the groups the user holds.
    pub groups: Vec<String>,
}

impl Approver {
    /// Creates an approver.
    #[must_use]
    pub fn new(id: Uuid, groups: Vec<String>) -> Self {
        Self { id, groups }
    }
}

/// Ties the catalog, approval tokens and grants together.
#[derive(Clone)]
pub struct BreakglassService {
    catalog: Arc<TransitionCatalog>,
    approvals: Arc<ApprovalTokenProtocol>,
    grants: GrantLifecycleManager,
    directory: GroupDirectory,
    clock: Arc<dyn Clock>,
}

impl BreakglassService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        catalog: Arc<TransitionCatalog>,
        approvals: Arc<ApprovalTokenProtocol>,
        grants: GrantLifecycleManager,
        directory: GroupDirectory,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            approvals,
            grants,
            directory,
            clock,
        }
    }

    /// Returns the transitions the user may currently request.
    ///
    /// # Errors
    ///
    /// Returns an error if the user's groups or the catalog cannot be read.
    pub async fn available_transitions(&self, user_id: Uuid) -> EscalationResult<Vec<Transition>> {
        let groups = self.group_names(user_id).await?;
        self.catalog.user_transitions(&groups).await
    }

    /// Resolves an approver's groups from the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the user's groups cannot be read.
    pub async fn resolve_approver(&self, user_id: Uuid) -> EscalationResult<Approver> {
        Ok(Approver::new(user_id, self.group_names(user_id).await?))
    }

    /// Issues an approval token for the user's `from -> to` transition.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::TransitionNotAvailable`] if the user may
    /// not request the transition.
    pub async fn request(&self, user_id: Uuid, from: &str, to: &str) -> EscalationResult<String> {
        let user = self.directory.get_user(user_id).await?;
        let transition = self
            .available_transitions(user_id)
            .await?
            .into_iter()
            .find(|t| t.connects(from, to))
            .ok_or_else(|| EscalationError::TransitionNotAvailable {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let requestor = Requestor {
            name: user.display_name(),
            email: user.email.clone().unwrap_or_default(),
        };
        let token = self.approvals.issue(&transition, user.id, requestor)?;

        tracing::info!(user_id = %user.id, from, to, "breakglass requested");
        Event::builder(EventType::EscalationRequested)
            .at(self.clock.now())
            .user(user.id)
            .group(to)
            .detail("from", from)
            .emit();
        Ok(token)
    }

    /// Approves a request and grants the target group to the requester.
    ///
    /// # Errors
    ///
    /// Returns a token error if the token does not verify,
    /// [`EscalationError::NotAllowedApprover`] if the approver may not sign
    /// off, or the grant error.
    pub async fn approve(&self, token: &str, approver: &Approver) -> EscalationResult<GrantMarker> {
        let claims = self.authorize(token, approver, EventType::EscalationApproved)?;
        let transition = &claims.transition;

        let marker = self
            .grants
            .apply(claims.subject, &transition.to, transition.duration)
            .await?;

        tracing::info!(
            user_id = %claims.subject,
            approver_id = %approver.id,
            group = %transition.to,
            "breakglass approved"
        );
        Event::builder(EventType::EscalationApproved)
            .at(self.clock.now())
            .user(claims.subject)
            .actor(approver.id)
            .group(&transition.to)
            .emit();
        Ok(marker)
    }

    /// Declines a request. Nothing is granted.
    ///
    /// # Errors
    ///
    /// Same checks as [`Self::approve`].
    pub fn reject(&self, token: &str, approver: &Approver) -> EscalationResult<ApprovalClaims> {
        let claims = self.authorize(token, approver, EventType::EscalationRejected)?;

        tracing::info!(
            user_id = %claims.subject,
            approver_id = %approver.id,
            group = %claims.transition.to,
            "breakglass rejected"
        );
        Event::builder(EventType::EscalationRejected)
            .at(self.clock.now())
            .user(claims.subject)
            .actor(approver.id)
            .group(&claims.transition.to)
            .emit();
        Ok(claims)
    }

    /// Drops the user's active grant of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::NoActiveGrant`] if there is none.
    pub async fn drop(&self, user_id: Uuid, group: &str) -> EscalationResult<()> {
        self.grants.drop(user_id, group).await
    }

    /// Lists the user's active grants.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be read.
    pub async fn active_grants(&self, user_id: Uuid) -> EscalationResult<Vec<GrantMarker>> {
        self.grants.active_grants(user_id).await
    }

    fn authorize(
        &self,
        token: &str,
        approver: &Approver,
        action: EventType,
    ) -> EscalationResult<ApprovalClaims> {
        let claims = self.approvals.verify(token).map_err(|e| {
            tracing::warn!(approver_id = %approver.id, error = %e, "approval token rejected");
            e
        })?;

        if !is_allowed_approver(approver.id, &approver.groups, &claims) {
            tracing::warn!(
                user_id = %claims.subject,
                approver_id = %approver.id,
                group = %claims.transition.to,
                "approver not allowed"
            );
            Event::builder(action)
                .at(self.clock.now())
                .user(claims.subject)
                .actor(approver.id)
                .group(&claims.transition.to)
                .failure("not an allowed approver")
                .emit();
            return Err(EscalationError::NotAllowedApprover);
        }
        Ok(claims)
    }

    async fn group_names(&self, user_id: Uuid) -> EscalationResult<Vec<String>> {
        Ok(self
            .directory
            .user_groups(user_id)
            .await?
            .into_iter()
            .map(|g| g.name)
            .collect())
    }
}
