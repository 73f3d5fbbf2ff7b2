//! Audit events for privilege changes and access decisions.
//!
//! Every grant, revocation, approval decision and admission verdict is
//! recorded as an [`Event`] and emitted on the `breakglass::audit` tracing
//! target so operators can route it separately from diagnostic logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracing target audit events are emitted on.
pub const AUDIT_TARGET: &str = "breakglass::audit";

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Escalation events
    /// An approval token was issued for a transition.
    EscalationRequested,
    /// An approver redeemed a request token.
    EscalationApproved,
    /// An approver declined a request.
    EscalationRejected,

    // Grant events
    /// Temporary membership was applied.
    GrantApplied,
    /// A user gave up an active grant early.
    GrantDropped,
    /// The reaper or an operator revoked a grant.
    GrantRevoked,

    // Review events
    /// A new pending review was recorded.
    ReviewCreated,
    /// A stale review was renewed.
    ReviewRenewed,
    /// A review was accepted by an administrator.
    ReviewAccepted,
    /// A review was rejected by an administrator.
    ReviewRejected,
    /// An admission request was answered.
    AdmissionDecided,

    // Catalog events
    /// The transition catalog was rediscovered.
    TransitionsRefreshed,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// An audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event (ISO 8601).
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// User the event concerns.
    pub user_id: Option<Uuid>,

    /// User who acted, when different from the subject.
    pub actor_id: Option<Uuid>,

    /// Group the event concerns.
    pub group: Option<String>,

    /// Error message (for failure events).
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Writes the event to the audit tracing target.
    pub fn emit(&self) {
        let details = serde_json::to_string(&self.details).unwrap_or_default();
        match self.outcome {
            EventOutcome::Success => tracing::info!(
                target: AUDIT_TARGET,
                event_id = %self.id,
                event_type = ?self.event_type,
                user_id = ?self.user_id,
                actor_id = ?self.actor_id,
                group = self.group.as_deref(),
                details = %details,
                "audit event"
            ),
            EventOutcome::Failure => tracing::warn!(
                target: AUDIT_TARGET,
                event_id = %self.id,
                event_type = ?self.event_type,
                user_id = ?self.user_id,
                actor_id = ?self.actor_id,
                group = self.group.as_deref(),
                error = self.error.as_deref(),
                details = %details,
                "audit event"
            ),
        }
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    timestamp: Option<DateTime<Utc>>,
    user_id: Option<Uuid>,
    actor_id: Option<Uuid>,
    group: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            timestamp: None,
            user_id: None,
            actor_id: None,
            group: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to success.
    #[must_use]
    pub const fn success(mut self) -> Self {
        self.outcome = EventOutcome::Success;
        self
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Stamps the event with a clock reading instead of wall time.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the subject user.
    #[must_use]
    pub const fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub const fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Sets the group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            event_type: self.event_type,
            outcome: self.outcome,
            user_id: self.user_id,
            actor_id: self.actor_id,
            group: self.group,
            error: self.error,
            details: self.details,
        }
    }

    /// Builds and emits the event.
    pub fn emit(self) -> Event {
        let event = self.build();
        event.emit();
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_creates_success_event() {
        let user_id = Uuid::now_v7();
        let approver = Uuid::now_v7();

        let event = Event::builder(EventType::GrantApplied)
            .success()
            .user(user_id)
            .actor(approver)
            .group("ops-admin")
            .detail("expires_at", 1_700_000_000)
            .build();

        assert_eq!(event.event_type, EventType::GrantApplied);
        assert_eq!(event.outcome, EventOutcome::Success);
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.actor_id, Some(approver));
        assert_eq!(event.group.as_deref(), Some("ops-admin"));
        assert_eq!(
            event.details,
            vec![("expires_at".to_string(), "1700000000".to_string())]
        );
        assert!(event.error.is_none());
    }

    #[test]
    fn builder_creates_failure_event() {
        let event = Event::builder(EventType::GrantRevoked)
            .failure("directory unavailable")
            .build();

        assert_eq!(event.outcome, EventOutcome::Failure);
        assert_eq!(event.error.as_deref(), Some("directory unavailable"));
    }

    #[test]
    fn explicit_timestamp_is_kept() {
        let ts = DateTime::from_timestamp(1_000, 0).unwrap();
        let event = Event::builder(EventType::ReviewCreated).at(ts).build();
        assert_eq!(event.timestamp, ts);
    }

    #[test]
    fn event_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&EventType::AdmissionDecided).unwrap();
        assert_eq!(json, "\"ADMISSION_DECIDED\"");
    }
}
