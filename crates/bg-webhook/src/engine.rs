//! Admission review state machine.
//!
//! Reviews move `Pending -> Accepted | Rejected` only through an explicit
//! administrator action. A review whose validity has elapsed is stale: it
//! does not deny by itself, it causes a fresh Pending review for the next
//! query. Decided reviews are kept as history and never change again. The whole decision runs under the ledger lock, so racing queries
//! for a new subject create a single Pending record.

use std::sync::Arc;

use bg_core::config::{ReviewConfig, ReviewRenewal};
use bg_core::event::{Event, EventType};
use bg_core::Clock;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{ReviewError, ReviewResult};
use crate::review::{ReviewRecord, ReviewStatus, SubjectAccessReviewSpec};

/// Reason given while a review is outstanding.
pub const REASON_PENDING: &str = "pending administrator review";
/// Reason given after a rejection.
pub const REASON_REJECTED: &str = "previously rejected; new request will be created";
/// Reason given when access is allowed.
pub const REASON_ACCEPTED: &str = "accepted by administrator";

/// Answer to an admission query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Human readable reason.
    pub reason: String,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: REASON_ACCEPTED.to_string(),
        }
    }

    fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

/// Keeps the review ledger and decides admission queries.
pub struct AccessReviewEngine {
    ledger: Mutex<Vec<ReviewRecord>>,
    validity: Duration,
    renewal: ReviewRenewal,
    clock: Arc<dyn Clock>,
}

impl AccessReviewEngine {
    /// Default review validity in seconds.
    pub const DEFAULT_VALIDITY_SECS: i64 = 300;

    /// Creates an empty ledger.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Mutex::new(Vec::new()),
            validity: Duration::seconds(Self::DEFAULT_VALIDITY_SECS),
            renewal: ReviewRenewal::default(),
            clock,
        }
    }

    /// Creates an engine from the review configuration section.
    #[must_use]
    pub fn from_config(config: &ReviewConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(clock)
            .with_validity(config.validity_secs)
            .with_renewal(config.renewal)
    }

    /// Sets how long a review stays valid.
    #[must_use]
    pub fn with_validity(mut self, secs: i64) -> Self {
        self.validity = Duration::try_seconds(secs).unwrap_or(Duration::MAX);
        self
    }

    /// Sets the stale review policy.
    #[must_use]
    pub fn with_renewal(mut self, renewal: ReviewRenewal) -> Self {
        self.renewal = renewal;
        self
    }

    /// Returns the clock reviews are stamped with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Decides an admission query for `subject` on `cluster`.
    ///
    /// Any live accepted review allows. Otherwise a live pending review
    /// denies as pending, and a live rejected review denies as rejected
    /// without creating a new review. With no live review at all a pending
    /// one is opened and the query denies as pending. Decided reviews are
    /// never reopened.
    pub fn decide(&self, cluster: &str, subject: &SubjectAccessReviewSpec) -> Decision {
        let now = self.clock.now();
        let mut ledger = self.ledger.lock();

        let matching: Vec<usize> = ledger
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(cluster, subject))
            .map(|(i, _)| i)
            .collect();

        if matching.is_empty() {
            let id = self.create(&mut ledger, cluster, subject, now);
            tracing::info!(review_id = %id, cluster, user = %subject.user, "review created");
            return Decision::deny(REASON_PENDING);
        }

        let live: Vec<ReviewStatus> = matching
            .iter()
            .map(|&i| &ledger[i])
            .filter(|r| !r.is_stale(now))
            .map(|r| r.status)
            .collect();

        if live.contains(&ReviewStatus::Accepted) {
            return Decision::allow();
        }
        if live.contains(&ReviewStatus::Pending) {
            return Decision::deny(REASON_PENDING);
        }
        if live.contains(&ReviewStatus::Rejected) {
            return Decision::deny(REASON_REJECTED);
        }

        self.replace_stale(&mut ledger, &matching, cluster, subject, now);
        Decision::deny(REASON_PENDING)
    }

    /// Opens a pending review once every matching one is stale.
    ///
    /// Under [`ReviewRenewal::ReplaceInPlace`] the newest stale pending
    /// review gets a fresh validity window. Accepted and rejected reviews
    /// stay as recorded, so a new pending review is appended beside them.
    fn replace_stale(
        &self,
        ledger: &mut Vec<ReviewRecord>,
        matching: &[usize],
        cluster: &str,
        subject: &SubjectAccessReviewSpec,
        now: DateTime<Utc>,
    ) {
        let renewable = match self.renewal {
            ReviewRenewal::ReplaceInPlace => matching
                .iter()
                .rev()
                .copied()
                .find(|&i| ledger[i].status == ReviewStatus::Pending),
            ReviewRenewal::Append => None,
        };

        if let Some(i) = renewable {
            let record = &mut ledger[i];
            record.valid_until = self.expiry(now);
            tracing::info!(review_id = %record.id, cluster, user = %subject.user, "stale review renewed");
            Event::builder(EventType::ReviewRenewed)
                .at(now)
                .detail("review_id", record.id)
                .detail("cluster", cluster)
                .detail("user", &subject.user)
                .emit();
            return;
        }

        let id = self.create(ledger, cluster, subject, now);
        tracing::info!(review_id = %id, cluster, user = %subject.user, "replacement review created");
    }

    /// Accepts a pending review.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`] for an unknown id and
    /// [`ReviewError::AlreadyDecided`] unless the review is pending.
    pub fn accept(&self, id: Uuid) -> ReviewResult<ReviewRecord> {
        self.set_status(id, ReviewStatus::Accepted, EventType::ReviewAccepted)
    }

    /// Rejects a pending review.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NotFound`] for an unknown id and
    /// [`ReviewError::AlreadyDecided`] unless the review is pending.
    pub fn reject(&self, id: Uuid) -> ReviewResult<ReviewRecord> {
        self.set_status(id, ReviewStatus::Rejected, EventType::ReviewRejected)
    }

    /// Returns a copy of every review.
    #[must_use]
    pub fn reviews(&self) -> Vec<ReviewRecord> {
        self.ledger.lock().clone()
    }

    /// Returns the reviews for one subject on one cluster.
    #[must_use]
    pub fn subject_reviews(
        &self,
        cluster: &str,
        subject: &SubjectAccessReviewSpec,
    ) -> Vec<ReviewRecord> {
        self.ledger
            .lock()
            .iter()
            .filter(|r| r.matches(cluster, subject))
            .cloned()
            .collect()
    }

    /// Returns the reviews waiting for an administrator.
    #[must_use]
    pub fn pending(&self) -> Vec<ReviewRecord> {
        let now = self.clock.now();
        self.ledger
            .lock()
            .iter()
            .filter(|r| r.status == ReviewStatus::Pending && !r.is_stale(now))
            .cloned()
            .collect()
    }

    fn create(
        &self,
        ledger: &mut Vec<ReviewRecord>,
        cluster: &str,
        subject: &SubjectAccessReviewSpec,
        now: DateTime<Utc>,
    ) -> Uuid {
        let record = ReviewRecord::pending(cluster, subject.clone(), now, self.expiry(now));
        let id = record.id;
        Event::builder(EventType::ReviewCreated)
            .at(now)
            .detail("review_id", id)
            .detail("cluster", cluster)
            .detail("user", &subject.user)
            .emit();
        ledger.push(record);
        id
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.validity)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn set_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        event: EventType,
    ) -> ReviewResult<ReviewRecord> {
        let mut ledger = self.ledger.lock();
        let record = ledger
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ReviewError::NotFound(id))?;

        if record.status != ReviewStatus::Pending {
            return Err(ReviewError::AlreadyDecided {
                id,
                status: record.status,
            });
        }
        record.status = status;

        tracing::info!(review_id = %id, status = %status, "review decided");
        Event::builder(event)
            .at(self.clock.now())
            .detail("review_id", id)
            .detail("cluster", &record.cluster)
            .detail("user", &record.subject.user)
            .emit();
        Ok(record.clone())
    }
}
