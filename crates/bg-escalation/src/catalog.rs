//! Cached catalog of legal transitions.
//!
//! The snapshot and its fetch time sit behind one lock. The staleness check
//! and the rediscovery run under that lock, so concurrent readers never
//! trigger duplicate discovery; they wait for the one in flight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bg_core::event::{Event, EventType};
use bg_core::Clock;
use bg_model::Transition;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::discovery::TransitionDiscovery;
use crate::error::EscalationResult;

/// Read access to the current transitions.
///
/// The reaper depends on this rather than on the concrete catalog.
#[async_trait]
pub trait TransitionSource: Send + Sync {
    /// Returns every known transition.
    async fn transitions(&self) -> EscalationResult<Vec<Transition>>;
}

#[derive(Debug, Default)]
struct Snapshot {
    transitions: Vec<Transition>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Configured transitions merged with discovered ones.
pub struct TransitionCatalog {
    discovery: Arc<dyn TransitionDiscovery>,
    configured: Vec<Transition>,
    global_groups: Vec<String>,
    staleness: chrono::Duration,
    clock: Arc<dyn Clock>,
    snapshot: Mutex<Snapshot>,
}

impl TransitionCatalog {
    /// Default snapshot lifetime.
    pub const DEFAULT_STALENESS: Duration = Duration::from_secs(3600);

    /// Creates a catalog with no configured transitions.
    #[must_use]
    pub fn new(discovery: Arc<dyn TransitionDiscovery>, clock: Arc<dyn Clock>) -> Self {
        Self {
            discovery,
            configured: Vec::new(),
            global_groups: Vec::new(),
            staleness: to_chrono(Self::DEFAULT_STALENESS),
            clock,
            snapshot: Mutex::new(Snapshot::default()),
        }
    }

    /// Sets the statically configured transitions.
    #[must_use]
    pub fn with_configured(mut self, transitions: Vec<Transition>) -> Self {
        self.configured = transitions;
        self
    }

    /// Sets the global breakglass groups.
    #[must_use]
    pub fn with_global_groups(mut self, groups: Vec<String>) -> Self {
        self.global_groups = groups;
        self
    }

    /// Sets how long a snapshot is served before rediscovery.
    #[must_use]
    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.staleness = to_chrono(staleness);
        self
    }

    /// Returns the current transitions, rediscovering when stale.
    ///
    /// # Errors
    ///
    /// Returns the discovery error; the previous snapshot is kept and the
    /// next call retries.
    pub async fn get_transitions(&self) -> EscalationResult<Vec<Transition>> {
        let mut snapshot = self.snapshot.lock().await;
        let now = self.clock.now();

        if let Some(fetched_at) = snapshot.fetched_at {
            if now - fetched_at < self.staleness {
                return Ok(snapshot.transitions.clone());
            }
        }

        tracing::info!("discovering transitions");
        let discovered = self.discovery.discover().await.map_err(|e| {
            tracing::error!(error = %e, "transition discovery failed");
            e
        })?;

        let transitions = merge(&self.configured, discovered);
        tracing::info!(count = transitions.len(), "transitions available");
        Event::builder(EventType::TransitionsRefreshed)
            .at(now)
            .detail("count", transitions.len())
            .emit();

        *snapshot = Snapshot {
            transitions: transitions.clone(),
            fetched_at: Some(now),
        };
        Ok(transitions)
    }

    /// Returns whether `group` is the target of any transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the transitions cannot be loaded.
    pub async fn is_escalation_target(&self, group: &str) -> EscalationResult<bool> {
        Ok(self.get_transitions().await?.iter().any(|t| t.to == group))
    }

    /// Returns the transitions open to global breakglass groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the transitions cannot be loaded.
    pub async fn global_transitions(&self) -> EscalationResult<Vec<Transition>> {
        Ok(self
            .get_transitions()
            .await?
            .into_iter()
            .filter(|t| !t.global_excluded)
            .collect())
    }

    /// Returns the transitions a holder of `groups` may request.
    ///
    /// Those starting from a held group, plus every global transition when a
    /// held group is a global breakglass group. Duplicates are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transitions cannot be loaded.
    pub async fn user_transitions(&self, groups: &[String]) -> EscalationResult<Vec<Transition>> {
        let all = self.get_transitions().await?;
        let held: HashSet<&str> = groups.iter().map(String::as_str).collect();
        let global = self.global_groups.iter().any(|g| held.contains(g.as_str()));

        let mut seen = HashSet::new();
        Ok(all
            .into_iter()
            .filter(|t| held.contains(t.from.as_str()) || (global && !t.global_excluded))
            .filter(|t| seen.insert((t.from.clone(), t.to.clone())))
            .collect())
    }
}

#[async_trait]
impl TransitionSource for TransitionCatalog {
    async fn transitions(&self) -> EscalationResult<Vec<Transition>> {
        self.get_transitions().await
    }
}

/// Appends discovered transitions whose `(from, to)` pair is not configured.
#[must_use]
pub fn merge(configured: &[Transition], discovered: Vec<Transition>) -> Vec<Transition> {
    let mut merged = configured.to_vec();
    for transition in discovered {
        if merged
            .iter()
            .any(|t| t.connects(&transition.from, &transition.to))
        {
            continue;
        }
        merged.push(transition);
    }
    merged
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
