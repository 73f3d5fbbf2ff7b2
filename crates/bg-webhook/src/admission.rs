//! `SubjectAccessReview` wire format.

use std::sync::Arc;

use bg_core::event::{Event, EventType};
use serde::{Deserialize, Serialize};

use crate::engine::{AccessReviewEngine, Decision};
use crate::error::ReviewResult;
use crate::review::SubjectAccessReviewSpec;

/// API version used when a request omits it.
pub const DEFAULT_API_VERSION: &str = "authorization.k8s.io/v1";
/// Kind used when a request omits it.
pub const DEFAULT_KIND: &str = "SubjectAccessReview";

/// Incoming admission query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReview {
    /// Request API version.
    #[serde(default)]
    pub api_version: String,
    /// Request kind.
    #[serde(default)]
    pub kind: String,
    /// The query.
    #[serde(default)]
    pub spec: SubjectAccessReviewSpec,
}

/// Status part of the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAccessReviewStatus {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Human readable reason.
    pub reason: String,
}

/// Outgoing admission answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReviewResponse {
    /// Echoed API version.
    pub api_version: String,
    /// Echoed kind.
    pub kind: String,
    /// The decision.
    pub status: SubjectAccessReviewStatus,
}

/// Answers admission queries from clusters.
pub struct AdmissionWebhook {
    engine: Arc<AccessReviewEngine>,
}

impl AdmissionWebhook {
    /// Creates a webhook over a shared review engine.
    #[must_use]
    pub const fn new(engine: Arc<AccessReviewEngine>) -> Self {
        Self { engine }
    }

    /// Returns the review engine for administrator actions.
    #[must_use]
    pub fn engine(&self) -> &Arc<AccessReviewEngine> {
        &self.engine
    }

    /// Decides a decoded query from `cluster`.
    pub fn authorize(
        &self,
        cluster: &str,
        review: &SubjectAccessReview,
    ) -> SubjectAccessReviewResponse {
        let spec = &review.spec;
        let attrs = spec.resource_attributes.clone().unwrap_or_default();
        tracing::info!(
            cluster,
            user = %spec.user,
            uid = %spec.uid,
            groups = ?spec.groups,
            verb = %attrs.verb,
            resource = %attrs.resource,
            version = %attrs.version,
            namespace = %attrs.namespace,
            group = %attrs.group,
            non_resource = ?spec.non_resource_attributes,
            "admission query"
        );

        let Decision { allowed, reason } = self.engine.decide(cluster, spec);

        Event::builder(EventType::AdmissionDecided)
            .at(self.engine.clock().now())
            .detail("cluster", cluster)
            .detail("user", &spec.user)
            .detail("allowed", allowed)
            .detail("reason", &reason)
            .emit();

        SubjectAccessReviewResponse {
            api_version: non_empty_or(&review.api_version, DEFAULT_API_VERSION),
            kind: non_empty_or(&review.kind, DEFAULT_KIND),
            status: SubjectAccessReviewStatus { allowed, reason },
        }
    }

    /// Decodes a JSON body and decides it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReviewError::Decode`] if the body is not a valid
    /// `SubjectAccessReview`.
    pub fn authorize_json(
        &self,
        cluster: &str,
        body: &[u8],
    ) -> ReviewResult<SubjectAccessReviewResponse> {
        let review: SubjectAccessReview = serde_json::from_slice(body).map_err(|e| {
            tracing::warn!(cluster, error = %e, "undecodable admission request");
            e
        })?;
        Ok(self.authorize(cluster, &review))
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
