//! Grant marker serialization contract.
//!
//! An active grant of group `G` to a user is tracked by a user attribute
//! keyed `breakglass-G` whose value is the Unix expiry timestamp in decimal.
//! The engine always writes exactly one value; readers tolerate several and
//! take the minimum. A value that does not parse as an integer is malformed:
//! the reaper surfaces it and leaves the member alone until it is fixed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute key prefix for grant markers.
pub const MARKER_PREFIX: &str = "breakglass-";

/// Returns the attribute key tracking a grant of `group_name`.
#[must_use]
pub fn marker_key(group_name: &str) -> String {
    format!("{MARKER_PREFIX}{group_name}")
}

/// Encodes an expiry for storage.
#[must_use]
pub fn encode_expiry(expiry: i64) -> String {
    expiry.to_string()
}

/// A marker value that is not a Unix timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed grant marker {key}: '{value}' is not a unix timestamp")]
pub struct MalformedMarker {
    /// Attribute key.
    pub key: String,
    /// Offending value.
    pub value: String,
}

/// Reconciliation view of a user's marker for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStatus {
    /// No marker (or no attributes at all).
    Absent,
    /// Marker present, earliest expiry is at or before now.
    Expired {
        /// Earliest expiry.
        expiry: i64,
    },
    /// Marker present and in the future.
    Active {
        /// Earliest expiry.
        expiry: i64,
    },
}

impl MarkerStatus {
    /// Returns whether membership backed by this marker must be revoked.
    #[must_use]
    pub const fn requires_revocation(self) -> bool {
        matches!(self, Self::Absent | Self::Expired { .. })
    }
}

/// Evaluates the marker for `group_name` against `now` (Unix seconds).
///
/// Every value must parse; the minimum decides.
///
/// ## Errors
///
/// Returns [`MalformedMarker`] for the first value that is not an integer.
pub fn evaluate(
    attributes: &HashMap<String, Vec<String>>,
    group_name: &str,
    now: i64,
) -> Result<MarkerStatus, MalformedMarker> {
    let key = marker_key(group_name);
    let Some(values) = attributes.get(&key).filter(|v| !v.is_empty()) else {
        return Ok(MarkerStatus::Absent);
    };

    let mut earliest = i64::MAX;
    for value in values {
        let expiry = value.trim().parse::<i64>().map_err(|_| MalformedMarker {
            key: key.clone(),
            value: value.clone(),
        })?;
        earliest = earliest.min(expiry);
    }

    if earliest <= now {
        Ok(MarkerStatus::Expired { expiry: earliest })
    } else {
        Ok(MarkerStatus::Active { expiry: earliest })
    }
}

/// Lenient read: the earliest parseable value, skipping malformed ones.
#[must_use]
pub fn earliest_expiry(values: &[String]) -> Option<i64> {
    values
        .iter()
        .filter_map(|v| v.trim().parse::<i64>().ok())
        .min()
}

/// A tracked grant of one group to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantMarker {
    /// Granted group name.
    pub group: String,
    /// Expiry as Unix seconds.
    pub expires_at: i64,
}

impl GrantMarker {
    /// Creates a marker.
    #[must_use]
    pub fn new(group: impl Into<String>, expires_at: i64) -> Self {
        Self {
            group: group.into(),
            expires_at,
        }
    }

    /// Returns the attribute key for this marker.
    #[must_use]
    pub fn key(&self) -> String {
        marker_key(&self.group)
    }

    /// Returns whether the grant is still live at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn attrs(values: &[&str]) -> HashMap<String, Vec<String>> {
        let mut map = HashMap::new();
        map.insert(
            marker_key("team-debug"),
            values.iter().map(|v| (*v).to_string()).collect(),
        );
        map
    }

    #[test]
    fn key_format() {
        assert_eq!(marker_key("team-debug"), "breakglass-team-debug");
    }

    #[test]
    fn absent_when_no_attributes_or_key() {
        assert_eq!(evaluate(&HashMap::new(), "team-debug", 0), Ok(MarkerStatus::Absent));
        assert_eq!(evaluate(&attrs(&[]), "team-debug", 0), Ok(MarkerStatus::Absent));
        assert_eq!(evaluate(&attrs(&["5"]), "other", 0), Ok(MarkerStatus::Absent));
    }

    #[test]
    fn minimum_value_wins() {
        let status = evaluate(&attrs(&["200", "100"]), "team-debug", 150).unwrap();
        assert_eq!(status, MarkerStatus::Expired { expiry: 100 });

        let status = evaluate(&attrs(&["200", "300"]), "team-debug", 150).unwrap();
        assert_eq!(status, MarkerStatus::Active { expiry: 200 });
    }

    #[test]
    fn expiry_equal_to_now_is_expired() {
        let status = evaluate(&attrs(&["100"]), "team-debug", 100).unwrap();
        assert!(status.requires_revocation());
    }

    #[test]
    fn malformed_value_is_an_error() {
        let err = evaluate(&attrs(&["100", "soon"]), "team-debug", 0).unwrap_err();
        assert_eq!(err.value, "soon");
        assert_eq!(err.key, "breakglass-team-debug");
    }

    #[test]
    fn lenient_read_skips_malformed() {
        let values = vec!["x".to_string(), "42".to_string(), "17".to_string()];
        assert_eq!(earliest_expiry(&values), Some(17));
        assert_eq!(earliest_expiry(&["x".to_string()]), None);
    }

    #[test]
    fn grant_marker_liveness() {
        let marker = GrantMarker::new("team-debug", 1_000);
        let before = Utc.timestamp_opt(999, 0).unwrap();
        let at = Utc.timestamp_opt(1_000, 0).unwrap();
        assert!(marker.is_live(before));
        assert!(!marker.is_live(at));
        assert_eq!(marker.key(), "breakglass-team-debug");
    }
}
