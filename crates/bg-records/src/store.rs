//! Record store boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::RecordResult;
use crate::selector::{FieldSelector, Selectable};

/// Object metadata shared by every record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Unique name within the kind. Generated on create when empty.
    #[serde(default)]
    pub name: String,
    /// Set by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata with a fixed name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creation_timestamp: None,
        }
    }
}

/// A record kind kept in a [`RecordStore`].
pub trait Record: Selectable + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Status subresource.
    type Status: Clone + Send + Sync + 'static;

    /// Returns the metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Returns the metadata for mutation.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Replaces the status.
    fn set_status(&mut self, status: Self::Status);
}

/// Queryable store for one record kind.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Lists records matching every selector term.
    ///
    /// ## Errors
    ///
    /// Returns `RecordError::UnsupportedField` if the selector names a field
    /// the kind does not index.
    async fn list(&self, selector: &FieldSelector) -> RecordResult<Vec<R>>;

    /// Gets a record by name.
    ///
    /// ## Errors
    ///
    /// Returns `RecordError::NotFound` if no record has this name.
    async fn get(&self, name: &str) -> RecordResult<R>;

    /// Creates a record and returns it as stored.
    ///
    /// ## Errors
    ///
    /// Returns `RecordError::Duplicate` if the name is taken.
    async fn create(&self, record: R) -> RecordResult<R>;

    /// Replaces the status of a record, leaving its spec untouched.
    ///
    /// ## Errors
    ///
    /// Returns `RecordError::NotFound` if no record has this name.
    async fn update_status(&self, name: &str, status: R::Status) -> RecordResult<R>;
}
