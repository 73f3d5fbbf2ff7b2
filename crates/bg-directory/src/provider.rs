//! Identity provider boundary.

use async_trait::async_trait;
use bg_model::{Group, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DirectoryResult;

/// Service client credentials.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// Client id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Realm the client authenticates against.
    pub realm: String,
}

impl ClientCredentials {
    /// Creates client credentials.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            realm: realm.into(),
        }
    }
}

/// Tokens returned by authenticate and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: i64,
}

/// Operations the engine consumes from the identity provider.
///
/// Every call after authentication carries the access token of the current
/// service session and names the realm it operates on.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Performs a client-credentials login.
    async fn authenticate(&self, credentials: &ClientCredentials) -> DirectoryResult<TokenGrant>;

    /// Exchanges a refresh token for a new grant.
    async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> DirectoryResult<TokenGrant>;

    /// Asks the provider whether an access token is still active.
    async fn introspect(
        &self,
        credentials: &ClientCredentials,
        access_token: &str,
    ) -> DirectoryResult<bool>;

    /// Searches groups whose name contains `search`.
    async fn search_groups(
        &self,
        token: &str,
        realm: &str,
        search: &str,
    ) -> DirectoryResult<Vec<Group>>;

    /// Lists the members of a group.
    async fn get_group_members(
        &self,
        token: &str,
        realm: &str,
        group_id: Uuid,
    ) -> DirectoryResult<Vec<User>>;

    /// Lists the users carrying attribute `key`, whatever its value.
    async fn users_with_attribute(
        &self,
        token: &str,
        realm: &str,
        key: &str,
    ) -> DirectoryResult<Vec<User>>;

    /// Gets a user by id.
    async fn get_user(&self, token: &str, realm: &str, user_id: Uuid) -> DirectoryResult<User>;

    /// Lists the groups a user belongs to.
    async fn get_user_groups(
        &self,
        token: &str,
        realm: &str,
        user_id: Uuid,
    ) -> DirectoryResult<Vec<Group>>;

    /// Replaces a user's representation, attributes included.
    async fn update_user(&self, token: &str, realm: &str, user: &User) -> DirectoryResult<()>;

    /// Adds a user to a group.
    async fn add_user_to_group(
        &self,
        token: &str,
        realm: &str,
        user_id: Uuid,
        group_id: Uuid,
    ) -> DirectoryResult<()>;

    /// Removes a user from a group.
    async fn remove_user_from_group(
        &self,
        token: &str,
        realm: &str,
        user_id: Uuid,
        group_id: Uuid,
    ) -> DirectoryResult<()>;
}
