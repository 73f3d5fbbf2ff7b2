//! Group and user queries against the managed realm.

use std::sync::Arc;

use bg_model::marker::marker_key;
use bg_model::{Group, User};
use uuid::Uuid;

use crate::error::{DirectoryError, DirectoryResult};
use crate::provider::IdentityProvider;
use crate::session::TokenLifecycleManager;

/// Query and mutation surface over the identity provider.
///
/// Every call fetches a valid session first. Nothing is cached here.
#[derive(Clone)]
pub struct GroupDirectory {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<TokenLifecycleManager>,
    realm: String,
}

impl GroupDirectory {
    /// Creates a directory over `realm`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<TokenLifecycleManager>,
        realm: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            sessions,
            realm: realm.into(),
        }
    }

    /// Returns the managed realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Searches groups whose name contains `substring`.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the search fails.
    pub async fn search_groups(&self, substring: &str) -> DirectoryResult<Vec<Group>> {
        let token = self.sessions.access_token().await?;
        self.provider
            .search_groups(&token, &self.realm, substring)
            .await
    }

    /// Returns the single group named exactly `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] if no group has the name and
    /// [`DirectoryError::AmbiguousGroup`] if more than one does.
    pub async fn group_by_exact_name(&self, name: &str) -> DirectoryResult<Group> {
        let mut matches = self
            .search_groups(name)
            .await?
            .into_iter()
            .filter(|g| g.name == name);

        let group = matches
            .next()
            .ok_or_else(|| DirectoryError::NotFound(format!("group {name}")))?;
        if matches.next().is_some() {
            return Err(DirectoryError::AmbiguousGroup(name.to_string()));
        }
        Ok(group)
    }

    /// Lists the members of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the listing fails.
    pub async fn list_members(&self, group: &Group) -> DirectoryResult<Vec<User>> {
        let token = self.sessions.access_token().await?;
        self.provider
            .get_group_members(&token, &self.realm, group.id)
            .await
    }

    /// Lists the users carrying a grant marker for `group_name`, members or
    /// not.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the listing fails.
    pub async fn users_with_marker(&self, group_name: &str) -> DirectoryResult<Vec<User>> {
        let token = self.sessions.access_token().await?;
        self.provider
            .users_with_attribute(&token, &self.realm, &marker_key(group_name))
            .await
    }

    /// Gets a user by id.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] if the user does not exist.
    pub async fn get_user(&self, user_id: Uuid) -> DirectoryResult<User> {
        let token = self.sessions.access_token().await?;
        self.provider.get_user(&token, &self.realm, user_id).await
    }

    /// Lists the groups a user currently belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the lookup fails.
    pub async fn user_groups(&self, user_id: Uuid) -> DirectoryResult<Vec<Group>> {
        let token = self.sessions.access_token().await?;
        self.provider
            .get_user_groups(&token, &self.realm, user_id)
            .await
    }

    /// Writes a user's attributes back to the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the update fails.
    pub async fn update_user_attributes(&self, user: &User) -> DirectoryResult<()> {
        let token = self.sessions.access_token().await?;
        self.provider.update_user(&token, &self.realm, user).await
    }

    /// Adds a user to a group.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the call fails.
    pub async fn add_user_to_group(&self, user_id: Uuid, group: &Group) -> DirectoryResult<()> {
        let token = self.sessions.access_token().await?;
        self.provider
            .add_user_to_group(&token, &self.realm, user_id, group.id)
            .await
    }

    /// Removes a user from a group.
    ///
    /// # Errors
    ///
    /// Returns an error if no session can be obtained or the call fails.
    pub async fn remove_user_from_group(
        &self,
        user_id: Uuid,
        group: &Group,
    ) -> DirectoryResult<()> {
        let token = self.sessions.access_token().await?;
        self.provider
            .remove_user_from_group(&token, &self.realm, user_id, group.id)
            .await
    }
}
