//! In-memory identity provider.
//!
//! Holds groups, users and memberships in process. Tokens are opaque
//! counters; failure switches let tests exercise the session fallbacks and
//! partial sweep failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bg_model::{Group, User};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{DirectoryError, DirectoryResult};
use crate::provider::{ClientCredentials, IdentityProvider, TokenGrant};

#[derive(Default)]
struct Tokens {
    next: usize,
    access: HashSet<String>,
    refresh: HashSet<String>,
}

#[derive(Default)]
struct Directory {
    groups: HashMap<Uuid, Group>,
    users: HashMap<Uuid, User>,
    memberships: HashSet<(Uuid, Uuid)>,
    failing_groups: HashSet<Uuid>,
}

/// In-memory identity provider for development and testing.
pub struct InMemoryIdentityProvider {
    access_lifetime_secs: i64,
    refresh_lifetime_secs: i64,
    tokens: RwLock<Tokens>,
    directory: RwLock<Directory>,
    fail_authenticate: AtomicBool,
    fail_refresh: AtomicBool,
    authenticate_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    introspect_calls: AtomicUsize,
}

impl InMemoryIdentityProvider {
    /// Creates an empty provider issuing 5 minute access and 30 minute
    /// refresh tokens.
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_lifetime_secs: 300,
            refresh_lifetime_secs: 1800,
            tokens: RwLock::new(Tokens::default()),
            directory: RwLock::new(Directory::default()),
            fail_authenticate: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            authenticate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            introspect_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the lifetimes reported for issued tokens.
    #[must_use]
    pub fn with_token_lifetimes(mut self, access_secs: i64, refresh_secs: i64) -> Self {
        self.access_lifetime_secs = access_secs;
        self.refresh_lifetime_secs = refresh_secs;
        self
    }

    /// Stores a group and returns it.
    pub fn add_group(&self, group: Group) -> Group {
        self.directory.write().groups.insert(group.id, group.clone());
        group
    }

    /// Stores a user and returns it.
    pub fn add_user(&self, user: User) -> User {
        self.directory.write().users.insert(user.id, user.clone());
        user
    }

    /// Makes a user a member of a group.
    pub fn add_member(&self, user_id: Uuid, group_id: Uuid) {
        self.directory.write().memberships.insert((user_id, group_id));
    }

    /// Returns whether a user is a member of a group.
    #[must_use]
    pub fn is_member(&self, user_id: Uuid, group_id: Uuid) -> bool {
        self.directory.read().memberships.contains(&(user_id, group_id))
    }

    /// Returns the stored representation of a user.
    #[must_use]
    pub fn user(&self, user_id: Uuid) -> Option<User> {
        self.directory.read().users.get(&user_id).cloned()
    }

    /// Makes listing the members of a group fail.
    pub fn fail_members_of(&self, group_id: Uuid) {
        self.directory.write().failing_groups.insert(group_id);
    }

    /// Makes client-credentials logins fail or succeed.
    pub fn set_authenticate_failure(&self, fail: bool) {
        self.fail_authenticate.store(fail, Ordering::SeqCst);
    }

    /// Makes refreshes fail or succeed.
    pub fn set_refresh_failure(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Invalidates every issued access token.
    pub fn revoke_access_tokens(&self) {
        self.tokens.write().access.clear();
    }

    /// Number of login attempts.
    #[must_use]
    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh attempts.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of introspection calls.
    #[must_use]
    pub fn introspect_calls(&self) -> usize {
        self.introspect_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> TokenGrant {
        let mut tokens = self.tokens.write();
        tokens.next += 1;
        let access_token = format!("access-{}", tokens.next);
        let refresh_token = format!("refresh-{}", tokens.next);
        tokens.access.insert(access_token.clone());
        tokens.refresh.insert(refresh_token.clone());
        TokenGrant {
            access_token,
            refresh_token,
            expires_in: self.access_lifetime_secs,
            refresh_expires_in: self.refresh_lifetime_secs,
        }
    }

    fn check_token(&self, token: &str) -> DirectoryResult<()> {
        if self.tokens.read().access.contains(token) {
            Ok(())
        } else {
            Err(DirectoryError::Api {
                status: 401,
                message: "invalid bearer token".to_string(),
            })
        }
    }

    fn group_id_exists(&self, group_id: Uuid) -> DirectoryResult<()> {
        if self.directory.read().groups.contains_key(&group_id) {
            Ok(())
        } else {
            Err(DirectoryError::NotFound(format!("group {group_id}")))
        }
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn authenticate(&self, _credentials: &ClientCredentials) -> DirectoryResult<TokenGrant> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_authenticate.load(Ordering::SeqCst) {
            return Err(DirectoryError::Api {
                status: 401,
                message: "invalid client credentials".to_string(),
            });
        }
        Ok(self.issue())
    }

    async fn refresh(
        &self,
        _credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> DirectoryResult<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst)
            || !self.tokens.read().refresh.contains(refresh_token)
        {
            return Err(DirectoryError::Api {
                status: 400,
                message: "invalid refresh token".to_string(),
            });
        }
        Ok(self.issue())
    }

    async fn introspect(
        &self,
        _credentials: &ClientCredentials,
        access_token: &str,
    ) -> DirectoryResult<bool> {
        self.introspect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens.read().access.contains(access_token))
    }

    async fn search_groups(
        &self,
        token: &str,
        _realm: &str,
        search: &str,
    ) -> DirectoryResult<Vec<Group>> {
        self.check_token(token)?;
        let needle = search.to_lowercase();
        let mut groups: Vec<Group> = self
            .directory
            .read()
            .groups
            .values()
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn get_group_members(
        &self,
        token: &str,
        _realm: &str,
        group_id: Uuid,
    ) -> DirectoryResult<Vec<User>> {
        self.check_token(token)?;
        self.group_id_exists(group_id)?;
        let directory = self.directory.read();
        if directory.failing_groups.contains(&group_id) {
            return Err(DirectoryError::Api {
                status: 500,
                message: format!("cannot list members of {group_id}"),
            });
        }
        let mut members: Vec<User> = directory
            .memberships
            .iter()
            .filter(|(_, g)| *g == group_id)
            .filter_map(|(u, _)| directory.users.get(u).cloned())
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    async fn users_with_attribute(
        &self,
        token: &str,
        _realm: &str,
        key: &str,
    ) -> DirectoryResult<Vec<User>> {
        self.check_token(token)?;
        let mut users: Vec<User> = self
            .directory
            .read()
            .users
            .values()
            .filter(|u| u.attributes.contains_key(key))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn get_user(&self, token: &str, _realm: &str, user_id: Uuid) -> DirectoryResult<User> {
        self.check_token(token)?;
        self.user(user_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("user {user_id}")))
    }

    async fn get_user_groups(
        &self,
        token: &str,
        _realm: &str,
        user_id: Uuid,
    ) -> DirectoryResult<Vec<Group>> {
        self.check_token(token)?;
        let directory = self.directory.read();
        if !directory.users.contains_key(&user_id) {
            return Err(DirectoryError::NotFound(format!("user {user_id}")));
        }
        let mut groups: Vec<Group> = directory
            .memberships
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, g)| directory.groups.get(g).cloned())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn update_user(&self, token: &str, _realm: &str, user: &User) -> DirectoryResult<()> {
        self.check_token(token)?;
        let mut directory = self.directory.write();
        match directory.users.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(DirectoryError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn add_user_to_group(
        &self,
        token: &str,
        _realm: &str,
        user_id: Uuid,
        group_id: Uuid,
    ) -> DirectoryResult<()> {
        self.check_token(token)?;
        self.group_id_exists(group_id)?;
        self.add_member(user_id, group_id);
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        token: &str,
        _realm: &str,
        user_id: Uuid,
        group_id: Uuid,
    ) -> DirectoryResult<()> {
        self.check_token(token)?;
        self.directory.write().memberships.remove(&(user_id, group_id));
        Ok(())
    }
}
