//! Keycloak admin REST adapter.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bg_model::{Group, User};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{DirectoryError, DirectoryResult};
use crate::provider::{ClientCredentials, IdentityProvider, TokenGrant};

/// Page size for admin listings.
const PAGE_SIZE: usize = 100;

const FULL_REPRESENTATION: &[(&str, &str)] = &[("briefRepresentation", "false")];

/// [`IdentityProvider`] backed by a Keycloak server.
pub struct KeycloakProvider {
    client: reqwest::Client,
    base_url: String,
}

/// Group representation as returned by the admin API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRepresentation {
    id: Uuid,
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, Vec<String>>,
    #[serde(default)]
    sub_groups: Vec<GroupRepresentation>,
}

impl GroupRepresentation {
    /// Flattens nested subgroups into `out`.
    fn flatten_into(self, out: &mut Vec<Group>) {
        out.push(Group {
            id: self.id,
            name: self.name,
            path: self.path,
            attributes: self.attributes,
        });
        for sub in self.sub_groups {
            sub.flatten_into(out);
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
}

impl KeycloakProvider {
    /// Creates a provider for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> DirectoryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Gets the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token_url(&self, realm: &str) -> String {
        format!(
            "{}/realms/{realm}/protocol/openid-connect/token",
            self.base_url
        )
    }

    fn admin_url(&self, realm: &str, path: &str) -> String {
        format!("{}/admin/realms/{realm}{path}", self.base_url)
    }

    async fn token_request(
        &self,
        realm: &str,
        form: &[(&str, &str)],
    ) -> DirectoryResult<TokenGrant> {
        let response = self
            .client
            .post(self.token_url(realm))
            .form(form)
            .send()
            .await?;
        handle_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, url: String) -> DirectoryResult<T> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        handle_response(response).await
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, &str)],
        first: usize,
        max: usize,
    ) -> DirectoryResult<Vec<T>> {
        let (first, max) = (first.to_string(), max.to_string());
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .query(&[("first", first.as_str()), ("max", max.as_str())])
            .send()
            .await?;
        handle_response(response).await
    }
}

/// Calls `fetch(first, max)` until a page shorter than `page_size` comes back.
async fn fetch_all_pages<T, F, Fut>(page_size: usize, mut fetch: F) -> DirectoryResult<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = DirectoryResult<Vec<T>>>,
{
    let page_size = page_size.max(1);
    let mut all = Vec::new();
    loop {
        let page = fetch(all.len(), page_size).await?;
        let short = page.len() < page_size;
        all.extend(page);
        if short {
            return Ok(all);
        }
    }
}

#[async_trait]
impl IdentityProvider for KeycloakProvider {
    async fn authenticate(&self, credentials: &ClientCredentials) -> DirectoryResult<TokenGrant> {
        self.token_request(
            &credentials.realm,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> DirectoryResult<TokenGrant> {
        self.token_request(
            &credentials.realm,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn introspect(
        &self,
        credentials: &ClientCredentials,
        access_token: &str,
    ) -> DirectoryResult<bool> {
        let url = format!("{}/introspect", self.token_url(&credentials.realm));
        let response = self
            .client
            .post(url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("token", access_token)])
            .send()
            .await?;
        let body: IntrospectionResponse = handle_response(response).await?;
        Ok(body.active)
    }

    async fn search_groups(
        &self,
        token: &str,
        realm: &str,
        search: &str,
    ) -> DirectoryResult<Vec<Group>> {
        let url = self.admin_url(realm, "/groups");
        let url = url.as_str();
        let query = [("search", search), ("briefRepresentation", "false")];
        let query = &query[..];
        let tree: Vec<GroupRepresentation> = fetch_all_pages(PAGE_SIZE, move |first, max| {
            self.get_page(token, url, query, first, max)
        })
        .await?;

        let mut groups = Vec::new();
        for group in tree {
            group.flatten_into(&mut groups);
        }
        Ok(groups)
    }

    async fn get_group_members(
        &self,
        token: &str,
        realm: &str,
        group_id: Uuid,
    ) -> DirectoryResult<Vec<User>> {
        let url = self.admin_url(realm, &format!("/groups/{group_id}/members"));
        let url = url.as_str();
        fetch_all_pages(PAGE_SIZE, move |first, max| {
            self.get_page(token, url, FULL_REPRESENTATION, first, max)
        })
        .await
    }

    async fn users_with_attribute(
        &self,
        token: &str,
        realm: &str,
        key: &str,
    ) -> DirectoryResult<Vec<User>> {
        let url = self.admin_url(realm, "/users");
        let url = url.as_str();
        let users: Vec<User> = fetch_all_pages(PAGE_SIZE, move |first, max| {
            self.get_page(token, url, FULL_REPRESENTATION, first, max)
        })
        .await?;
        Ok(users
            .into_iter()
            .filter(|u| u.attributes.contains_key(key))
            .collect())
    }

    async fn get_user(&self, token: &str, realm: &str, user_id: Uuid) -> DirectoryResult<User> {
        self.get(token, self.admin_url(realm, &format!("/users/{user_id}")))
            .await
    }

    async fn get_user_groups(
        &self,
        token: &str,
        realm: &str,
        user_id: Uuid,
    ) -> DirectoryResult<Vec<Group>> {
        let groups: Vec<GroupRepresentation> = self
            .get(token, self.admin_url(realm, &format!("/users/{user_id}/groups")))
            .await?;
        let mut flat = Vec::new();
        for group in groups {
            group.flatten_into(&mut flat);
        }
        Ok(flat)
    }

    async fn update_user(&self, token: &str, realm: &str, user: &User) -> DirectoryResult<()> {
        let response = self
            .client
            .put(self.admin_url(realm, &format!("/users/{}", user.id)))
            .bearer_auth(token)
            .json(user)
            .send()
            .await?;
        handle_empty_response(response).await
    }

    async fn add_user_to_group(
        &self,
        token: &str,
        realm: &str,
        user_id: Uuid,
        group_id: Uuid,
    ) -> DirectoryResult<()> {
        let response = self
            .client
            .put(self.admin_url(realm, &format!("/users/{user_id}/groups/{group_id}")))
            .bearer_auth(token)
            .send()
            .await?;
        handle_empty_response(response).await
    }

    async fn remove_user_from_group(
        &self,
        token: &str,
        realm: &str,
        user_id: Uuid,
        group_id: Uuid,
    ) -> DirectoryResult<()> {
        let response = self
            .client
            .delete(self.admin_url(realm, &format!("/users/{user_id}/groups/{group_id}")))
            .bearer_auth(token)
            .send()
            .await?;
        handle_empty_response(response).await
    }
}

/// Handles a response with a body.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> DirectoryResult<T> {
    let status = response.status();

    if status.is_success() {
        response.json().await.map_err(DirectoryError::from)
    } else {
        Err(api_error(status, response).await)
    }
}

/// Handles a response without a body.
async fn handle_empty_response(response: reqwest::Response) -> DirectoryResult<()> {
    let status = response.status();

    if status.is_success() {
        Ok(())
    } else {
        Err(api_error(status, response).await)
    }
}

async fn api_error(status: reqwest::StatusCode, response: reqwest::Response) -> DirectoryError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status == reqwest::StatusCode::NOT_FOUND {
        DirectoryError::NotFound(message)
    } else {
        DirectoryError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let provider = KeycloakProvider::new("https://sso.example.com/").unwrap();
        assert_eq!(
            provider.token_url("master"),
            "https://sso.example.com/realms/master/protocol/openid-connect/token"
        );
        assert_eq!(
            provider.admin_url("fleet", "/groups"),
            "https://sso.example.com/admin/realms/fleet/groups"
        );
    }

    #[test]
    fn nested_groups_are_flattened() {
        let json = r#"[{
            "id": "0190a5e4-0000-7000-8000-000000000001",
            "name": "team",
            "path": "/team",
            "subGroups": [{
                "id": "0190a5e4-0000-7000-8000-000000000002",
                "name": "team-debug",
                "path": "/team/team-debug",
                "attributes": {"tier": ["gold"]}
            }]
        }]"#;
        let tree: Vec<GroupRepresentation> = serde_json::from_str(json).unwrap();

        let mut groups = Vec::new();
        for group in tree {
            group.flatten_into(&mut groups);
        }

        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["team", "team-debug"]);
        assert_eq!(groups[1].attributes["tier"], vec!["gold"]);
    }

    fn pager(
        items: Vec<u32>,
        calls: &AtomicUsize,
    ) -> impl FnMut(usize, usize) -> std::future::Ready<DirectoryResult<Vec<u32>>> + '_ {
        move |first, max| {
            calls.fetch_add(1, Ordering::SeqCst);
            let page = items.iter().skip(first).take(max).copied().collect();
            std::future::ready(Ok(page))
        }
    }

    #[tokio::test]
    async fn paging_collects_until_short_page() {
        let items: Vec<u32> = (0..250).collect();
        let calls = AtomicUsize::new(0);

        let all = fetch_all_pages(100, pager(items.clone(), &calls)).await.unwrap();

        assert_eq!(all, items);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn full_last_page_needs_one_more_request() {
        let items: Vec<u32> = (0..200).collect();
        let calls = AtomicUsize::new(0);

        let all = fetch_all_pages(100, pager(items.clone(), &calls)).await.unwrap();

        assert_eq!(all.len(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn paging_stops_on_error() {
        let calls = AtomicUsize::new(0);

        let err = fetch_all_pages::<u32, _, _>(10, |first, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if first == 0 {
                Ok((0..10).collect())
            } else {
                Err(DirectoryError::Transport("reset".into()))
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, DirectoryError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn token_grant_parses_keycloak_response() {
        let json = r#"{
            "access_token": "a",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "refresh_token": "r",
            "token_type": "Bearer",
            "not-before-policy": 0,
            "scope": "profile email"
        }"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.expires_in, 300);
        assert_eq!(grant.refresh_token, "r");
    }
}
