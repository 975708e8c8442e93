//! Remote user directory access and the user mirror built on it.
//!
//! [`ScimDirectory`] talks SCIM 2.0 (`/Users`) over HTTP with a bearer token.
//! [`UserMirror`] pushes local [`User`]s as directory entries; local state is
//! authoritative, so its pull is the default no-op. [`load`] and [`merge`] are used
//! when importing the directory.

use crate::config::HttpClientConfig;
use crate::model::{DirectorySettings, TenantId, User, UserStatus};
use crate::sync::{DirectoryMirror, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

const SCIM_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
const SCIM_CONTENT_TYPE: &str = "application/scim+json";
const PAGE_SIZE: usize = 100;

/// A user as the remote directory knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    /// Directory-assigned id; `None` until created remotely.
    pub id: Option<String>,
    pub user_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub active: bool,
    pub last_modified: Option<DateTime<Utc>>,
}

impl DirectoryEntry {
    /// Entry describing a local user; the login email is `username@email_domain`.
    pub fn from_user(user: &User, email_domain: &str) -> Self {
        Self {
            id: None,
            user_name: user.username.clone(),
            given_name: user.first_name.clone(),
            family_name: user.last_name.clone(),
            display_name: Some(user.effective_display_name()),
            email: Some(format!("{}@{}", user.username, email_domain)),
            mobile_phone: user.mobile_phone_number.clone(),
            active: user.status == UserStatus::Active,
            last_modified: Some(user.sync.last_modified),
        }
    }

    pub fn to_scim(&self) -> Value {
        let mut resource = json!({
            "schemas": [SCIM_USER_SCHEMA],
            "userName": self.user_name,
            "name": {
                "givenName": self.given_name,
                "familyName": self.family_name,
            },
            "displayName": self.display_name,
            "active": self.active,
        });
        if let Some(email) = &self.email {
            resource["emails"] = json!([{ "value": email, "type": "work", "primary": true }]);
        }
        if let Some(phone) = &self.mobile_phone {
            resource["phoneNumbers"] = json!([{ "value": phone, "type": "mobile" }]);
        }
        if let Some(id) = &self.id {
            resource["id"] = json!(id);
        }
        resource
    }

    pub fn from_scim(resource: &Value) -> Result<Self, SyncError> {
        let text = |pointer: &str| {
            resource
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let first_of = |attribute: &str| {
            resource
                .get(attribute)
                .and_then(Value::as_array)
                .and_then(|values| values.first())
                .and_then(|value| value.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let user_name =
            text("/userName").ok_or_else(|| SyncError::invalid_response("user without userName"))?;

        Ok(Self {
            id: text("/id"),
            user_name,
            given_name: text("/name/givenName"),
            family_name: text("/name/familyName"),
            display_name: text("/displayName"),
            email: first_of("emails"),
            mobile_phone: first_of("phoneNumbers"),
            active: resource.get("active").and_then(Value::as_bool).unwrap_or(true),
            last_modified: text("/meta/lastModified")
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|stamp| stamp.with_timezone(&Utc)),
        })
    }
}

/// CRUD access to a remote user directory.
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    async fn find_user(&self, user_name: &str) -> Result<Option<DirectoryEntry>, SyncError>;

    async fn create_user(&self, entry: &DirectoryEntry) -> Result<DirectoryEntry, SyncError>;

    async fn update_user(&self, id: &str, entry: &DirectoryEntry) -> Result<DirectoryEntry, SyncError>;

    async fn list_users(&self) -> Result<Vec<DirectoryEntry>, SyncError>;
}

/// SCIM 2.0 client.
pub struct ScimDirectory {
    client: Client,
    base_url: String,
}

impl ScimDirectory {
    pub fn new(settings: &DirectorySettings, http: &HttpClientConfig) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(SCIM_CONTENT_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(SCIM_CONTENT_TYPE));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.bearer_token))
            .map_err(|_| SyncError::invalid_response("bearer token is not a valid header value"))?;
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(http.request_timeout)
            .user_agent(http.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| transport("build client", e))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn body(response: Response) -> Result<Value, SyncError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::invalid_response(e.to_string()))
    }

    fn resources(body: &Value) -> Result<Vec<DirectoryEntry>, SyncError> {
        body.get("Resources")
            .and_then(Value::as_array)
            .map(|resources| resources.iter().map(DirectoryEntry::from_scim).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn transport(operation: &str, error: reqwest::Error) -> SyncError {
    SyncError::Transport {
        message: format!("{}: {}", operation, error),
        source: Some(Box::new(error)),
    }
}

#[async_trait]
impl RemoteDirectory for ScimDirectory {
    async fn find_user(&self, user_name: &str) -> Result<Option<DirectoryEntry>, SyncError> {
        let filter = format!("userName eq \"{}\"", user_name);
        let response = self
            .client
            .get(self.url("Users"))
            .query(&[("filter", filter.as_str())])
            .send()
            .await
            .map_err(|e| transport("find user", e))?;
        let body = Self::body(response).await?;
        Ok(Self::resources(&body)?.into_iter().next())
    }

    async fn create_user(&self, entry: &DirectoryEntry) -> Result<DirectoryEntry, SyncError> {
        let response = self
            .client
            .post(self.url("Users"))
            .json(&entry.to_scim())
            .send()
            .await
            .map_err(|e| transport("create user", e))?;
        DirectoryEntry::from_scim(&Self::body(response).await?)
    }

    async fn update_user(&self, id: &str, entry: &DirectoryEntry) -> Result<DirectoryEntry, SyncError> {
        let response = self
            .client
            .put(self.url(&format!("Users/{}", id)))
            .json(&entry.to_scim())
            .send()
            .await
            .map_err(|e| transport("update user", e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::Remote {
                status: 404,
                message: format!("user {} vanished from the directory", id),
            });
        }
        DirectoryEntry::from_scim(&Self::body(response).await?)
    }

    async fn list_users(&self) -> Result<Vec<DirectoryEntry>, SyncError> {
        let mut entries = Vec::new();
        let mut start_index = 1usize;
        loop {
            let response = self
                .client
                .get(self.url("Users"))
                .query(&[
                    ("startIndex", start_index.to_string()),
                    ("count", PAGE_SIZE.to_string()),
                ])
                .send()
                .await
                .map_err(|e| transport("list users", e))?;
            let body = Self::body(response).await?;
            let page = Self::resources(&body)?;
            let total = body
                .get("totalResults")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;

            let fetched = page.len();
            entries.extend(page);
            trace!("Fetched {} of {} directory users", entries.len(), total);
            if fetched == 0 || entries.len() >= total {
                break;
            }
            start_index += fetched;
        }
        Ok(entries)
    }
}

/// Build a new local user from a directory entry.
pub fn load(tenant_id: TenantId, entry: &DirectoryEntry) -> User {
    let mut user = User::new(tenant_id, entry.user_name.clone());
    apply(&mut user, entry);
    if let Some(stamp) = entry.last_modified {
        user.sync.mark_synced(stamp);
    } else {
        user.sync.mark_synced(Utc::now());
    }
    user
}

/// Copy remote attributes onto a local user unless the local copy is newer.
/// Returns whether anything was copied.
pub fn merge(local: &mut User, entry: &DirectoryEntry) -> bool {
    if let Some(remote_modified) = entry.last_modified {
        if local.sync.last_modified > remote_modified {
            trace!("Keeping local copy of {}: modified after remote", local.username);
            return false;
        }
    }
    apply(local, entry);
    true
}

/// Attributes the remote entry leaves out keep their local value.
fn apply(user: &mut User, entry: &DirectoryEntry) {
    let copy = |local: &mut Option<String>, remote: &Option<String>| {
        if remote.is_some() {
            local.clone_from(remote);
        }
    };
    copy(&mut user.first_name, &entry.given_name);
    copy(&mut user.last_name, &entry.family_name);
    copy(&mut user.display_name, &entry.display_name);
    copy(&mut user.mobile_phone_number, &entry.mobile_phone);
    if user.email.is_none() {
        user.email = entry.email.clone();
    }
}

/// [`DirectoryMirror`] for users of one tenant.
#[derive(Clone)]
pub struct UserMirror {
    directory: Arc<dyn RemoteDirectory>,
    email_domain: String,
}

impl UserMirror {
    pub fn new(directory: Arc<dyn RemoteDirectory>, email_domain: impl Into<String>) -> Self {
        Self {
            directory,
            email_domain: email_domain.into(),
        }
    }

    pub fn directory(&self) -> &Arc<dyn RemoteDirectory> {
        &self.directory
    }
}

#[async_trait]
impl DirectoryMirror<User> for UserMirror {
    async fn push(&self, user: &User) -> Result<(), SyncError> {
        let mut entry = DirectoryEntry::from_user(user, &self.email_domain);
        match self.directory.find_user(&user.username).await? {
            Some(existing) => {
                let id = existing
                    .id
                    .ok_or_else(|| SyncError::invalid_response("directory user without id"))?;
                entry.id = Some(id.clone());
                self.directory.update_user(&id, &entry).await?;
                debug!("Updated {} in the directory", user.username);
            }
            None => {
                self.directory.create_user(&entry).await?;
                debug!("Created {} in the directory", user.username);
            }
        }
        Ok(())
    }
}
