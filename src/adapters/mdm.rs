//! Mobile device management adapter for an AirWatch-style REST API.
//!
//! Requests authenticate with basic auth plus the `aw-tenant-code` header carrying
//! the service's API token. Assets map to user groups: the group comes from the
//! asset's `group_id` property, or defaults to `"{service group}-{asset slug}"`.

use crate::adapters::http::{self, ErrorResponse};
use crate::adapters::{
    AdapterError, AdapterFactory, AdapterResult, AssetBinding, RemoteDevice, ServiceAdapter,
    ServiceUser, UserActivity, activity_from_devices,
};
use crate::config::HttpClientConfig;
use crate::model::properties::{APP_IDS, GROUP_ID};
use crate::model::{ServiceKind, ServiceSettings, Tenant, TenantService, User};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

const TENANT_CODE_HEADER: &str = "aw-tenant-code";

pub struct MdmAdapterFactory {
    http: HttpClientConfig,
}

impl MdmAdapterFactory {
    pub fn new(http: HttpClientConfig) -> Self {
        Self { http }
    }
}

impl AdapterFactory for MdmAdapterFactory {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Mdm
    }

    fn create(&self, tenant: &Tenant, service: &TenantService) -> AdapterResult<Arc<dyn ServiceAdapter>> {
        Ok(Arc::new(MdmAdapter::new(tenant, service, &self.http)?))
    }
}

pub struct MdmAdapter {
    client: Client,
    server_url: String,
    username: String,
    password: String,
    group_id: String,
    tenant_email_domain: String,
    http: HttpClientConfig,
}

impl MdmAdapter {
    pub fn new(tenant: &Tenant, service: &TenantService, http: &HttpClientConfig) -> AdapterResult<Self> {
        let ServiceSettings::Mdm {
            server_url,
            username,
            password,
            group_id,
        } = &service.settings
        else {
            return Err(AdapterError::invalid_configuration(format!(
                "MDM adapter cannot serve a {} service",
                service.kind()
            )));
        };

        let mut headers = HeaderMap::new();
        headers.insert(TENANT_CODE_HEADER, http::header_value(&service.api_token)?);

        Ok(Self {
            client: http::build_client(http, headers)?,
            server_url: server_url.trim_end_matches('/').to_string(),
            username: username.clone(),
            password: password.clone(),
            group_id: group_id.clone(),
            tenant_email_domain: tenant.email_domain.clone(),
            http: http.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/API/{}", self.server_url, path))
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Smart group an asset's members belong to.
    pub fn group_for(&self, binding: &AssetBinding) -> String {
        binding
            .properties
            .get_str(GROUP_ID)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", self.group_id, binding.asset.slug))
    }

    fn remote_id(value: &Value) -> Option<String> {
        match value.pointer("/Id/Value")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn parse_user(value: &Value) -> AdapterResult<ServiceUser> {
        let remote_id = Self::remote_id(value)
            .ok_or_else(|| AdapterError::invalid_response("enrollment user without id"))?;
        Ok(ServiceUser {
            remote_id,
            login: value
                .get("UserName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            active: value.get("Status").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    fn parse_device(value: &Value) -> Option<RemoteDevice> {
        let text = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(RemoteDevice {
            remote_id: Self::remote_id(value)?,
            model: text("Model"),
            serial_number: text("SerialNumber"),
            enrolled_user: text("UserName"),
            last_seen: text("LastSeen").as_deref().and_then(parse_timestamp),
        })
    }

    fn is_conflict(error: &ErrorResponse) -> bool {
        error.status == StatusCode::CONFLICT
            || error.text.to_ascii_lowercase().contains("already exists")
    }

    /// Application ids listed in the asset's `app_ids` property.
    pub fn app_ids(binding: &AssetBinding) -> Vec<String> {
        binding
            .properties
            .get(APP_IDS)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| match id {
                        Value::Number(n) => Some(n.to_string()),
                        Value::String(s) if !s.is_empty() => Some(s.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn devices(&self) -> AdapterResult<Vec<RemoteDevice>> {
        self.search_devices(None).await
    }

    async fn search_devices(&self, enrolled_user: Option<&str>) -> AdapterResult<Vec<RemoteDevice>> {
        let mut request = self.request(Method::GET, "mdm/devices/search");
        if let Some(username) = enrolled_user {
            request = request.query(&[("user", username)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| http::transport_error("search devices", e, &self.http))?;
        let body = http::json_body(http::check(response, "mdm/devices/search").await?).await?;

        Ok(body
            .get("Devices")
            .and_then(Value::as_array)
            .map(|devices| devices.iter().filter_map(Self::parse_device).collect())
            .unwrap_or_default())
    }

    async fn membership(
        &self,
        binding: &AssetBinding,
        service_user: &ServiceUser,
        action: &str,
    ) -> AdapterResult<()> {
        let resource = format!(
            "system/usergroups/{}/user/{}/{}",
            self.group_for(binding),
            service_user.remote_id,
            action
        );
        let response = self
            .request(Method::POST, &resource)
            .send()
            .await
            .map_err(|e| http::transport_error(action, e, &self.http))?;
        http::check(response, &resource).await?;
        Ok(())
    }

    async fn install(&self, app_id: &str, device: &RemoteDevice) -> AdapterResult<()> {
        let resource = format!("mam/apps/public/{}/install", app_id);
        let response = self
            .request(Method::POST, &resource)
            .json(&json!({ "DeviceId": device.remote_id }))
            .send()
            .await
            .map_err(|e| http::transport_error("install app", e, &self.http))?;
        http::check(response, &resource).await?;
        Ok(())
    }

    async fn lifecycle(&self, service_user: &ServiceUser, action: &str) -> AdapterResult<()> {
        let resource = format!("system/users/{}/{}", service_user.remote_id, action);
        let response = self
            .request(Method::POST, &resource)
            .send()
            .await
            .map_err(|e| http::transport_error(action, e, &self.http))?;
        http::check(response, &resource).await?;
        Ok(())
    }
}

/// Accepts RFC 3339 and the zone-less timestamps MDM servers report in UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl ServiceAdapter for MdmAdapter {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Mdm
    }

    fn login_for(&self, user: &User) -> String {
        user.username.clone()
    }

    async fn register(&self, user: &User) -> AdapterResult<ServiceUser> {
        let email = user
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@{}", user.username, self.tenant_email_domain));
        let payload = json!({
            "UserName": user.username,
            "FirstName": user.first_name,
            "LastName": user.last_name,
            "Email": email,
            "Status": false,
            "SecurityType": "Basic",
            "LocationGroupId": self.group_id,
        });

        let response = self
            .request(Method::POST, "system/users/adduser")
            .json(&payload)
            .send()
            .await
            .map_err(|e| http::transport_error("register", e, &self.http))?;

        if response.status().is_success() {
            debug!("Registered enrollment user {}", user.username);
            let body = http::json_body(response).await?;
            return match Self::parse_user(&body) {
                Ok(created) => Ok(created),
                Err(_) => self.get_service_user(user).await,
            };
        }

        let error = ErrorResponse::read(response).await;
        if Self::is_conflict(&error) {
            return self.get_service_user(user).await;
        }
        Err(error.into_error("system/users/adduser"))
    }

    async fn activate(&self, user: &User) -> AdapterResult<()> {
        let service_user = self.ensure_registered(user).await?;
        if service_user.active {
            return Err(AdapterError::already(format!("{} is already active", user.username)));
        }
        self.lifecycle(&service_user, "activate").await
    }

    async fn deactivate(&self, user: &User) -> AdapterResult<()> {
        let service_user = self.get_service_user(user).await?;
        if !service_user.active {
            return Err(AdapterError::already(format!("{} is already inactive", user.username)));
        }
        self.lifecycle(&service_user, "deactivate").await
    }

    async fn assign(&self, binding: &AssetBinding, user: &User) -> AdapterResult<()> {
        let service_user = self.ensure_registered(user).await?;
        self.membership(binding, &service_user, "addusertogroup").await
    }

    async fn unassign(&self, binding: &AssetBinding, user: &User) -> AdapterResult<()> {
        let service_user = self.get_service_user(user).await?;
        self.membership(binding, &service_user, "removeuserfromgroup").await
    }

    /// Every listed app goes to every device; one failed install does not stop the
    /// rest, and the first failure is returned once all were tried.
    async fn install_apps(&self, binding: &AssetBinding, user: &User) -> AdapterResult<usize> {
        let app_ids = Self::app_ids(binding);
        if app_ids.is_empty() {
            return Ok(0);
        }
        let devices = self.search_devices(Some(&user.username)).await?;

        let mut installed = 0;
        let mut first_failure = None;
        for device in &devices {
            for app_id in &app_ids {
                match self.install(app_id, device).await {
                    Ok(()) => installed += 1,
                    Err(e) => {
                        warn!("Installing app {} on device {} failed: {}", app_id, device.remote_id, e);
                        if first_failure.is_none() {
                            first_failure = Some(e);
                        }
                    }
                }
            }
        }
        debug!(
            "Installed {} app(s) on {} device(s) of {}",
            installed,
            devices.len(),
            user.username
        );
        match first_failure {
            Some(e) => Err(e),
            None => Ok(installed),
        }
    }

    async fn get_service_user(&self, user: &User) -> AdapterResult<ServiceUser> {
        let resource = "system/users/search";
        let response = self
            .request(Method::GET, resource)
            .query(&[("username", user.username.as_str())])
            .send()
            .await
            .map_err(|e| http::transport_error("search users", e, &self.http))?;
        let body = http::json_body(http::check(response, resource).await?).await?;

        body.get("Users")
            .and_then(Value::as_array)
            .and_then(|users| {
                users
                    .iter()
                    .find(|u| u.get("UserName").and_then(Value::as_str) == Some(user.username.as_str()))
            })
            .map(Self::parse_user)
            .unwrap_or_else(|| Err(AdapterError::not_found(format!("enrollment user {}", user.username))))
    }

    async fn get_available_devices(&self) -> AdapterResult<Vec<RemoteDevice>> {
        let mut devices = self.devices().await?;
        devices.retain(|device| device.enrolled_user.is_none());
        Ok(devices)
    }

    async fn list_activity(&self) -> AdapterResult<Vec<UserActivity>> {
        Ok(activity_from_devices(self.devices().await?))
    }
}
