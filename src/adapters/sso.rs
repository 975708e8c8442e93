//! Directory/SSO adapter speaking an Okta-style REST API (`/api/v1`, `SSWS` tokens).
//!
//! The SSO service is the tenant's directory controller: users are registered here
//! before any other platform learns about them. Applications are assigned through
//! app membership, using the asset's `application_id` property and optional
//! `profile` object.

use crate::adapters::http::{self, ErrorResponse};
use crate::adapters::{
    AdapterError, AdapterFactory, AdapterResult, AssetBinding, ServiceAdapter, ServiceUser,
    UserActivity,
};
use crate::config::HttpClientConfig;
use crate::model::properties::{APPLICATION_ID, PROFILE};
use crate::model::{ServiceKind, ServiceSettings, Tenant, TenantService, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::{Value, json};
use std::sync::Arc;

const ALREADY_EXISTS: &str = "E0000001";
const ALREADY_ACTIVATED: &str = "E0000016";

/// Receives the activation link of a freshly activated account.
pub trait ActivationNotifier: Send + Sync {
    fn notify(&self, user: &User, service: &TenantService, activation_url: Option<&str>);
}

/// Default notifier: writes the activation link to the log.
#[derive(Debug, Default)]
pub struct LogActivationNotifier;

impl ActivationNotifier for LogActivationNotifier {
    fn notify(&self, user: &User, service: &TenantService, activation_url: Option<&str>) {
        info!(
            "Activated {} on {}; activation url: {}",
            user.username,
            service.name(),
            activation_url.unwrap_or("<none>")
        );
    }
}

pub struct SsoAdapterFactory {
    http: HttpClientConfig,
    notifier: Arc<dyn ActivationNotifier>,
}

impl SsoAdapterFactory {
    pub fn new(http: HttpClientConfig) -> Self {
        Self {
            http,
            notifier: Arc::new(LogActivationNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ActivationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

impl AdapterFactory for SsoAdapterFactory {
    fn kind(&self) -> ServiceKind {
        ServiceKind::DirectorySso
    }

    fn create(&self, tenant: &Tenant, service: &TenantService) -> AdapterResult<Arc<dyn ServiceAdapter>> {
        Ok(Arc::new(SsoAdapter::new(
            tenant.clone(),
            service.clone(),
            &self.http,
            Arc::clone(&self.notifier),
        )?))
    }
}

pub struct SsoAdapter {
    client: Client,
    api_base: String,
    tenant: Tenant,
    service: TenantService,
    http: HttpClientConfig,
    notifier: Arc<dyn ActivationNotifier>,
}

impl SsoAdapter {
    pub fn new(
        tenant: Tenant,
        service: TenantService,
        http: &HttpClientConfig,
        notifier: Arc<dyn ActivationNotifier>,
    ) -> AdapterResult<Self> {
        let base = match &service.settings {
            ServiceSettings::DirectorySso { .. } => service.portal_url().unwrap_or_default(),
            other => {
                return Err(AdapterError::invalid_configuration(format!(
                    "SSO adapter cannot serve a {} service",
                    other.kind()
                )));
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            http::header_value(&format!("SSWS {}", service.api_token))?,
        );

        Ok(Self {
            client: http::build_client(http, headers)?,
            api_base: format!("{}/api/v1", base.trim_end_matches('/')),
            tenant,
            service,
            http: http.clone(),
            notifier,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn error_code(response: &ErrorResponse) -> Option<&str> {
        response.body.get("errorCode").and_then(Value::as_str)
    }

    fn parse_user(body: &Value) -> AdapterResult<ServiceUser> {
        let remote_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::invalid_response("user without id"))?;
        let login = body
            .pointer("/profile/login")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ServiceUser {
            remote_id: remote_id.to_string(),
            login: login.to_string(),
            active: body.get("status").and_then(Value::as_str) == Some("ACTIVE"),
        })
    }

    fn application_id(binding: &AssetBinding) -> AdapterResult<&str> {
        binding
            .properties
            .get_str(APPLICATION_ID)
            .ok_or_else(|| AdapterError::missing_property(&binding.asset.name, APPLICATION_ID))
    }

    async fn fetch_user(&self, login: &str) -> AdapterResult<ServiceUser> {
        let resource = format!("users/{}", login);
        let response = self
            .client
            .get(self.url(&resource))
            .send()
            .await
            .map_err(|e| http::transport_error("get user", e, &self.http))?;
        let body = http::json_body(http::check(response, &resource).await?).await?;
        Self::parse_user(&body)
    }
}

#[async_trait]
impl ServiceAdapter for SsoAdapter {
    fn kind(&self) -> ServiceKind {
        ServiceKind::DirectorySso
    }

    fn login_for(&self, user: &User) -> String {
        self.tenant.tenant_email(&user.username)
    }

    async fn register(&self, user: &User) -> AdapterResult<ServiceUser> {
        let login = self.login_for(user);
        let payload = json!({
            "profile": {
                "firstName": user.first_name,
                "lastName": user.last_name,
                "email": user.email,
                "login": login,
            }
        });

        let response = self
            .client
            .post(self.url("users"))
            .query(&[("activate", "false")])
            .json(&payload)
            .send()
            .await
            .map_err(|e| http::transport_error("register", e, &self.http))?;

        if response.status().is_success() {
            debug!("Registered {} on {}", login, self.service.name());
            return Self::parse_user(&http::json_body(response).await?);
        }

        let error = ErrorResponse::read(response).await;
        if Self::error_code(&error) == Some(ALREADY_EXISTS) {
            return self.fetch_user(&login).await;
        }
        Err(error.into_error("users"))
    }

    async fn activate(&self, user: &User) -> AdapterResult<()> {
        let service_user = self.ensure_registered(user).await?;

        let resource = format!("users/{}/lifecycle/activate", service_user.remote_id);
        let response = self
            .client
            .post(self.url(&resource))
            .query(&[("sendEmail", "false")])
            .send()
            .await
            .map_err(|e| http::transport_error("activate", e, &self.http))?;

        if !response.status().is_success() {
            let error = ErrorResponse::read(response).await;
            if Self::error_code(&error) == Some(ALREADY_ACTIVATED) {
                return Err(AdapterError::already(format!(
                    "{} is already active",
                    service_user.login
                )));
            }
            return Err(error.into_error(&resource));
        }

        let body = http::json_body(response).await?;
        self.notifier.notify(
            user,
            &self.service,
            body.get("activationUrl").and_then(Value::as_str),
        );
        Ok(())
    }

    async fn deactivate(&self, user: &User) -> AdapterResult<()> {
        let service_user = self.get_service_user(user).await?;
        let resource = format!("users/{}/lifecycle/deactivate", service_user.remote_id);
        let response = self
            .client
            .post(self.url(&resource))
            .send()
            .await
            .map_err(|e| http::transport_error("deactivate", e, &self.http))?;
        http::check(response, &resource).await?;
        Ok(())
    }

    async fn assign(&self, binding: &AssetBinding, user: &User) -> AdapterResult<()> {
        let application_id = Self::application_id(binding)?;
        let service_user = self.ensure_registered(user).await?;

        let mut payload = json!({ "id": service_user.remote_id });
        if let Some(profile) = binding.properties.get(PROFILE) {
            payload["profile"] = profile.clone();
        }

        let resource = format!("apps/{}/users", application_id);
        let response = self
            .client
            .post(self.url(&resource))
            .json(&payload)
            .send()
            .await
            .map_err(|e| http::transport_error("assign", e, &self.http))?;
        http::check(response, &resource).await?;
        Ok(())
    }

    async fn unassign(&self, binding: &AssetBinding, user: &User) -> AdapterResult<()> {
        let application_id = Self::application_id(binding)?;
        let service_user = self.get_service_user(user).await?;

        let resource = format!("apps/{}/users/{}", application_id, service_user.remote_id);
        let response = self
            .client
            .delete(self.url(&resource))
            .send()
            .await
            .map_err(|e| http::transport_error("unassign", e, &self.http))?;
        http::check(response, &resource).await?;
        Ok(())
    }

    async fn get_service_user(&self, user: &User) -> AdapterResult<ServiceUser> {
        self.fetch_user(&self.login_for(user)).await
    }

    async fn list_activity(&self) -> AdapterResult<Vec<UserActivity>> {
        let response = self
            .client
            .get(self.url("users"))
            .send()
            .await
            .map_err(|e| http::transport_error("list users", e, &self.http))?;
        let body = http::json_body(http::check(response, "users").await?).await?;

        let users = body
            .as_array()
            .ok_or_else(|| AdapterError::invalid_response("user list is not an array"))?;

        Ok(users
            .iter()
            .filter_map(|entry| {
                let login = entry.pointer("/profile/login")?.as_str()?;
                let last_login = entry.get("lastLogin")?.as_str()?;
                let last_seen = DateTime::parse_from_rfc3339(last_login).ok()?;
                Some(UserActivity {
                    login: login.to_string(),
                    last_seen: last_seen.with_timezone(&Utc),
                })
            })
            .collect())
    }
}
