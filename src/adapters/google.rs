//! ChromeOS device inventory of a Google Workspace customer (Admin SDK directory API).
//!
//! Devices are listed page by page following `nextPageToken`. The `annotatedUser` and
//! `lastSync` fields feed device availability and last-seen reports.

use crate::adapters::http;
use crate::adapters::{AdapterError, AdapterResult, RemoteDevice};
use crate::config::HttpClientConfig;
use crate::model::DeviceInventorySettings;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::Deserialize;

const PAGE_SIZE: usize = 100;

/// One page of `chromeosdevices.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevicePage {
    #[serde(default)]
    chromeosdevices: Vec<ChromeOsDevice>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChromeOsDevice {
    device_id: String,
    model: Option<String>,
    serial_number: Option<String>,
    annotated_user: Option<String>,
    last_sync: Option<DateTime<Utc>>,
}

impl From<ChromeOsDevice> for RemoteDevice {
    fn from(device: ChromeOsDevice) -> Self {
        RemoteDevice {
            remote_id: device.device_id,
            model: device.model,
            serial_number: device.serial_number,
            enrolled_user: device.annotated_user.filter(|user| !user.is_empty()),
            last_seen: device.last_sync,
        }
    }
}

/// Read-only client for the ChromeOS devices of one customer.
pub struct DeviceInventory {
    client: Client,
    devices_url: String,
    http: HttpClientConfig,
}

impl DeviceInventory {
    /// `access_token` is an OAuth bearer token with the device read scope.
    pub fn new(
        settings: &DeviceInventorySettings,
        access_token: &str,
        http: &HttpClientConfig,
    ) -> AdapterResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            http::header_value(&format!("Bearer {}", access_token))?,
        );
        Ok(Self {
            client: http::build_client(http, headers)?,
            devices_url: format!(
                "{}/admin/directory/v1/customer/{}/devices/chromeos",
                settings.api_base().trim_end_matches('/'),
                settings.customer_id
            ),
            http: http.clone(),
        })
    }

    /// Every device of the customer, across all pages.
    pub async fn devices(&self) -> AdapterResult<Vec<RemoteDevice>> {
        let mut devices = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&self.devices_url)
                .query(&[("maxResults", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = request
                .send()
                .await
                .map_err(|e| http::transport_error("list chromeos devices", e, &self.http))?;
            let response = http::check(response, "devices/chromeos").await?;
            let page: DevicePage = serde_json::from_value(http::json_body(response).await?)
                .map_err(|e| AdapterError::invalid_response(e.to_string()))?;

            trace!("Fetched {} chromeos devices", page.chromeosdevices.len());
            devices.extend(page.chromeosdevices.into_iter().map(RemoteDevice::from));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} chromeos devices", devices.len());
        Ok(devices)
    }
}
