//! Wire behavior of the HTTP-backed adapters and the SCIM directory client.

use asset_provisioning::adapters::{
    ActivationNotifier, AdapterError, AdapterFactory, AssetBinding, FailureClass,
    GenericAdapterFactory, MdmAdapterFactory, ServiceAdapter, SsoAdapterFactory,
};
use asset_provisioning::audit::Editor;
use asset_provisioning::config::{HttpClientConfig, ProvisioningConfig};
use asset_provisioning::context::ProvisioningContext;
use asset_provisioning::model::properties::{APP_IDS, APPLICATION_ID, GROUP_ID, PROFILE};
use asset_provisioning::model::{
    Asset, DeviceInventorySettings, DirectorySettings, ServiceAssetProperties, ServiceSettings,
    SupportedPlatforms, Tenant, TenantService, User,
};
use asset_provisioning::storage::InMemoryStorage;
use asset_provisioning::AdapterRegistry;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{
    body_json, body_partial_json, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tenant() -> Tenant {
    Tenant::new("Acme", Editor::new("admin@acme.test")).with_email_domain("acme.test")
}

fn user(tenant: &Tenant) -> User {
    User::new(tenant.id, "jdoe").with_name("Jane", "Doe")
}

fn binding(tenant: &Tenant, service: &TenantService, asset: Asset) -> AssetBinding {
    AssetBinding {
        properties: ServiceAssetProperties::new(tenant.id, service.id, asset.id),
        asset,
    }
}

#[derive(Default)]
struct CapturingNotifier {
    urls: Mutex<Vec<Option<String>>>,
}

impl ActivationNotifier for CapturingNotifier {
    fn notify(&self, _user: &User, _service: &TenantService, activation_url: Option<&str>) {
        self.urls
            .lock()
            .unwrap()
            .push(activation_url.map(str::to_string));
    }
}

struct SsoFixture {
    server: MockServer,
    tenant: Tenant,
    service: TenantService,
    adapter: Arc<dyn ServiceAdapter>,
    notifier: Arc<CapturingNotifier>,
}

async fn sso() -> SsoFixture {
    let server = MockServer::start().await;
    let tenant = tenant();
    let service = TenantService::new(
        tenant.id,
        "sso-token",
        ServiceSettings::DirectorySso {
            domain: "acme".to_string(),
            base_url: Some(server.uri()),
        },
    );
    let notifier = Arc::new(CapturingNotifier::default());
    let adapter = SsoAdapterFactory::new(HttpClientConfig::default())
        .with_notifier(notifier.clone())
        .create(&tenant, &service)
        .unwrap();
    SsoFixture {
        server,
        tenant,
        service,
        adapter,
        notifier,
    }
}

async fn mount_sso_user(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v1/users/jdoe@acme.test"))
        .and(header("authorization", "SSWS sso-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "00u1",
            "status": status,
            "profile": { "login": "jdoe@acme.test" }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sso_register_fetches_existing_profile() {
    let fx = sso().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users"))
        .and(query_param("activate", "false"))
        .and(body_partial_json(json!({ "profile": { "login": "jdoe@acme.test" } })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": "E0000001",
            "errorSummary": "Api validation failed: login"
        })))
        .expect(1)
        .mount(&fx.server)
        .await;
    mount_sso_user(&fx.server, "STAGED").await;

    let remote = fx.adapter.register(&user(&fx.tenant)).await.unwrap();

    assert_eq!(remote.remote_id, "00u1");
    assert_eq!(remote.login, "jdoe@acme.test");
    assert!(!remote.active);
}

#[tokio::test]
async fn test_sso_activate_reports_activation_link() {
    let fx = sso().await;
    mount_sso_user(&fx.server, "STAGED").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users/00u1/lifecycle/activate"))
        .and(query_param("sendEmail", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activationUrl": "https://acme.okta.com/welcome/abc",
            "activationToken": "abc"
        })))
        .expect(1)
        .mount(&fx.server)
        .await;

    fx.adapter.activate(&user(&fx.tenant)).await.unwrap();

    let urls = fx.notifier.urls.lock().unwrap().clone();
    assert_eq!(urls, vec![Some("https://acme.okta.com/welcome/abc".to_string())]);
}

#[tokio::test]
async fn test_sso_activate_twice_is_already_in_state() {
    let fx = sso().await;
    mount_sso_user(&fx.server, "ACTIVE").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users/00u1/lifecycle/activate"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errorCode": "E0000016",
            "errorSummary": "Activation failed because the user is already active"
        })))
        .mount(&fx.server)
        .await;

    let error = fx.adapter.activate(&user(&fx.tenant)).await.unwrap_err();

    assert_eq!(error.class(), FailureClass::AlreadyInDesiredState);
    assert!(fx.notifier.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sso_assign_posts_app_membership_with_profile() {
    let fx = sso().await;
    mount_sso_user(&fx.server, "ACTIVE").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/apps/0oa1/users"))
        .and(body_json(json!({ "id": "00u1", "profile": { "role": "editor" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "00u1" })))
        .expect(1)
        .mount(&fx.server)
        .await;

    let asset = Asset::software(fx.tenant.id, "Slack", SupportedPlatforms::WEB);
    let mut binding = binding(&fx.tenant, &fx.service, asset);
    binding.properties.set(APPLICATION_ID, "0oa1");
    binding.properties.set(PROFILE, json!({ "role": "editor" }));

    fx.adapter.assign(&binding, &user(&fx.tenant)).await.unwrap();
}

#[tokio::test]
async fn test_sso_assign_registers_unknown_user_first() {
    let fx = sso().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/jdoe@acme.test"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errorCode": "E0000007" })))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/users"))
        .and(query_param("activate", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "00u9",
            "status": "STAGED",
            "profile": { "login": "jdoe@acme.test" }
        })))
        .expect(1)
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/apps/0oa1/users"))
        .and(body_json(json!({ "id": "00u9" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "00u9" })))
        .expect(1)
        .mount(&fx.server)
        .await;

    let asset = Asset::software(fx.tenant.id, "Slack", SupportedPlatforms::WEB);
    let mut binding = binding(&fx.tenant, &fx.service, asset);
    binding.properties.set(APPLICATION_ID, "0oa1");

    fx.adapter.assign(&binding, &user(&fx.tenant)).await.unwrap();
}

#[tokio::test]
async fn test_sso_unassign_of_missing_membership_is_not_found() {
    let fx = sso().await;
    mount_sso_user(&fx.server, "ACTIVE").await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/apps/0oa1/users/00u1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errorCode": "E0000007" })))
        .mount(&fx.server)
        .await;

    let asset = Asset::software(fx.tenant.id, "Slack", SupportedPlatforms::WEB);
    let mut binding = binding(&fx.tenant, &fx.service, asset);
    binding.properties.set(APPLICATION_ID, "0oa1");

    let error = fx
        .adapter
        .unassign(&binding, &user(&fx.tenant))
        .await
        .unwrap_err();
    assert_eq!(error.class(), FailureClass::ResourceNotFound);
}

#[tokio::test]
async fn test_sso_assign_without_application_is_rejected_locally() {
    let fx = sso().await;
    let asset = Asset::software(fx.tenant.id, "Slack", SupportedPlatforms::WEB);
    let binding = binding(&fx.tenant, &fx.service, asset);

    let error = fx
        .adapter
        .assign(&binding, &user(&fx.tenant))
        .await
        .unwrap_err();

    assert!(matches!(error, AdapterError::MissingProperty { .. }));
    assert!(fx.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sso_activity_reads_last_login() {
    let fx = sso().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "00u1", "lastLogin": "2026-03-01T08:30:00.000Z", "profile": { "login": "jdoe@acme.test" } },
            { "id": "00u2", "lastLogin": null, "profile": { "login": "new@acme.test" } }
        ])))
        .mount(&fx.server)
        .await;

    let activity = fx.adapter.list_activity().await.unwrap();

    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].login, "jdoe@acme.test");
    assert_eq!(
        activity[0].last_seen,
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap()
    );
}

struct MdmFixture {
    server: MockServer,
    tenant: Tenant,
    service: TenantService,
    adapter: Arc<dyn ServiceAdapter>,
}

async fn mdm() -> MdmFixture {
    let server = MockServer::start().await;
    let tenant = tenant();
    let service = TenantService::new(
        tenant.id,
        "mdm-token",
        ServiceSettings::Mdm {
            server_url: server.uri(),
            username: "api".to_string(),
            password: "secret".to_string(),
            group_id: "570".to_string(),
        },
    );
    let adapter = MdmAdapterFactory::new(HttpClientConfig::default())
        .create(&tenant, &service)
        .unwrap();
    MdmFixture {
        server,
        tenant,
        service,
        adapter,
    }
}

async fn mount_mdm_user(server: &MockServer, active: bool) {
    Mock::given(method("GET"))
        .and(path("/API/system/users/search"))
        .and(query_param("username", "jdoe"))
        .and(header("aw-tenant-code", "mdm-token"))
        .and(header("authorization", "Basic YXBpOnNlY3JldA=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Users": [ { "Id": { "Value": 17 }, "UserName": "jdoe", "Status": active } ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_mdm_assign_uses_default_group() {
    let fx = mdm().await;
    mount_mdm_user(&fx.server, true).await;
    Mock::given(method("POST"))
        .and(path("/API/system/usergroups/570-iphone-6/user/17/addusertogroup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fx.server)
        .await;

    let device = Asset::device(fx.tenant.id, "iPhone 6");
    fx.adapter
        .assign(&binding(&fx.tenant, &fx.service, device), &user(&fx.tenant))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mdm_assign_creates_missing_enrollment_user() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/system/users/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Users": [] })))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/API/system/users/adduser"))
        .and(body_partial_json(json!({ "UserName": "jdoe", "Status": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": { "Value": 23 },
            "UserName": "jdoe",
            "Status": false
        })))
        .expect(1)
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/API/system/usergroups/570-iphone-6/user/23/addusertogroup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fx.server)
        .await;

    let device = Asset::device(fx.tenant.id, "iPhone 6");
    fx.adapter
        .assign(&binding(&fx.tenant, &fx.service, device), &user(&fx.tenant))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mdm_unassign_of_unknown_user_does_not_register() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/system/users/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Users": [] })))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/API/system/users/adduser"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fx.server)
        .await;

    let device = Asset::device(fx.tenant.id, "iPhone 6");
    let error = fx
        .adapter
        .unassign(&binding(&fx.tenant, &fx.service, device), &user(&fx.tenant))
        .await
        .unwrap_err();
    assert_eq!(error.class(), FailureClass::ResourceNotFound);
}

#[tokio::test]
async fn test_mdm_installs_every_app_on_every_user_device() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/mdm/devices/search"))
        .and(query_param("user", "jdoe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Devices": [
                { "Id": { "Value": 7 }, "UserName": "jdoe" },
                { "Id": { "Value": 8 }, "UserName": "jdoe" }
            ]
        })))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/API/mam/apps/public/12/install"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/API/mam/apps/public/13/install"))
        .and(body_json(json!({ "DeviceId": "8" })))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fx.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/API/mam/apps/public/13/install"))
        .and(body_json(json!({ "DeviceId": "7" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fx.server)
        .await;

    let phone = Asset::device(fx.tenant.id, "iPhone 6");
    let mut binding = binding(&fx.tenant, &fx.service, phone);
    binding.properties.set(APP_IDS, json!([12, "13"]));

    let error = fx
        .adapter
        .install_apps(&binding, &user(&fx.tenant))
        .await
        .unwrap_err();
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_mdm_install_without_app_ids_skips_device_lookup() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/mdm/devices/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Devices": [] })))
        .expect(0)
        .mount(&fx.server)
        .await;

    let phone = Asset::device(fx.tenant.id, "iPhone 6");
    let installed = fx
        .adapter
        .install_apps(&binding(&fx.tenant, &fx.service, phone), &user(&fx.tenant))
        .await
        .unwrap();
    assert_eq!(installed, 0);
}

#[tokio::test]
async fn test_mdm_unassign_uses_configured_group() {
    let fx = mdm().await;
    mount_mdm_user(&fx.server, true).await;
    Mock::given(method("POST"))
        .and(path("/API/system/usergroups/ios-fleet/user/17/removeuserfromgroup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fx.server)
        .await;

    let device = Asset::device(fx.tenant.id, "iPhone 6");
    let mut binding = binding(&fx.tenant, &fx.service, device);
    binding.properties.set(GROUP_ID, "ios-fleet");
    fx.adapter.unassign(&binding, &user(&fx.tenant)).await.unwrap();
}

#[tokio::test]
async fn test_mdm_lifecycle_is_idempotent() {
    let fx = mdm().await;
    mount_mdm_user(&fx.server, true).await;

    let error = fx.adapter.activate(&user(&fx.tenant)).await.unwrap_err();
    assert_eq!(error.class(), FailureClass::AlreadyInDesiredState);

    Mock::given(method("POST"))
        .and(path("/API/system/users/17/deactivate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fx.server)
        .await;
    fx.adapter.deactivate(&user(&fx.tenant)).await.unwrap();
}

#[tokio::test]
async fn test_mdm_register_conflict_returns_existing_user() {
    let fx = mdm().await;
    Mock::given(method("POST"))
        .and(path("/API/system/users/adduser"))
        .and(body_partial_json(json!({ "UserName": "jdoe", "LocationGroupId": "570" })))
        .respond_with(ResponseTemplate::new(409).set_body_string("User already exists"))
        .expect(1)
        .mount(&fx.server)
        .await;
    mount_mdm_user(&fx.server, false).await;

    let remote = fx.adapter.register(&user(&fx.tenant)).await.unwrap();

    assert_eq!(remote.remote_id, "17");
    assert!(!remote.active);
}

#[tokio::test]
async fn test_mdm_unknown_user_is_not_found() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/system/users/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Users": [] })))
        .mount(&fx.server)
        .await;

    let error = fx
        .adapter
        .get_service_user(&user(&fx.tenant))
        .await
        .unwrap_err();
    assert_eq!(error.class(), FailureClass::ResourceNotFound);
}

#[tokio::test]
async fn test_mdm_server_error_is_transient() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/system/users/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fx.server)
        .await;

    let error = fx.adapter.deactivate(&user(&fx.tenant)).await.unwrap_err();
    assert!(error.is_transient());
    assert_eq!(error.class(), FailureClass::TransientOrUnknown);
}

#[tokio::test]
async fn test_mdm_devices_and_activity() {
    let fx = mdm().await;
    Mock::given(method("GET"))
        .and(path("/API/mdm/devices/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Devices": [
                { "Id": { "Value": 1 }, "Model": "iPhone 6", "SerialNumber": "F17A", "UserName": "" },
                { "Id": { "Value": 2 }, "Model": "iPad", "UserName": "jdoe", "LastSeen": "2026-01-05T10:00:00" },
                { "Id": { "Value": 3 }, "Model": "iPhone 7", "UserName": "jdoe", "LastSeen": "2026-02-01T09:15:00.250" }
            ]
        })))
        .mount(&fx.server)
        .await;

    let available = fx.adapter.get_available_devices().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].remote_id, "1");
    assert_eq!(available[0].serial_number.as_deref(), Some("F17A"));

    let activity = fx.adapter.list_activity().await.unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].login, "jdoe");
    assert_eq!(
        activity[0].last_seen,
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 15, 0).unwrap() + chrono::Duration::milliseconds(250)
    );
}

#[tokio::test]
async fn test_generic_adapter_never_fails() {
    let tenant = tenant();
    let service = TenantService::new(
        tenant.id,
        "",
        ServiceSettings::Generic {
            name: "Google Apps".to_string(),
            device_inventory: None,
        },
    );
    let adapter = GenericAdapterFactory::new(HttpClientConfig::default())
        .create(&tenant, &service)
        .unwrap();
    let user = user(&tenant);
    let asset = Asset::software(tenant.id, "Docs", SupportedPlatforms::WEB);

    adapter.activate(&user).await.unwrap();
    adapter
        .assign(&binding(&tenant, &service, asset), &user)
        .await
        .unwrap();
    assert_eq!(adapter.login_for(&user), "jdoe@acme.test");
}

#[tokio::test]
async fn test_generic_device_inventory_follows_pages() {
    let server = MockServer::start().await;
    let tenant = tenant();
    let service = TenantService::new(
        tenant.id,
        "google-token",
        ServiceSettings::Generic {
            name: "Google Apps".to_string(),
            device_inventory: Some(DeviceInventorySettings {
                base_url: Some(server.uri()),
                ..Default::default()
            }),
        },
    );
    let devices = "/admin/directory/v1/customer/my_customer/devices/chromeos";
    Mock::given(method("GET"))
        .and(path(devices))
        .and(query_param_is_missing("pageToken"))
        .and(header("authorization", "Bearer google-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chromeosdevices": [
                { "deviceId": "a1", "annotatedUser": "jdoe@acme.test", "lastSync": "2026-01-10T08:00:00.000Z" },
                { "deviceId": "a2", "serialNumber": "5CD1", "model": "Chromebook 14" }
            ],
            "nextPageToken": "page-2"
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(devices))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chromeosdevices": [
                { "deviceId": "a3", "annotatedUser": "jdoe@acme.test", "lastSync": "2026-02-20T17:30:00.000Z" },
                { "deviceId": "a4", "annotatedUser": "asmith@acme.test", "lastSync": "2026-02-01T12:00:00.000Z" }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let adapter = GenericAdapterFactory::new(HttpClientConfig::default())
        .create(&tenant, &service)
        .unwrap();

    let activity = adapter.list_activity().await.unwrap();
    assert_eq!(activity.len(), 2);
    assert_eq!(activity[0].login, "asmith@acme.test");
    assert_eq!(activity[1].login, "jdoe@acme.test");
    assert_eq!(
        activity[1].last_seen,
        Utc.with_ymd_and_hms(2026, 2, 20, 17, 30, 0).unwrap()
    );

    let available = adapter.get_available_devices().await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].serial_number.as_deref(), Some("5CD1"));
}

async fn scim_context(server: &MockServer) -> (ProvisioningContext<InMemoryStorage>, Tenant, Editor) {
    let config = ProvisioningConfig::default();
    let context = ProvisioningContext::new(
        Arc::new(InMemoryStorage::new()),
        AdapterRegistry::standard(&config.http),
        config,
    );
    let admin = Editor::new("admin@acme.test");
    let tenant = context
        .directory
        .create_tenant(
            Tenant::new("Acme", admin.clone())
                .with_email_domain("acme.test")
                .with_directory(DirectorySettings {
                    base_url: format!("{}/scim/v2", server.uri()),
                    bearer_token: "scim-token".to_string(),
                    organization_unit: None,
                }),
        )
        .await
        .unwrap();
    (context, tenant, admin)
}

#[tokio::test]
async fn test_new_user_is_created_in_scim_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scim/v2/Users"))
        .and(query_param("filter", "userName eq \"jdoe\""))
        .and(header("authorization", "Bearer scim-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalResults": 0,
            "Resources": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/scim/v2/Users"))
        .and(body_partial_json(json!({ "userName": "jdoe", "active": false })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "2819c223",
            "userName": "jdoe",
            "meta": { "lastModified": "2026-03-01T08:30:00Z" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (context, tenant, admin) = scim_context(&server).await;
    let user = context
        .directory
        .create_user(Some(&admin), User::new(tenant.id, "jdoe"))
        .await
        .unwrap();

    assert!(!user.sync.needs_push());
}

#[tokio::test]
async fn test_scim_directory_load_follows_pages() {
    let server = MockServer::start().await;
    let resource = |name: &str| {
        json!({
            "id": format!("id-{}", name),
            "userName": name,
            "name": { "givenName": name, "familyName": "Imported" },
            "emails": [ { "value": format!("{}@acme.test", name), "primary": true } ],
            "active": true
        })
    };
    Mock::given(method("GET"))
        .and(path("/scim/v2/Users"))
        .and(query_param("startIndex", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalResults": 3,
            "Resources": [resource("alice"), resource("bob")]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scim/v2/Users"))
        .and(query_param("startIndex", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalResults": 3,
            "Resources": [resource("carol")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (context, tenant, admin) = scim_context(&server).await;
    let summary = context.directory.load_users(tenant.id, &admin).await.unwrap();

    assert_eq!(summary.created, 3);
    let carol = context
        .directory
        .find_user(tenant.id, "carol")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol.last_name.as_deref(), Some("Imported"));
    assert_eq!(carol.email.as_deref(), Some("carol@acme.test"));
}
