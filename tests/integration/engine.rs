//! Reconciliation behavior of the provisioning engine.

use crate::common::{Failure, TestEnv, items};
use asset_provisioning::engine::{Change, ItemOutcome, ProvisionRequest, compute_delta};
use asset_provisioning::error::ProvisionError;
use asset_provisioning::model::{ItemRef, Tenant, User};
use asset_provisioning::store::Transaction;
use std::collections::BTreeSet;

#[tokio::test]
async fn test_first_reconcile_assigns_and_second_is_silent() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let desired = items([slack.item_ref()]);

    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &desired, &env.admin)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(&slack.item_ref()), Some(&ItemOutcome::Applied));
    assert_eq!(env.sso_remote.count("assign"), 1);
    assert!(env.sso_remote.is_member("jdoe", slack.id));
    assert_eq!(env.items(&user, &env.sso).await, desired);

    let history = env.history(&user).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_open());
    assert_eq!(history[0].item, slack.item_ref());

    env.sso_remote.reset_calls();
    let again = env
        .context
        .engine
        .reconcile(&user, &env.sso, &desired, &env.admin)
        .await
        .unwrap();

    assert!(again.is_noop());
    assert!(env.sso_remote.calls().is_empty());
    assert_eq!(env.history(&user).await.len(), 1);
}

#[tokio::test]
async fn test_removal_unassigns_and_closes_history() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;

    env.context
        .engine
        .reconcile(&user, &env.sso, &items([slack.item_ref()]), &env.admin)
        .await
        .unwrap();
    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &BTreeSet::new(), &env.admin)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(&slack.item_ref()), Some(&ItemOutcome::Applied));
    assert_eq!(env.sso_remote.count("unassign"), 1);
    assert!(!env.sso_remote.is_member("jdoe", slack.id));
    assert!(env.items(&user, &env.sso).await.is_empty());

    let history = env.history(&user).await;
    assert_eq!(history.len(), 1);
    let end = history[0].end.expect("history entry closed");
    assert!(end >= history[0].start);
}

#[tokio::test]
async fn test_failed_item_is_skipped_and_stays_in_delta() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let jira = env.software("Jira").await;
    env.sso_remote.fail_asset("assign", jira.id, Failure::Unavailable);

    let desired = items([slack.item_ref(), jira.item_ref()]);
    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &desired, &env.admin)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(&slack.item_ref()), Some(&ItemOutcome::Applied));
    assert!(matches!(
        report.outcome_of(&jira.item_ref()),
        Some(ItemOutcome::Failed { transient: true, .. })
    ));
    assert!(report.has_failures());

    let current = env.items(&user, &env.sso).await;
    assert_eq!(current, items([slack.item_ref()]));
    let history = env.history(&user).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].item, slack.item_ref());

    let delta = compute_delta(&current, &desired);
    assert!(delta.to_add.contains(&jira.item_ref()));
    assert!(delta.to_remove.is_empty());

    env.sso_remote.heal();
    env.context
        .engine
        .reconcile(&user, &env.sso, &desired, &env.admin)
        .await
        .unwrap();
    assert_eq!(env.items(&user, &env.sso).await, desired);
}

#[tokio::test]
async fn test_failed_removal_keeps_record_and_open_history() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    env.context
        .engine
        .reconcile(&user, &env.sso, &items([slack.item_ref()]), &env.admin)
        .await
        .unwrap();

    env.sso_remote.fail("unassign", Failure::Rejected);
    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &BTreeSet::new(), &env.admin)
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_of(&slack.item_ref()),
        Some(ItemOutcome::Failed { transient: false, .. })
    ));
    assert_eq!(env.items(&user, &env.sso).await, items([slack.item_ref()]));
    assert!(env.history(&user).await[0].is_open());
}

#[tokio::test]
async fn test_missing_remote_membership_counts_as_removed() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    env.context
        .engine
        .reconcile(&user, &env.sso, &items([slack.item_ref()]), &env.admin)
        .await
        .unwrap();
    env.sso_remote.drift("jdoe", slack.id);

    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &BTreeSet::new(), &env.admin)
        .await
        .unwrap();

    assert_eq!(
        report.outcome_of(&slack.item_ref()),
        Some(&ItemOutcome::AlreadyInState)
    );
    assert!(env.items(&user, &env.sso).await.is_empty());
}

#[tokio::test]
async fn test_platform_mismatch_is_filtered_without_remote_calls() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let salesforce = env.web_software("Salesforce").await;
    let phone = env.device("iPhone").await;

    let mdm_report = env
        .context
        .engine
        .reconcile(&user, &env.mdm, &items([salesforce.item_ref()]), &env.admin)
        .await
        .unwrap();
    let sso_report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &items([phone.item_ref()]), &env.admin)
        .await
        .unwrap();

    assert_eq!(
        mdm_report.outcome_of(&salesforce.item_ref()),
        Some(&ItemOutcome::Filtered)
    );
    assert_eq!(sso_report.outcome_of(&phone.item_ref()), Some(&ItemOutcome::Filtered));
    assert!(!mdm_report.has_failures());
    assert!(env.mdm_remote.calls().is_empty());
    assert!(env.sso_remote.calls().is_empty());
    assert!(env.records(&user).await.is_empty());
}

#[tokio::test]
async fn test_platform_of_another_service_is_filtered() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;

    let report = env
        .context
        .engine
        .reconcile(&user, &env.mdm, &items([ItemRef::Platform(env.sso.id)]), &env.admin)
        .await
        .unwrap();

    assert_eq!(
        report.outcome_of(&ItemRef::Platform(env.sso.id)),
        Some(&ItemOutcome::Filtered)
    );
    assert_eq!(env.mdm_remote.count("activate"), 0);
}

#[tokio::test]
async fn test_platform_activation_follows_asset_assignment() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let jira = env.software("Jira").await;

    let desired = items([ItemRef::Platform(env.sso.id), slack.item_ref(), jira.item_ref()]);
    env.context
        .engine
        .reconcile(&user, &env.sso, &desired, &env.admin)
        .await
        .unwrap();

    let operations: Vec<String> = env
        .sso_remote
        .calls()
        .into_iter()
        .map(|call| call.operation)
        .collect();
    assert_eq!(operations, vec!["assign", "assign", "activate"]);
    assert!(env.sso_remote.is_active("jdoe"));
}

#[tokio::test]
async fn test_already_active_platform_is_recorded() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let platform = ItemRef::Platform(env.sso.id);

    env.context
        .engine
        .reconcile(&user, &env.sso, &items([platform]), &env.admin)
        .await
        .unwrap();
    // Lose the local record while the remote account stays active.
    let record = env.records(&user).await.remove(0);
    let mut tx = Transaction::new();
    tx.delete(&record);
    env.context.repository.commit(tx).await.unwrap();

    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &items([platform]), &env.admin)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(&platform), Some(&ItemOutcome::AlreadyInState));
    assert_eq!(env.items(&user, &env.sso).await, items([platform]));
    assert_eq!(env.history(&user).await.len(), 1);
}

#[tokio::test]
async fn test_adapter_timeout_is_transient_failure() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let phone = env.device("iPhone").await;
    env.mdm_remote.fail("assign", Failure::Hang);

    let report = env
        .context
        .engine
        .reconcile(&user, &env.mdm, &items([phone.item_ref()]), &env.admin)
        .await
        .unwrap();

    match report.outcome_of(&phone.item_ref()) {
        Some(ItemOutcome::Failed { error, transient }) => {
            assert!(*transient);
            assert!(error.contains("timed out"), "unexpected error: {}", error);
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    assert!(env.records(&user).await.is_empty());
}

#[tokio::test]
async fn test_same_software_on_two_services_is_tracked_separately() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let desired = items([slack.item_ref()]);

    env.context
        .engine
        .reconcile(&user, &env.sso, &desired, &env.admin)
        .await
        .unwrap();
    env.context
        .engine
        .reconcile(&user, &env.mdm, &desired, &env.admin)
        .await
        .unwrap();

    assert_eq!(env.records(&user).await.len(), 2);
    assert_eq!(env.history(&user).await.len(), 2);

    env.context
        .engine
        .reconcile(&user, &env.mdm, &BTreeSet::new(), &env.admin)
        .await
        .unwrap();
    assert_eq!(env.items(&user, &env.sso).await, desired);
    assert!(env.items(&user, &env.mdm).await.is_empty());
}

#[tokio::test]
async fn test_asset_removed_from_catalog_drops_record_locally() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    env.context
        .engine
        .reconcile(&user, &env.sso, &items([slack.item_ref()]), &env.admin)
        .await
        .unwrap();

    let mut tx = Transaction::new();
    tx.delete(&slack);
    env.context.repository.commit(tx).await.unwrap();
    env.sso_remote.reset_calls();

    let report = env
        .context
        .engine
        .reconcile(&user, &env.sso, &BTreeSet::new(), &env.admin)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(&slack.item_ref()), Some(&ItemOutcome::Applied));
    assert_eq!(env.sso_remote.count("unassign"), 0);
    assert!(env.records(&user).await.is_empty());
}

#[tokio::test]
async fn test_cross_tenant_reconcile_is_rejected() {
    let env = TestEnv::new().await;
    let other = env
        .context
        .directory
        .create_tenant(Tenant::new("Globex", env.admin.clone()))
        .await
        .unwrap();
    let stranger = User::new(other.id, "intruder");

    let result = env
        .context
        .engine
        .reconcile(&stranger, &env.sso, &BTreeSet::new(), &env.admin)
        .await;

    assert!(matches!(result, Err(ProvisionError::TenantMismatch { .. })));
}

#[tokio::test]
async fn test_provision_user_assigns_assets_before_platforms() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let phone = env.device("iPhone").await;
    let plan = env.data_plan("Unlimited").await;

    let request = ProvisionRequest::default()
        .with_software(slack.id)
        .with_device(phone.id)
        .with_data_plan(plan.id)
        .with_platform(env.sso.id);
    let reports = env
        .context
        .engine
        .provision_user(&user, &request, &env.admin)
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| !report.has_failures()));
    assert_eq!(
        env.items(&user, &env.sso).await,
        items([slack.item_ref(), ItemRef::Platform(env.sso.id)])
    );
    assert_eq!(
        env.items(&user, &env.mdm).await,
        items([slack.item_ref(), phone.item_ref(), plan.item_ref()])
    );

    let sso_operations: Vec<String> = env
        .sso_remote
        .calls()
        .into_iter()
        .map(|call| call.operation)
        .collect();
    assert_eq!(sso_operations, vec!["assign", "activate"]);
}

#[tokio::test]
async fn test_provision_user_keeps_existing_platform_access() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let platform = ItemRef::Platform(env.sso.id);

    env.context
        .engine
        .reconcile(&user, &env.sso, &items([platform]), &env.admin)
        .await
        .unwrap();

    let request = ProvisionRequest::default()
        .with_software(slack.id)
        .with_platform(env.sso.id);
    env.context
        .engine
        .provision_user(&user, &request, &env.admin)
        .await
        .unwrap();

    assert_eq!(env.sso_remote.count("deactivate"), 0);
    assert_eq!(
        env.items(&user, &env.sso).await,
        items([slack.item_ref(), platform])
    );
}

#[tokio::test]
async fn test_deprovision_user_fully_strips_and_deactivates() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let phone = env.device("iPhone").await;

    env.context
        .engine
        .reconcile(
            &user,
            &env.sso,
            &items([slack.item_ref(), ItemRef::Platform(env.sso.id)]),
            &env.admin,
        )
        .await
        .unwrap();
    env.context
        .engine
        .reconcile(&user, &env.mdm, &items([phone.item_ref()]), &env.admin)
        .await
        .unwrap();

    let reports = env
        .context
        .engine
        .deprovision_user_fully(&user, &env.admin)
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| !report.has_failures()));
    assert!(env.records(&user).await.is_empty());
    assert!(!env.sso_remote.is_active("jdoe"));
    assert!(env.sso_remote.members_of("jdoe").is_empty());
    assert!(env.mdm_remote.members_of("jdoe").is_empty());
    assert!(env.history(&user).await.iter().all(|entry| !entry.is_open()));

    let mdm_report = reports
        .iter()
        .find(|report| report.service_id == env.mdm.id)
        .unwrap();
    assert_eq!(
        mdm_report.outcome_of(&ItemRef::Platform(env.mdm.id)),
        Some(&ItemOutcome::AlreadyInState)
    );

    // Repeatable once everything is gone.
    let again = env
        .context
        .engine
        .deprovision_user_fully(&user, &env.admin)
        .await
        .unwrap();
    assert!(again.iter().all(|report| !report.has_failures()));
}

#[tokio::test]
async fn test_deprovision_continues_past_failures() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let phone = env.device("iPhone").await;

    env.context
        .engine
        .reconcile(&user, &env.sso, &items([slack.item_ref()]), &env.admin)
        .await
        .unwrap();
    env.context
        .engine
        .reconcile(&user, &env.mdm, &items([phone.item_ref()]), &env.admin)
        .await
        .unwrap();
    env.sso_remote.fail("unassign", Failure::Unavailable);

    let reports = env
        .context
        .engine
        .deprovision_user_fully(&user, &env.admin)
        .await
        .unwrap();

    let failed: Vec<_> = reports.iter().flat_map(|report| report.failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].item, slack.item_ref());
    assert_eq!(env.items(&user, &env.sso).await, items([slack.item_ref()]));
    assert!(env.items(&user, &env.mdm).await.is_empty());

    env.sso_remote.heal();
    env.context
        .engine
        .deprovision_user_fully(&user, &env.admin)
        .await
        .unwrap();
    assert!(env.records(&user).await.is_empty());
}

#[tokio::test]
async fn test_resync_repairs_remote_drift() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let phone = env.device("iPhone").await;
    let plan = env.data_plan("Unlimited").await;

    env.context
        .engine
        .reconcile(
            &user,
            &env.mdm,
            &items([phone.item_ref(), plan.item_ref()]),
            &env.admin,
        )
        .await
        .unwrap();
    env.mdm_remote.drift("jdoe", phone.id);

    let report = env
        .context
        .engine
        .resync_user(&user, &env.mdm, &env.admin)
        .await
        .unwrap();

    assert_eq!(report.items.len(), 2);
    assert!(report.items.iter().all(|item| item.change == Change::Resync));
    assert!(env.mdm_remote.is_member("jdoe", phone.id));
    assert_eq!(env.history(&user).await.len(), 2);
}

#[tokio::test]
async fn test_disjoint_pairs_reconcile_concurrently() {
    let env = TestEnv::new().await;
    let slack = env.software("Slack").await;
    let phone = env.device("iPhone").await;
    let mut users = Vec::new();
    for i in 0..8 {
        users.push(env.user(&format!("user{}", i)).await);
    }

    let sso_desired = items([slack.item_ref(), ItemRef::Platform(env.sso.id)]);
    let mdm_desired = items([slack.item_ref(), phone.item_ref()]);
    let runs = users.iter().flat_map(|user| {
        [
            env.context
                .engine
                .reconcile(user, &env.sso, &sso_desired, &env.admin),
            env.context
                .engine
                .reconcile(user, &env.mdm, &mdm_desired, &env.admin),
        ]
    });
    let reports = futures::future::join_all(runs).await;

    assert!(reports.into_iter().all(|report| !report.unwrap().has_failures()));
    for user in &users {
        assert_eq!(env.items(user, &env.sso).await, sso_desired);
        assert_eq!(env.items(user, &env.mdm).await, mdm_desired);
        let open = env
            .history(user)
            .await
            .into_iter()
            .filter(|entry| entry.is_open())
            .count();
        assert_eq!(open, 4);
    }
}

#[tokio::test]
async fn test_assignment_registers_user_unknown_to_service() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let phone = env.device("iPhone").await;
    assert!(!env.mdm_remote.is_registered("jdoe"));

    let report = env
        .context
        .engine
        .reconcile(&user, &env.mdm, &items([phone.item_ref()]), &env.admin)
        .await
        .unwrap();

    assert_eq!(report.outcome_of(&phone.item_ref()), Some(&ItemOutcome::Applied));
    assert_eq!(env.mdm_remote.count("register"), 1);
    assert!(env.mdm_remote.is_registered("jdoe"));
    assert!(env.mdm_remote.is_member("jdoe", phone.id));
    assert!(!env.mdm_remote.is_active("jdoe"));
    assert_eq!(env.items(&user, &env.mdm).await, items([phone.item_ref()]));
}

#[tokio::test]
async fn test_deprovision_removes_assets_everywhere_before_deactivating() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let slack = env.software("Slack").await;
    let phone = env.device("iPhone").await;

    env.context
        .engine
        .reconcile(
            &user,
            &env.sso,
            &items([slack.item_ref(), ItemRef::Platform(env.sso.id)]),
            &env.admin,
        )
        .await
        .unwrap();
    env.context
        .engine
        .reconcile(
            &user,
            &env.mdm,
            &items([phone.item_ref(), ItemRef::Platform(env.mdm.id)]),
            &env.admin,
        )
        .await
        .unwrap();

    let journal_start = env.sso_remote.journal().len();
    env.context
        .engine
        .deprovision_user_fully(&user, &env.admin)
        .await
        .unwrap();

    let operations: Vec<String> = env.sso_remote.journal()[journal_start..]
        .iter()
        .map(|call| call.operation.clone())
        .filter(|operation| operation == "unassign" || operation == "deactivate")
        .collect();
    assert_eq!(operations, ["unassign", "unassign", "deactivate", "deactivate"]);
    assert!(env.records(&user).await.is_empty());
}

#[tokio::test]
async fn test_resync_pushes_apps_and_reports_failed_installs() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let phone = env.device("iPhone").await;
    let plan = env.data_plan("Unlimited").await;

    env.context
        .engine
        .reconcile(
            &user,
            &env.mdm,
            &items([phone.item_ref(), plan.item_ref()]),
            &env.admin,
        )
        .await
        .unwrap();
    assert_eq!(env.mdm_remote.count("install_apps"), 0);
    env.mdm_remote.drift("jdoe", phone.id);
    env.mdm_remote
        .fail_asset("install_apps", phone.id, Failure::Unavailable);

    let report = env
        .context
        .engine
        .resync_user(&user, &env.mdm, &env.admin)
        .await
        .unwrap();

    assert_eq!(env.mdm_remote.count("install_apps"), 2);
    assert!(env.mdm_remote.is_member("jdoe", phone.id));
    assert!(matches!(
        report.outcome_of(&phone.item_ref()),
        Some(ItemOutcome::Failed { transient: true, .. })
    ));
    assert!(!matches!(
        report.outcome_of(&plan.item_ref()),
        Some(ItemOutcome::Failed { .. })
    ));
    assert_eq!(env.items(&user, &env.mdm).await, items([phone.item_ref(), plan.item_ref()]));
}

#[tokio::test]
async fn test_resync_skips_installs_when_reassignment_fails() {
    let env = TestEnv::new().await;
    let user = env.user("jdoe").await;
    let phone = env.device("iPhone").await;

    env.context
        .engine
        .reconcile(&user, &env.mdm, &items([phone.item_ref()]), &env.admin)
        .await
        .unwrap();
    env.mdm_remote.fail("assign", Failure::Rejected);

    let report = env
        .context
        .engine
        .resync_user(&user, &env.mdm, &env.admin)
        .await
        .unwrap();

    assert!(report.has_failures());
    assert_eq!(env.mdm_remote.count("install_apps"), 0);
}
