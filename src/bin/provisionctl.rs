//! # provisionctl
//!
//! Operator commands for the provisioning engine. State is kept in a JSON snapshot
//! file that is loaded before and written back after every command.
//!
//! ## Usage
//!
//! ```bash
//! provisionctl --state state.json deprovision-user --username jdoe --tenant Acme --delete
//! provisionctl --state state.json load-users
//! provisionctl --state state.json last-seen --tenant Acme --skip-google
//! provisionctl --state state.json provision --tenant Acme --user jdoe --asset slack --service okta
//! provisionctl --config config.json --state state.json daemon --service airwatch --interval-secs 60
//! ```
//!
//! Changes are attributed to the tenant's primary contact. Set `RUST_LOG=debug` for
//! detailed output.

use asset_provisioning::adapters::AdapterRegistry;
use asset_provisioning::config::ProvisioningConfig;
use asset_provisioning::context::ProvisioningContext;
use asset_provisioning::daemon::PollingDaemon;
use asset_provisioning::engine::ReconcileReport;
use asset_provisioning::error::{ProvisionError, ProvisionResult};
use asset_provisioning::model::{ServiceKind, Tenant, User};
use asset_provisioning::storage::InMemoryStorage;
use clap::{Parser, Subcommand};
use log::{error, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "provisionctl")]
#[command(author, version, about = "Asset provisioning operator commands", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON state snapshot to load and update
    #[arg(long, global = true, default_value = "provisioning-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove every item from a user and deactivate them everywhere
    DeprovisionUser {
        #[arg(long)]
        username: String,

        /// Restrict to one tenant (name or id)
        #[arg(long)]
        tenant: Option<String>,

        /// Delete the user afterwards
        #[arg(long)]
        delete: bool,
    },

    /// Import users from every tenant's remote directory
    LoadUsers,

    /// Refresh and print last-seen information of a tenant's users
    LastSeen {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        skip_okta: bool,

        #[arg(long)]
        skip_google: bool,

        #[arg(long)]
        skip_airwatch: bool,
    },

    /// Provision one asset to a user on the tenant's service of the given kind
    Provision {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: String,

        /// Asset slug
        #[arg(long)]
        asset: String,

        /// Service kind: okta, airwatch, google, ...
        #[arg(long)]
        service: ServiceKind,
    },

    /// Periodically re-apply assignments on services of one kind
    Daemon {
        #[arg(long)]
        service: ServiceKind,

        /// Overrides the configured daemon interval
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> ProvisionResult<()> {
    let config = match &cli.config {
        Some(path) => ProvisioningConfig::from_file(path)?,
        None => ProvisioningConfig::default(),
    };
    let storage = Arc::new(load_state(&cli.state)?);
    let adapters = AdapterRegistry::standard(&config.http);
    let context = ProvisioningContext::new(Arc::clone(&storage), adapters, config);

    let result = match cli.command {
        Commands::DeprovisionUser {
            username,
            tenant,
            delete,
        } => deprovision_user(&context, &username, tenant.as_deref(), delete).await,
        Commands::LoadUsers => load_users(&context).await,
        Commands::LastSeen {
            tenant,
            skip_okta,
            skip_google,
            skip_airwatch,
        } => {
            let mut skip = BTreeSet::new();
            if skip_okta {
                skip.insert(ServiceKind::DirectorySso);
            }
            if skip_google {
                skip.insert(ServiceKind::Generic);
            }
            if skip_airwatch {
                skip.insert(ServiceKind::Mdm);
            }
            last_seen(&context, &tenant, &skip).await
        }
        Commands::Provision {
            tenant,
            user,
            asset,
            service,
        } => provision(&context, &tenant, &user, &asset, service).await,
        Commands::Daemon {
            service,
            interval_secs,
        } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(context.config.engine.daemon_interval);
            let daemon = PollingDaemon::new(context.engine.clone(), service, interval);
            daemon
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Cannot listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            Ok(())
        }
    };

    save_state(&cli.state, &storage).await?;
    result
}

fn load_state(path: &Path) -> ProvisionResult<InMemoryStorage> {
    if !path.exists() {
        return Ok(InMemoryStorage::new());
    }
    let raw = std::fs::read_to_string(path)?;
    let snapshot = serde_json::from_str(&raw)?;
    Ok(InMemoryStorage::from_snapshot(snapshot)?)
}

async fn save_state(path: &Path, storage: &InMemoryStorage) -> ProvisionResult<()> {
    let snapshot = storage.snapshot().await;
    std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
    Ok(())
}

async fn tenant_named(context: &ProvisioningContext<InMemoryStorage>, name: &str) -> ProvisionResult<Tenant> {
    context
        .directory
        .find_tenant(name)
        .await?
        .ok_or_else(|| ProvisionError::not_found("Tenant", name))
}

async fn user_named(
    context: &ProvisioningContext<InMemoryStorage>,
    tenant: &Tenant,
    username: &str,
) -> ProvisionResult<User> {
    context
        .directory
        .find_user(tenant.id, username)
        .await?
        .ok_or_else(|| ProvisionError::not_found("User", username))
}

fn print_reports(reports: &[ReconcileReport]) {
    for report in reports {
        println!("  {}", report);
        for item in report.failed() {
            println!("    ✗ {} {:?}", item.item, item.outcome);
        }
    }
}

async fn deprovision_user(
    context: &ProvisioningContext<InMemoryStorage>,
    username: &str,
    tenant: Option<&str>,
    delete: bool,
) -> ProvisionResult<()> {
    let tenants = match tenant {
        Some(name) => vec![tenant_named(context, name).await?],
        None => context.directory.tenants().await?,
    };

    let mut found = false;
    for tenant in tenants {
        let Some(user) = context.directory.find_user(tenant.id, username).await? else {
            continue;
        };
        found = true;
        println!("Deprovisioning {} in {}", user.username, tenant.name);
        let editor = tenant.primary_contact.clone();
        let reports = context.engine.deprovision_user_fully(&user, &editor).await?;
        print_reports(&reports);

        if delete {
            if reports.iter().any(ReconcileReport::has_failures) {
                warn!(
                    "Keeping {} in {}: some items could not be removed remotely",
                    user.username, tenant.name
                );
                continue;
            }
            context.directory.delete_user(Some(&editor), &user).await?;
            println!("  Deleted {}", user.username);
        }
    }

    if !found {
        return Err(ProvisionError::not_found("User", username));
    }
    Ok(())
}

async fn load_users(context: &ProvisioningContext<InMemoryStorage>) -> ProvisionResult<()> {
    for tenant in context.directory.tenants().await? {
        if tenant.directory.is_none() {
            continue;
        }
        match context
            .directory
            .load_users(tenant.id, &tenant.primary_contact)
            .await
        {
            Ok(summary) => println!(
                "{}: {} created, {} merged, {} unchanged",
                tenant.name, summary.created, summary.merged, summary.unchanged
            ),
            Err(e) => warn!("Loading users of {} failed: {}", tenant.name, e),
        }
    }
    Ok(())
}

async fn last_seen(
    context: &ProvisioningContext<InMemoryStorage>,
    tenant: &str,
    skip: &BTreeSet<ServiceKind>,
) -> ProvisionResult<()> {
    let tenant = tenant_named(context, tenant).await?;
    let summary = context.reporting.refresh_last_seen(tenant.id, skip).await?;
    println!(
        "Queried {} service(s), {} update(s), {} failure(s)",
        summary.services, summary.updated, summary.failed_services
    );

    for user in context.directory.users(tenant.id).await? {
        match context.reporting.last_seen(&user).await? {
            Some(seen) => println!("{:<30} {}", user.username, seen.to_rfc3339()),
            None => println!("{:<30} never", user.username),
        }
    }
    Ok(())
}

async fn provision(
    context: &ProvisioningContext<InMemoryStorage>,
    tenant: &str,
    username: &str,
    slug: &str,
    kind: ServiceKind,
) -> ProvisionResult<()> {
    let tenant = tenant_named(context, tenant).await?;
    let user = user_named(context, &tenant, username).await?;
    let asset = context
        .directory
        .find_assets(tenant.id, slug)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ProvisionError::not_found("Asset", slug))?;
    let service = context
        .directory
        .services(tenant.id)
        .await?
        .into_iter()
        .find(|service| service.is_active && service.kind() == kind)
        .ok_or_else(|| ProvisionError::not_found("Service", kind))?;

    let mut desired: BTreeSet<_> = context
        .engine
        .current_records(&user, service.id)
        .await?
        .into_iter()
        .map(|record| record.item)
        .collect();
    desired.insert(asset.item_ref());

    let report = context
        .engine
        .reconcile(&user, &service, &desired, &tenant.primary_contact)
        .await?;
    print_reports(std::slice::from_ref(&report));
    Ok(())
}
