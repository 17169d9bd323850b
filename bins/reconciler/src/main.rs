//! Balance reconciler for Tally.
//!
//! Usage:
//!   reconciler                         - Rebuild balances of every tenant
//!   reconciler --tenant <ID>           - Rebuild balances of one tenant
//!   reconciler --dry-run               - Report drift without writing
//!   reconciler --resync-flagged        - Replay vouchers flagged by the worker first

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tally_db::{connect, PgStore, Reconciler};
use tally_shared::types::TenantId;
use tally_shared::{AppConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "reconciler")]
#[command(about = "Rebuild cached account balances from posted vouchers", long_about = None)]
struct Cli {
    /// Only reconcile this tenant
    #[arg(short, long)]
    tenant: Option<TenantId>,

    /// Report drift without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Replay flagged vouchers before rebuilding
    #[arg(long)]
    resync_flagged: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tally_db=info,reconciler=info,warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    init_tracing(config.log.format);

    let db = connect(&config.database).await?;
    info!("Connected to database");
    let reconciler = Reconciler::new(Arc::new(PgStore::new(db)));

    if cli.resync_flagged && !cli.dry_run {
        let tenants = match cli.tenant {
            Some(tenant_id) => vec![tenant_id],
            None => reconciler.tenant_ids().await?,
        };
        for tenant_id in tenants {
            let report = reconciler.resync_flagged(tenant_id).await?;
            if !report.failed.is_empty() {
                warn!(%tenant_id, failed = report.failed.len(), "Some flagged vouchers are still out of sync");
            }
        }
    }

    let reports = match cli.tenant {
        Some(tenant_id) => vec![reconciler.reconcile_tenant(tenant_id, cli.dry_run).await?],
        None => reconciler.reconcile_all(cli.dry_run).await?,
    };

    let drifted = reports.iter().filter(|r| !r.is_clean()).count();
    info!(tenants = reports.len(), drifted, dry_run = cli.dry_run, "Reconciliation complete");
    println!("{}", serde_json::to_string_pretty(&reports)?);

    Ok(())
}
