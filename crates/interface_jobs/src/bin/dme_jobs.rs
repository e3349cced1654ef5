//! DME batch job runner
//!
//! # Usage
//!
//! ```bash
//! dme-jobs recalculate-invoices
//! dme-jobs recalculate-invoices --after 120000
//! dme-jobs update-pending-submissions --date 2024-05-01
//! DME_CHUNK_SIZE=200 dme-jobs refresh-inventory --after 3:1450
//! ```
//!
//! # Environment Variables
//!
//! * `DME_DATABASE_URL` - PostgreSQL connection string
//! * `DME_LOG_LEVEL` - Log level or filter directive (default: info)
//! * `DME_LOG_JSON` - Emit JSON log lines (default: false)
//! * `DME_CHUNK_SIZE` - Keys per committed transaction (default: 500)
//! * `DME_ACTOR_USER_ID` - User recorded on appended transactions (default: 1)

use anyhow::{Context, Result};
use clap::Parser;
use validator::Validate;

use infra_db::{create_pool, run_migrations, DatabaseConfig, InventoryRepository, InvoiceRepository};
use interface_jobs::cli::{Cli, Command};
use interface_jobs::telemetry::init_tracing;
use interface_jobs::{refresh_inventory, run_invoice_job, InvoiceJob, JobConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = JobConfig::from_env().context("failed to load job configuration")?;
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
        config.validate().context("invalid --chunk-size")?;
    }

    init_tracing(&config.log_level, config.log_json);
    tracing::info!(chunk_size = config.chunk_size, command = ?cli.command, "Starting DME job");

    let pool = create_pool(DatabaseConfig::new(&config.database_url).application_name("dme-jobs"))
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool).await.context("failed to apply migrations")?;

    let chunk = config.chunk_limit();
    match cli.command {
        Command::RecalculateInvoices(args) => {
            let repo = InvoiceRepository::new(pool);
            let report = run_invoice_job(&repo, InvoiceJob::Recalculate, chunk, args.after).await?;
            tracing::info!(?report, "Job complete");
        }
        Command::UpdatePendingSubmissions(args) => {
            let date = args.date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let job = InvoiceJob::PendingSubmissions { date, actor: config.actor() };
            let repo = InvoiceRepository::new(pool);
            let report = run_invoice_job(&repo, job, chunk, args.invoices.after).await?;
            tracing::info!(?report, "Job complete");
        }
        Command::RefreshInventory(args) => {
            let repo = InventoryRepository::new(pool);
            let report = refresh_inventory(&repo, chunk, args.after).await?;
            tracing::info!(?report, "Job complete");
        }
    }

    Ok(())
}
