//! Command line of the `dme-jobs` binary

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use core_kernel::InvoiceId;
use infra_db::StockKey;

use crate::jobs::parse_stock_key;

#[derive(Debug, Parser)]
#[command(name = "dme-jobs", about = "Batch maintenance jobs for DME billing and inventory", version)]
pub struct Cli {
    /// Overrides DME_CHUNK_SIZE for this run
    #[arg(long, global = true)]
    pub chunk_size: Option<u32>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Recompute the reconciliation fields of every invoice line
    RecalculateInvoices(InvoiceArgs),
    /// Queue a pending submission for the current payer of every open line
    UpdatePendingSubmissions(PendingArgs),
    /// Recompute every inventory level from its ledger
    RefreshInventory(InventoryArgs),
}

#[derive(Debug, Args)]
pub struct InvoiceArgs {
    /// Resume after this invoice id
    #[arg(long)]
    pub after: Option<InvoiceId>,
}

#[derive(Debug, Args)]
pub struct PendingArgs {
    #[command(flatten)]
    pub invoices: InvoiceArgs,
    /// Transaction date of the queued submissions (default: today)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct InventoryArgs {
    /// Resume after this `warehouse:item` key
    #[arg(long, value_parser = parse_stock_key)]
    pub after: Option<StockKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{InventoryItemId, WarehouseId};

    #[test]
    fn test_parse_recalculate_with_resume() {
        let cli = Cli::try_parse_from(["dme-jobs", "recalculate-invoices", "--after", "INV-40"]).unwrap();
        match cli.command {
            Command::RecalculateInvoices(args) => assert_eq!(args.after, Some(InvoiceId::new(40))),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.chunk_size, None);
    }

    #[test]
    fn test_parse_pending_submissions() {
        let cli = Cli::try_parse_from([
            "dme-jobs",
            "update-pending-submissions",
            "--date",
            "2024-05-01",
            "--chunk-size",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.chunk_size, Some(50));
        match cli.command {
            Command::UpdatePendingSubmissions(args) => {
                assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 5, 1));
                assert_eq!(args.invoices.after, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_inventory_key() {
        let cli = Cli::try_parse_from(["dme-jobs", "refresh-inventory", "--after", "2:17"]).unwrap();
        match cli.command {
            Command::RefreshInventory(args) => {
                assert_eq!(args.after, Some((WarehouseId::new(2), InventoryItemId::new(17))))
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_inventory_key() {
        assert!(Cli::try_parse_from(["dme-jobs", "refresh-inventory", "--after", "17"]).is_err());
    }

    #[test]
    fn test_requires_a_command() {
        assert!(Cli::try_parse_from(["dme-jobs"]).is_err());
    }
}
