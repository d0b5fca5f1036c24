use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "lws-fulfillment")]
#[command(about = "Two-site LWS order fulfillment workflow")]
#[command(long_about = "Drives eligible LWS orders from the raw-material site through purchase order, \
                       site-B sales order, shipping request and site-B job, one idempotent step at a time. \
                       Run 'lws-fulfillment run' from the scheduler.")]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "lws-fulfillment.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile completed orders, then drive every eligible order as far as it can go
    Run,
    /// Queue an order for the next run
    Queue {
        /// Site-A sales order number
        order: i64,
    },
    /// Reset a held or failed order so the next run starts it from the top
    Retry {
        /// Site-A sales order number
        order: i64,
    },
    /// Exclude an order from all further processing
    Remove {
        /// Site-A sales order number
        order: i64,
    },
    /// Show the stored state of one order
    Status {
        /// Site-A sales order number
        order: i64,
    },
    /// Send reminders and escalations for ageing holds
    HoldReminders,
    /// Send the daily summary of orders awaiting reconfirmation
    HoldSummary,
    /// Move old completed orders into the archive
    Archive,
    /// Print the effective configuration as TOML
    Config {
        /// Write the configuration to this file instead of printing it
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
