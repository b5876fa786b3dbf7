use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser)]
#[command(name = "taxlot")]
#[command(
    version,
    about = "Multi-account tax-lot and wash-sale engine with tax-year reporting"
)]
#[command(
    long_about = "Match trades into FIFO tax lots per account, scan losses for wash-sale \
replacements in broker-style and IRS-style modes, build 8949-like tax-year reports, and \
reconcile them against broker-reported totals."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Path to a TOML config file (built-in defaults apply when omitted)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the tax-year report from a normalized trade file
    Report {
        /// Path to the normalized trade CSV
        trades: PathBuf,

        /// Tax year to report on
        #[arg(short, long)]
        year: i32,

        /// Wash-sale mode: broker or irs (overrides the config file)
        #[arg(short, long)]
        mode: Option<String>,

        /// Also write the detail rows and totals to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Diff the year's report against broker-reported totals
    Reconcile {
        /// Path to the normalized trade CSV
        trades: PathBuf,

        /// Path to the broker totals CSV
        broker: PathBuf,

        /// Tax year to reconcile
        #[arg(short, long)]
        year: i32,

        /// Wash-sale mode: broker or irs (overrides the config file)
        #[arg(short, long)]
        mode: Option<String>,

        /// Optional corporate-action signal CSV
        #[arg(long)]
        signals: Option<PathBuf>,
    },

    /// Show open lots with adjusted basis and holding days
    Lots {
        /// Path to the normalized trade CSV
        trades: PathBuf,

        /// Snapshot date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Only show lots in this account (any account type)
        #[arg(short, long)]
        account: Option<String>,

        /// Wash-sale mode for basis adjustments: broker or irs
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Run the pipeline twice and verify replay fingerprints, conservation
    /// and data-quality warnings
    Check {
        /// Path to the normalized trade CSV
        trades: PathBuf,

        /// Tax year the replay report is built for
        #[arg(short, long)]
        year: i32,

        /// Wash-sale mode: broker or irs (overrides the config file)
        #[arg(short, long)]
        mode: Option<String>,
    },
}
