//! Command dispatcher that routes parsed CLI commands to their handlers.
//!
//! Each subcommand gets a focused handler module; shared concerns (mode
//! resolution, warning display) live here.

mod check;
mod lots;
mod reconcile;
mod report;

use anyhow::{anyhow, Result};
use colored::Colorize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::cli::Commands;
use crate::config::EngineConfig;
use crate::models::{Warning, WashSaleMode};

/// Route a parsed command to its handler
pub fn dispatch_command(command: Commands, config: &EngineConfig, json_output: bool) -> Result<()> {
    match command {
        Commands::Report {
            trades,
            year,
            mode,
            export,
        } => {
            let mode = resolve_mode(mode.as_deref(), config)?;
            report::dispatch_report(&trades, year, mode, config, export.as_deref(), json_output)
        }
        Commands::Reconcile {
            trades,
            broker,
            year,
            mode,
            signals,
        } => {
            let mode = resolve_mode(mode.as_deref(), config)?;
            reconcile::dispatch_reconcile(
                &trades,
                &broker,
                year,
                mode,
                signals.as_deref(),
                config,
                json_output,
            )
        }
        Commands::Lots {
            trades,
            as_of,
            account,
            mode,
        } => {
            let mode = resolve_mode(mode.as_deref(), config)?;
            lots::dispatch_lots(&trades, as_of, account.as_deref(), mode, config, json_output)
        }
        Commands::Check { trades, year, mode } => {
            let mode = resolve_mode(mode.as_deref(), config)?;
            check::dispatch_check(&trades, year, mode, config, json_output)
        }
    }
}

/// CLI flag wins over the config file's default mode.
fn resolve_mode(flag: Option<&str>, config: &EngineConfig) -> Result<WashSaleMode> {
    match flag {
        Some(text) => WashSaleMode::from_str(text)
            .map_err(|_| anyhow!("invalid wash-sale mode '{}'; use broker or irs", text)),
        None => config.mode(),
    }
}

pub(crate) fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{} {} warning(s):", "⚠".yellow().bold(), warnings.len());
    for w in warnings {
        match &w.trade_id {
            Some(id) => println!("  [{}] {} (trade {})", w.kind.as_str(), w.message, id),
            None => println!("  [{}] {}", w.kind.as_str(), w.message),
        }
    }
}

pub(crate) fn print_failed_accounts(failed: &BTreeMap<String, String>) {
    if failed.is_empty() {
        return;
    }
    println!(
        "\n{} {} account(s) excluded after invariant violations:",
        "✗".red().bold(),
        failed.len()
    );
    for (account, detail) in failed {
        println!("  {}: {}", account.bold(), detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mode_flag_overrides_config() {
        let mut config = EngineConfig::default();
        config.default_mode = "irs".to_string();

        let mode = resolve_mode(Some("broker"), &config).unwrap();
        assert_eq!(mode, WashSaleMode::BrokerStyle);
        let mode = resolve_mode(None, &config).unwrap();
        assert_eq!(mode, WashSaleMode::IrsStyle);
        assert!(resolve_mode(Some("fifo"), &config).is_err());
    }
}
