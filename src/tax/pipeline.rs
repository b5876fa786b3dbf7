// Pipeline - validate, sort, match lots, wash-sale scan, report

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{Trade, Warning, WarningKind, WashSaleMode};
use super::lots::LotLedger;
use super::report::{build_tax_year_report, TaxYearReport};
use super::wash_sale::{apply_wash_sales, WashSalePass};

/// Everything one engine run produces. Identical inputs replay to an
/// identical run, byte for byte on the report fingerprint.
pub struct PipelineRun {
    pub ledger: LotLedger,
    pub trades: Vec<Trade>,
    pub broker_pass: WashSalePass,
    pub irs_pass: WashSalePass,
    pub report: TaxYearReport,
    pub warnings: Vec<Warning>,
    pub failed_accounts: BTreeMap<String, String>,
    pub skip_accounts: BTreeSet<String>,
}

/// Run the full engine over a trade history: validate rows, sort globally by
/// `(executed_at, seq)`, match lots, then scan wash sales in both modes and
/// build the year's report.
///
/// The wash-sale scan starts only after every account is fully matched, so a
/// replacement purchase is found no matter where its account sits in the
/// input. An invariant violation poisons only its own account: matching for
/// that account stops and its data is excluded from the scan and the report.
pub fn run_pipeline(
    trades: Vec<Trade>,
    year: i32,
    mode: WashSaleMode,
    config: &EngineConfig,
) -> Result<PipelineRun> {
    let mut warnings = Vec::new();
    let mut trades = validate(trades, &mut warnings);
    trades.sort_by(|a, b| (a.executed_at, a.seq).cmp(&(b.executed_at, b.seq)));

    let mut ledger = LotLedger::new();
    let mut failed_accounts: BTreeMap<String, String> = BTreeMap::new();
    for trade in &trades {
        if failed_accounts.contains_key(&trade.account_id) {
            continue;
        }
        match ledger.process_trade(trade) {
            Ok((_, warning)) => warnings.extend(warning),
            Err(err) => {
                warn!(
                    account = %trade.account_id,
                    %err,
                    "account failed matching and is excluded from this run"
                );
                failed_accounts.insert(trade.account_id.clone(), err.to_string());
            }
        }
    }
    ledger.verify_conservation()?;
    let skip_accounts: BTreeSet<String> = failed_accounts.keys().cloned().collect();

    let broker_pass = apply_wash_sales(
        &mut ledger,
        &trades,
        &skip_accounts,
        WashSaleMode::BrokerStyle,
        config.wash_sale_window_days,
    )?;
    let irs_pass = apply_wash_sales(
        &mut ledger,
        &trades,
        &skip_accounts,
        WashSaleMode::IrsStyle,
        config.wash_sale_window_days,
    )?;

    let report = build_tax_year_report(
        &ledger,
        &broker_pass,
        &irs_pass,
        year,
        mode,
        config,
        &skip_accounts,
    );
    debug!(
        year,
        mode = mode.as_str(),
        rows = report.summary.row_count,
        warnings = warnings.len(),
        failed_accounts = failed_accounts.len(),
        "pipeline finished"
    );

    Ok(PipelineRun {
        ledger,
        trades,
        broker_pass,
        irs_pass,
        report,
        warnings,
        failed_accounts,
        skip_accounts,
    })
}

/// Drop rows the matcher must never see. Each skipped row becomes an
/// ingestion warning; the run continues without it.
fn validate(trades: Vec<Trade>, warnings: &mut Vec<Warning>) -> Vec<Trade> {
    let mut seen = BTreeSet::new();
    let mut valid = Vec::with_capacity(trades.len());
    for trade in trades {
        if trade.quantity <= Decimal::ZERO {
            warnings.push(Warning::for_trade(
                WarningKind::Ingestion,
                format!("non-positive quantity {}; trade skipped", trade.quantity),
                &trade,
            ));
            continue;
        }
        if trade.price < Decimal::ZERO {
            warnings.push(Warning::for_trade(
                WarningKind::Ingestion,
                format!("negative price {}; trade skipped", trade.price),
                &trade,
            ));
            continue;
        }
        if trade.fees < Decimal::ZERO {
            warnings.push(Warning::for_trade(
                WarningKind::Ingestion,
                format!("negative fees {}; trade skipped", trade.fees),
                &trade,
            ));
            continue;
        }
        if !seen.insert(trade.trade_id.clone()) {
            warnings.push(Warning::for_trade(
                WarningKind::Ingestion,
                format!("duplicate trade id {}; trade skipped", trade.trade_id),
                &trade,
            ));
            continue;
        }
        valid.push(trade);
    }
    valid
}
