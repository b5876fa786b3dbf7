use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::EngineConfig;
use crate::models::{
    BrokerRow, CorporateActionSignal, Term, Trade, Warning, WarningKind, WashSaleMode,
};
use crate::utils::{round_to, year_bounds};
use super::lots::LotLedger;
use super::report::TaxYearReport;
use super::wash_sale::WashSalePass;

/// App-vs-broker comparison of one canonical metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDelta {
    pub metric: String,
    pub app_value: Decimal,
    pub broker_value: Decimal,
    pub delta: Decimal,
}

/// App-vs-broker comparison within one bucket (symbol, date or term),
/// carrying both the gain/loss and the wash-sale views.
#[derive(Debug, Clone, Serialize)]
pub struct BucketDelta {
    pub key: String,
    pub app_gain_loss: Decimal,
    pub broker_gain_loss: Decimal,
    pub gain_loss_delta: Decimal,
    pub app_wash_disallowed: Decimal,
    pub broker_wash_disallowed: Decimal,
    pub wash_disallowed_delta: Decimal,
}

/// One mismatch-cause heuristic with its supporting evidence.
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub key: String,
    pub flag: bool,
    pub reason: String,
    pub signal_count: usize,
    pub evidence: Vec<String>,
}

/// Wash-sale activity crossing the selected year's edges. Fed into the
/// boundary and lot-method checklist reasons.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoundaryDiagnostics {
    pub partial_replacement_sale_count: usize,
    pub partial_replacement_unmatched_quantity: Decimal,
    pub disallowed_to_prior_year_replacements: Decimal,
    pub disallowed_to_next_year_replacements: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationHealth {
    pub in_sync: bool,
    pub max_abs_delta: Decimal,
    pub mismatched_metrics: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub year: i32,
    pub mode: WashSaleMode,
    pub totals: Vec<MetricDelta>,
    pub by_symbol: Vec<BucketDelta>,
    pub by_date: Vec<BucketDelta>,
    pub by_term: Vec<BucketDelta>,
    pub boundary: BoundaryDiagnostics,
    pub checklist: Vec<ChecklistItem>,
    pub health: ReconciliationHealth,
    pub excluded_broker_rows: usize,
}

/// Diff the year's report against broker-supplied totals and run the
/// mismatch-cause checklist. Broker rows missing symbol, sale date or
/// gain/loss are excluded from diffing and reported as warnings.
#[allow(clippy::too_many_arguments)]
pub fn reconcile(
    ledger: &LotLedger,
    report: &TaxYearReport,
    broker_rows: &[BrokerRow],
    trades: &[Trade],
    broker_pass: &WashSalePass,
    irs_pass: &WashSalePass,
    signals: &[CorporateActionSignal],
    config: &EngineConfig,
    skip_accounts: &BTreeSet<String>,
) -> (ReconciliationReport, Vec<Warning>) {
    let dp = config.rounding_dp;
    let (year_start, year_end) = year_bounds(report.year);
    let selected = match report.mode {
        WashSaleMode::BrokerStyle => broker_pass,
        WashSaleMode::IrsStyle => irs_pass,
    };

    let mut warnings = Vec::new();
    let mut valid: Vec<&BrokerRow> = Vec::new();
    for (i, row) in broker_rows.iter().enumerate() {
        if row.is_diffable() {
            valid.push(row);
        } else {
            warnings.push(Warning::new(
                WarningKind::ReconciliationInput,
                format!(
                    "broker row {} ({}) is missing symbol, sale date or gain/loss; excluded from diffing",
                    i + 1,
                    if row.symbol.trim().is_empty() { "<no symbol>" } else { row.symbol.trim() },
                ),
            ));
        }
    }
    let excluded_broker_rows = broker_rows.len() - valid.len();

    // Six canonical totals
    let mut broker_proceeds = Decimal::ZERO;
    let mut broker_basis = Decimal::ZERO;
    let mut broker_gl = Decimal::ZERO;
    let mut broker_st = Decimal::ZERO;
    let mut broker_lt = Decimal::ZERO;
    let mut broker_wash = Decimal::ZERO;
    for row in &valid {
        let gl = row.gain_loss.unwrap_or_default();
        broker_proceeds += row.proceeds.unwrap_or_default();
        broker_basis += row.cost_basis.unwrap_or_default();
        broker_gl += gl;
        match row.term {
            Some(Term::Short) => broker_st += gl,
            Some(Term::Long) => broker_lt += gl,
            None => {}
        }
        broker_wash += row.wash_sale_disallowed.unwrap_or_default();
    }

    let app_wash = match report.mode {
        WashSaleMode::BrokerStyle => report.summary.wash_sale_disallowed_broker,
        WashSaleMode::IrsStyle => report.summary.wash_sale_disallowed_irs,
    };
    let totals = vec![
        metric("total_proceeds", report.summary.total_proceeds, round_to(broker_proceeds, dp)),
        metric("total_cost_basis", report.summary.total_cost_basis, round_to(broker_basis, dp)),
        metric("total_gain_loss", report.summary.total_gain_loss, round_to(broker_gl, dp)),
        metric(
            "short_term_gain_loss",
            report.summary.short_term_gain_loss,
            round_to(broker_st, dp),
        ),
        metric(
            "long_term_gain_loss",
            report.summary.long_term_gain_loss,
            round_to(broker_lt, dp),
        ),
        metric("total_wash_sale_disallowed", app_wash, round_to(broker_wash, dp)),
    ];

    let by_symbol = buckets(
        report.rows.iter().map(|r| (r.symbol.clone(), r.gain_loss, r.adjustment_amount)),
        valid.iter().map(|r| {
            (
                r.symbol.trim().to_ascii_uppercase(),
                r.gain_loss.unwrap_or_default(),
                r.wash_sale_disallowed.unwrap_or_default(),
            )
        }),
        dp,
    );
    let by_date = buckets(
        report.rows.iter().map(|r| (r.date_sold.to_string(), r.gain_loss, r.adjustment_amount)),
        valid.iter().map(|r| {
            (
                r.sale_date.map(|d| d.to_string()).unwrap_or_default(),
                r.gain_loss.unwrap_or_default(),
                r.wash_sale_disallowed.unwrap_or_default(),
            )
        }),
        dp,
    );
    let by_term = buckets(
        report.rows.iter().map(|r| (r.term.as_str().to_string(), r.gain_loss, r.adjustment_amount)),
        valid.iter().filter(|r| r.term.is_some()).map(|r| {
            (
                r.term.map(|t| t.as_str().to_string()).unwrap_or_default(),
                r.gain_loss.unwrap_or_default(),
                r.wash_sale_disallowed.unwrap_or_default(),
            )
        }),
        dp,
    );

    // Wash-sale activity crossing the year's edges, selected mode
    let mut boundary = BoundaryDiagnostics::default();
    for (event_id, adjustment) in &selected.adjustments {
        let event = ledger.event(*event_id);
        let sale_date = event.sale_date();
        if sale_date < year_start || sale_date > year_end {
            continue;
        }
        if adjustment.replaced_quantity < adjustment.loss_quantity {
            boundary.partial_replacement_sale_count += 1;
            boundary.partial_replacement_unmatched_quantity +=
                adjustment.loss_quantity - adjustment.replaced_quantity;
        }
        for allocation in &adjustment.allocations {
            if allocation.acquired_on < year_start {
                boundary.disallowed_to_prior_year_replacements += allocation.amount;
            } else if allocation.acquired_on > year_end {
                boundary.disallowed_to_next_year_replacements += allocation.amount;
            }
        }
    }
    boundary.disallowed_to_prior_year_replacements =
        round_to(boundary.disallowed_to_prior_year_replacements, dp);
    boundary.disallowed_to_next_year_replacements =
        round_to(boundary.disallowed_to_next_year_replacements, dp);

    let checklist = build_checklist(
        ledger,
        report,
        trades,
        irs_pass,
        signals,
        &totals,
        &boundary,
        &by_symbol,
        config,
        skip_accounts,
    );

    let max_abs_delta = totals
        .iter()
        .map(|m| m.delta.abs())
        .max()
        .unwrap_or(Decimal::ZERO);
    let mismatched_metrics = totals.iter().filter(|m| !m.delta.is_zero()).count();
    let health = ReconciliationHealth {
        in_sync: mismatched_metrics == 0,
        max_abs_delta,
        mismatched_metrics,
    };

    (
        ReconciliationReport {
            year: report.year,
            mode: report.mode,
            totals,
            by_symbol,
            by_date,
            by_term,
            boundary,
            checklist,
            health,
            excluded_broker_rows,
        },
        warnings,
    )
}

fn metric(name: &str, app_value: Decimal, broker_value: Decimal) -> MetricDelta {
    MetricDelta {
        metric: name.to_string(),
        app_value,
        broker_value,
        delta: app_value - broker_value,
    }
}

/// Merge app and broker sides into per-key deltas, largest absolute
/// gain/loss delta first.
fn buckets(
    app: impl Iterator<Item = (String, Decimal, Decimal)>,
    broker: impl Iterator<Item = (String, Decimal, Decimal)>,
    dp: u32,
) -> Vec<BucketDelta> {
    let mut app_side: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
    for (key, gl, wash) in app {
        let entry = app_side.entry(key).or_default();
        entry.0 += gl;
        entry.1 += wash;
    }
    let mut broker_side: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
    for (key, gl, wash) in broker {
        let entry = broker_side.entry(key).or_default();
        entry.0 += gl;
        entry.1 += wash;
    }

    let keys: BTreeSet<&String> = app_side.keys().chain(broker_side.keys()).collect();
    let mut rows: Vec<BucketDelta> = keys
        .into_iter()
        .map(|key| {
            let (app_gl, app_wash) = app_side.get(key).copied().unwrap_or_default();
            let (broker_gl, broker_wash) = broker_side.get(key).copied().unwrap_or_default();
            let broker_gl = round_to(broker_gl, dp);
            let broker_wash = round_to(broker_wash, dp);
            BucketDelta {
                key: key.clone(),
                app_gain_loss: app_gl,
                broker_gain_loss: broker_gl,
                gain_loss_delta: app_gl - broker_gl,
                app_wash_disallowed: app_wash,
                broker_wash_disallowed: broker_wash,
                wash_disallowed_delta: app_wash - broker_wash,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.gain_loss_delta
            .abs()
            .cmp(&a.gain_loss_delta.abs())
            .then(b.wash_disallowed_delta.abs().cmp(&a.wash_disallowed_delta.abs()))
            .then(a.key.cmp(&b.key))
    });
    rows
}

#[allow(clippy::too_many_arguments)]
fn build_checklist(
    ledger: &LotLedger,
    report: &TaxYearReport,
    trades: &[Trade],
    irs_pass: &WashSalePass,
    signals: &[CorporateActionSignal],
    totals: &[MetricDelta],
    boundary: &BoundaryDiagnostics,
    by_symbol: &[BucketDelta],
    config: &EngineConfig,
    skip_accounts: &BTreeSet<String>,
) -> Vec<ChecklistItem> {
    let (year_start, year_end) = year_bounds(report.year);
    let window = Duration::days(config.wash_sale_window_days);
    let history_start: Option<NaiveDate> = trades.iter().map(|t| t.executed_on()).min();
    let history_end: Option<NaiveDate> = trades.iter().map(|t| t.executed_on()).max();
    let material_delta = totals.iter().any(|m| !m.delta.is_zero())
        || !report.summary.wash_sale_mode_difference.is_zero();

    // Sales close enough to Dec 31/Jan 1 that their replacement window can
    // reach outside the year.
    let mut boundary_sales: Vec<String> = Vec::new();
    let mut uncovered_sales = 0usize;
    for event in ledger.events() {
        let sale = event.sale_date();
        if sale < year_start || sale > year_end {
            continue;
        }
        if !event.account_type.is_taxable() || skip_accounts.contains(&event.account_id) {
            continue;
        }
        let near_boundary = sale + window > year_end || sale - window < year_start;
        if !near_boundary {
            continue;
        }
        boundary_sales.push(event.close_trade.clone());
        let covered = match (history_start, history_end) {
            (Some(start), Some(end)) => sale - window >= start && sale + window <= end,
            _ => false,
        };
        if !covered {
            uncovered_sales += 1;
        }
    }

    let boundary_flag =
        uncovered_sales > 0 || (!boundary_sales.is_empty() && material_delta);
    let mut boundary_reason = if uncovered_sales > 0 {
        format!(
            "{} boundary-period sale(s) lack full {}-day window coverage in the available trade history.",
            uncovered_sales, config.wash_sale_window_days
        )
    } else if boundary_flag {
        "Boundary-period sales plus material broker-vs-IRS deltas.".to_string()
    } else if boundary_sales.is_empty() {
        "No sales near the year boundary.".to_string()
    } else {
        "Boundary-period sales present but totals agree.".to_string()
    };
    if !boundary.disallowed_to_prior_year_replacements.is_zero()
        || !boundary.disallowed_to_next_year_replacements.is_zero()
    {
        boundary_reason.push_str(&format!(
            " Year-boundary context: {} allocated to pre-{} replacement buys, {} to post-{} replacement buys.",
            boundary.disallowed_to_prior_year_replacements,
            report.year,
            boundary.disallowed_to_next_year_replacements,
            report.year,
        ));
    }

    // Cross-account and option replacements come from the IRS-style scan
    // regardless of the selected mode: they explain divergence from broker
    // same-account reporting either way.
    let mut cross_evidence: Vec<String> = Vec::new();
    let mut option_evidence: Vec<String> = Vec::new();
    for (event_id, adjustment) in &irs_pass.adjustments {
        let event = ledger.event(*event_id);
        let sale = event.sale_date();
        if sale < year_start || sale > year_end {
            continue;
        }
        if adjustment.allocations.iter().any(|a| a.cross_account) {
            cross_evidence.push(event.close_trade.clone());
        }
        if adjustment.allocations.iter().any(|a| a.contract.is_option()) {
            option_evidence.push(event.close_trade.clone());
        }
    }
    let cross_flag = !cross_evidence.is_empty();
    let option_flag = !option_evidence.is_empty();

    let gl_delta = totals
        .iter()
        .find(|m| m.metric == "total_gain_loss")
        .map(|m| m.delta)
        .unwrap_or_default();
    let wash_delta = totals
        .iter()
        .find(|m| m.metric == "total_wash_sale_disallowed")
        .map(|m| m.delta)
        .unwrap_or_default();
    // More specific causes win: only blame lot selection when nothing else
    // explains the gap.
    let lot_method_flag =
        !gl_delta.is_zero() && wash_delta.is_zero() && !cross_flag && !option_flag;
    let partial_evidence: Vec<String> = if boundary.partial_replacement_sale_count > 0 {
        irs_pass
            .adjustments
            .values()
            .filter(|a| a.replaced_quantity < a.loss_quantity)
            .map(|a| ledger.event(a.loss_event).close_trade.clone())
            .collect()
    } else {
        Vec::new()
    };
    let mut lot_method_reason = if lot_method_flag {
        format!(
            "Gain/loss differs by {} while wash-sale deltas are negligible; the broker may have used specific-lot selection where FIFO was applied.",
            gl_delta
        )
    } else {
        "No FIFO-vs-specific-lot signal.".to_string()
    };
    if boundary.partial_replacement_sale_count > 0 {
        lot_method_reason.push_str(&format!(
            " Partial replacement patterns detected on {} sale(s). Unmatched replacement quantity: {} share-equivalent.",
            boundary.partial_replacement_sale_count,
            boundary.partial_replacement_unmatched_quantity,
        ));
    }

    // Supplied split/rename signals, plus symbol spellings that only one side
    // reports and that look like renamed variants of the other side's.
    let app_symbols: BTreeSet<&String> = by_symbol
        .iter()
        .filter(|b| !b.app_gain_loss.is_zero() && b.broker_gain_loss.is_zero())
        .map(|b| &b.key)
        .collect();
    let broker_symbols: BTreeSet<&String> = by_symbol
        .iter()
        .filter(|b| b.app_gain_loss.is_zero() && !b.broker_gain_loss.is_zero())
        .map(|b| &b.key)
        .collect();
    let mut rename_suspects: Vec<String> = Vec::new();
    for a in &app_symbols {
        for b in &broker_symbols {
            if a != b && (a.starts_with(b.as_str()) || b.starts_with(a.as_str())) {
                rename_suspects.push(format!("{}~{}", a, b));
            }
        }
    }
    let corp_flag = !signals.is_empty() || !rename_suspects.is_empty();
    let mut corp_evidence: Vec<String> =
        signals.iter().map(|s| s.symbol.trim().to_ascii_uppercase()).collect();
    corp_evidence.extend(rename_suspects.iter().cloned());
    let corp_reason = if !signals.is_empty() {
        format!("{} corporate action signal(s) supplied for the period.", signals.len())
    } else if !rename_suspects.is_empty() {
        format!("Symbol spellings suggest renames: {}.", rename_suspects.join(", "))
    } else {
        "No corporate action signals.".to_string()
    };

    vec![
        ChecklistItem {
            key: "missing_boundary_data".to_string(),
            flag: boundary_flag,
            reason: boundary_reason,
            signal_count: boundary_sales.len(),
            evidence: boundary_sales,
        },
        ChecklistItem {
            key: "cross_account_replacements_likely".to_string(),
            flag: cross_flag,
            reason: if cross_flag {
                format!(
                    "{} loss sale(s) matched replacement buys in another account; same-account broker reporting will not reflect them.",
                    cross_evidence.len()
                )
            } else {
                "No cross-account replacement matches.".to_string()
            },
            signal_count: cross_evidence.len(),
            evidence: cross_evidence,
        },
        ChecklistItem {
            key: "options_replacements_likely".to_string(),
            flag: option_flag,
            reason: if option_flag {
                format!(
                    "{} loss sale(s) matched option replacement acquisitions brokers rarely pair with stock sales.",
                    option_evidence.len()
                )
            } else {
                "No option replacement matches.".to_string()
            },
            signal_count: option_evidence.len(),
            evidence: option_evidence,
        },
        ChecklistItem {
            key: "lot_method_mismatch".to_string(),
            flag: lot_method_flag,
            reason: lot_method_reason,
            signal_count: boundary.partial_replacement_sale_count,
            evidence: partial_evidence,
        },
        ChecklistItem {
            key: "corporate_actions_present".to_string(),
            flag: corp_flag,
            reason: corp_reason,
            signal_count: signals.len() + rename_suspects.len(),
            evidence: corp_evidence,
        },
    ]
}
