//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use chrono::NaiveDate;
use colored::Colorize;
use itertools::Itertools;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::tax::reconcile::ReconciliationReport;
use crate::tax::report::{OpenLotRow, TaxYearReport};
use crate::utils::{format_currency, format_quantity};

fn json_or_error<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

fn signed_money(value: Decimal) -> String {
    let text = format_currency(value);
    if value < Decimal::ZERO {
        text.red().to_string()
    } else {
        text.green().to_string()
    }
}

fn delta_money(value: Decimal) -> String {
    let text = format_currency(value);
    if value.is_zero() {
        text
    } else {
        text.red().to_string()
    }
}

/// Format a tax-year report for JSON output
pub fn format_report_json(report: &TaxYearReport) -> String {
    json_or_error(report)
}

/// Format a tax-year report for terminal table output
pub fn format_report_table(report: &TaxYearReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} Tax-Year Report {} ({})\n\n",
        "📊".cyan().bold(),
        report.year,
        report.mode.as_str()
    ));

    if report.rows.is_empty() {
        output.push_str(&format!(
            "{} No taxable realizations in {}\n",
            "ℹ".blue().bold(),
            report.year
        ));
    } else {
        #[derive(Tabled)]
        struct ReportTableRow {
            #[tabled(rename = "Description")]
            description: String,
            #[tabled(rename = "Acquired")]
            acquired: String,
            #[tabled(rename = "Sold")]
            sold: String,
            #[tabled(rename = "Proceeds")]
            proceeds: String,
            #[tabled(rename = "Basis")]
            basis: String,
            #[tabled(rename = "Code")]
            code: String,
            #[tabled(rename = "Adjustment")]
            adjustment: String,
            #[tabled(rename = "Gain/Loss")]
            gain_loss: String,
            #[tabled(rename = "Term")]
            term: String,
        }

        let rows: Vec<ReportTableRow> = report
            .rows
            .iter()
            .map(|r| ReportTableRow {
                description: r.description.clone(),
                acquired: r.date_acquired.to_string(),
                sold: r.date_sold.to_string(),
                proceeds: format_currency(r.proceeds),
                basis: format_currency(r.basis),
                code: r.code.clone(),
                adjustment: format_currency(r.adjustment_amount),
                gain_loss: signed_money(r.gain_loss),
                term: r.term.as_str().to_string(),
            })
            .collect();

        let mut table = Table::new(&rows);
        table.with(Style::rounded());
        table.modify(Columns::new(3..=4), Alignment::right());
        table.modify(Columns::new(6..=7), Alignment::right());
        output.push_str(&table.to_string());
        output.push('\n');
    }

    let s = &report.summary;
    output.push_str(&format!("\n{} Summary", "━".repeat(72).bright_black()));
    output.push_str(&format!("\n{:<28} {}", "Rows:".bold(), s.row_count));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Proceeds:".bold(),
        format_currency(s.total_proceeds)
    ));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Cost Basis:".bold(),
        format_currency(s.total_cost_basis)
    ));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Short-Term Gain/Loss:".bold(),
        signed_money(s.short_term_gain_loss)
    ));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Long-Term Gain/Loss:".bold(),
        signed_money(s.long_term_gain_loss)
    ));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Total Gain/Loss:".bold(),
        signed_money(s.total_gain_loss)
    ));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Wash Disallowed (broker):".bold(),
        format_currency(s.wash_sale_disallowed_broker)
    ));
    output.push_str(&format!(
        "\n{:<28} {}",
        "Wash Disallowed (IRS):".bold(),
        format_currency(s.wash_sale_disallowed_irs)
    ));
    output.push_str(&format!(
        "\n{:<28} {}\n",
        "Mode Difference:".bold(),
        format_currency(s.wash_sale_mode_difference)
    ));

    if !report.open_lots.is_empty() {
        output.push_str(&format!(
            "\n{} Open Lots at Year End\n\n",
            "📦".cyan().bold()
        ));
        output.push_str(&open_lots_table(&report.open_lots));
        output.push('\n');
    }

    output
}

/// Format a reconciliation result for JSON output
pub fn format_reconciliation_json(result: &ReconciliationReport) -> String {
    json_or_error(result)
}

/// Format a reconciliation result for terminal output
pub fn format_reconciliation_table(result: &ReconciliationReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} Reconciliation {} ({})\n\n",
        "🔍".cyan().bold(),
        result.year,
        result.mode.as_str()
    ));

    if result.health.in_sync {
        output.push_str(&format!(
            "{} All totals match broker-reported values\n",
            "✓".green().bold()
        ));
    } else {
        output.push_str(&format!(
            "{} {} metric(s) differ; largest delta {}\n",
            "✗".red().bold(),
            result.health.mismatched_metrics,
            format_currency(result.health.max_abs_delta)
        ));
    }
    if result.excluded_broker_rows > 0 {
        output.push_str(&format!(
            "{} {} broker row(s) excluded from diffing (missing symbol, sale date or gain/loss)\n",
            "ℹ".blue().bold(),
            result.excluded_broker_rows
        ));
    }

    #[derive(Tabled)]
    struct MetricRow {
        #[tabled(rename = "Metric")]
        metric: String,
        #[tabled(rename = "App")]
        app: String,
        #[tabled(rename = "Broker")]
        broker: String,
        #[tabled(rename = "Delta")]
        delta: String,
    }
    let metric_rows: Vec<MetricRow> = result
        .totals
        .iter()
        .map(|m| MetricRow {
            metric: m.metric.clone(),
            app: format_currency(m.app_value),
            broker: format_currency(m.broker_value),
            delta: delta_money(m.delta),
        })
        .collect();
    let mut table = Table::new(&metric_rows);
    table.with(Style::rounded());
    table.modify(Columns::new(1..), Alignment::right());
    output.push('\n');
    output.push_str(&table.to_string());
    output.push('\n');

    let symbol_rows: Vec<&crate::tax::reconcile::BucketDelta> = result
        .by_symbol
        .iter()
        .filter(|b| !b.gain_loss_delta.is_zero() || !b.wash_disallowed_delta.is_zero())
        .take(10)
        .collect();
    if !symbol_rows.is_empty() {
        #[derive(Tabled)]
        struct SymbolRow {
            #[tabled(rename = "Symbol")]
            symbol: String,
            #[tabled(rename = "App G/L")]
            app: String,
            #[tabled(rename = "Broker G/L")]
            broker: String,
            #[tabled(rename = "G/L Delta")]
            delta: String,
            #[tabled(rename = "Wash Delta")]
            wash_delta: String,
        }
        let rows: Vec<SymbolRow> = symbol_rows
            .iter()
            .map(|b| SymbolRow {
                symbol: b.key.clone(),
                app: format_currency(b.app_gain_loss),
                broker: format_currency(b.broker_gain_loss),
                delta: delta_money(b.gain_loss_delta),
                wash_delta: delta_money(b.wash_disallowed_delta),
            })
            .collect();
        output.push_str(&format!(
            "\n{} Symbols driving the difference\n\n",
            "📊".cyan().bold()
        ));
        let mut table = Table::new(&rows);
        table.with(Style::rounded());
        table.modify(Columns::new(1..), Alignment::right());
        output.push_str(&table.to_string());
        output.push('\n');
    }

    output.push_str(&format!("\n{} Checklist\n", "━".repeat(72).bright_black()));
    for item in &result.checklist {
        let marker = if item.flag {
            format!("⚑ {}", item.key).red().bold().to_string()
        } else {
            format!("✓ {}", item.key).green().to_string()
        };
        output.push_str(&format!("\n{}\n  {}\n", marker, item.reason));
        if item.flag && !item.evidence.is_empty() {
            let shown = item.evidence.iter().take(5).join(", ");
            let more = item.evidence.len().saturating_sub(5);
            if more > 0 {
                output.push_str(&format!("  evidence: {} (+{} more)\n", shown, more));
            } else {
                output.push_str(&format!("  evidence: {}\n", shown));
            }
        }
    }

    let b = &result.boundary;
    if b.partial_replacement_sale_count > 0
        || !b.disallowed_to_prior_year_replacements.is_zero()
        || !b.disallowed_to_next_year_replacements.is_zero()
    {
        output.push_str(&format!(
            "\n{} Year-boundary wash activity\n",
            "━".repeat(72).bright_black()
        ));
        output.push_str(&format!(
            "\n{:<38} {}",
            "Partial replacement sales:".bold(),
            b.partial_replacement_sale_count
        ));
        output.push_str(&format!(
            "\n{:<38} {}",
            "Unmatched replacement quantity:".bold(),
            format_quantity(b.partial_replacement_unmatched_quantity)
        ));
        output.push_str(&format!(
            "\n{:<38} {}",
            "Disallowed to prior-year buys:".bold(),
            format_currency(b.disallowed_to_prior_year_replacements)
        ));
        output.push_str(&format!(
            "\n{:<38} {}\n",
            "Disallowed to next-year buys:".bold(),
            format_currency(b.disallowed_to_next_year_replacements)
        ));
    }

    output
}

/// Format open lots for JSON output
pub fn format_open_lots_json(rows: &[OpenLotRow]) -> String {
    json_or_error(&rows)
}

/// Format open lots for terminal table output
pub fn format_open_lots_table(rows: &[OpenLotRow], as_of: NaiveDate) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n{} Open Lots as of {}\n\n",
        "📦".cyan().bold(),
        as_of
    ));
    output.push_str(&open_lots_table(rows));
    output.push('\n');
    output
}

fn open_lots_table(rows: &[OpenLotRow]) -> String {
    #[derive(Tabled)]
    struct LotRow {
        #[tabled(rename = "Account")]
        account: String,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Acquired")]
        acquired: String,
        #[tabled(rename = "Open Qty")]
        quantity: String,
        #[tabled(rename = "Adjusted Basis")]
        basis: String,
        #[tabled(rename = "Days Held")]
        days: String,
    }

    let rows: Vec<LotRow> = rows
        .iter()
        .map(|l| LotRow {
            account: l.account_id.clone(),
            description: l.description.clone(),
            acquired: l.date_acquired.to_string(),
            quantity: format_quantity(l.open_quantity),
            basis: format_currency(l.adjusted_basis),
            days: l.holding_days.to_string(),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    table.modify(Columns::new(3..), Alignment::right());
    table.to_string()
}

/// Format empty open-lots message
pub fn format_empty_lots(as_of: NaiveDate) -> String {
    format!(
        "{} No open lots as of {}\nImport trades first using: {} lots <trades.csv>\n",
        "ℹ".blue().bold(),
        as_of,
        "taxlot".bold()
    )
}
