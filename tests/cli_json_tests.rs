use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tempfile::TempDir;

use cli_helpers::{
    cross_account_rows, full_wash_rows, partial_wash_rows, run_cmd_json, write_broker,
    write_trades,
};

fn decimal_from_value(value: &Value) -> Result<Decimal> {
    if let Some(s) = value.as_str() {
        return Decimal::from_str_exact(s).context("invalid decimal string");
    }
    if let Some(f) = value.as_f64() {
        return Decimal::try_from(f).context("invalid decimal number");
    }
    Err(anyhow::anyhow!("expected decimal value"))
}

fn checklist_item<'a>(report: &'a Value, key: &str) -> Result<&'a Value> {
    report
        .get("checklist")
        .and_then(|v| v.as_array())
        .context("checklist missing")?
        .iter()
        .find(|item| item.get("key").and_then(|k| k.as_str()) == Some(key))
        .context("checklist item not found")
}

fn metric_delta(report: &Value, name: &str) -> Result<Decimal> {
    let metric = report
        .get("totals")
        .and_then(|v| v.as_array())
        .context("totals missing")?
        .iter()
        .find(|m| m.get("metric").and_then(|k| k.as_str()) == Some(name))
        .context("metric not found")?;
    decimal_from_value(&metric["delta"])
}

#[test]
fn test_report_json_carries_exact_summary() -> Result<()> {
    let dir = TempDir::new()?;
    let trades = write_trades(&dir, &partial_wash_rows());

    let report = run_cmd_json(&["report", trades.to_str().unwrap(), "--year", "2024"])?;

    assert_eq!(report["mode"], "IRS_STYLE");
    assert_eq!(report["rows"][0]["code"], "W");
    assert_eq!(decimal_from_value(&report["rows"][0]["gain_loss"])?, dec!(-120.00));
    assert_eq!(
        decimal_from_value(&report["summary"]["wash_sale_disallowed_irs"])?,
        dec!(80.00)
    );
    assert_eq!(
        decimal_from_value(&report["summary"]["total_gain_loss"])?,
        dec!(-120.00)
    );
    Ok(())
}

#[test]
fn test_reconcile_json_isolates_the_cross_account_delta() -> Result<()> {
    let dir = TempDir::new()?;
    let trades = write_trades(&dir, &cross_account_rows());
    let broker = write_broker(
        &dir,
        &["XYZ,2024-03-01,SHORT,1000.00,6000.00,-4800.00,200.00".to_string()],
    );

    let result = run_cmd_json(&[
        "reconcile",
        trades.to_str().unwrap(),
        broker.to_str().unwrap(),
        "--year",
        "2024",
        "--mode",
        "broker",
    ])?;

    assert_eq!(result["mode"], "BROKER_STYLE");
    assert_eq!(result["health"]["in_sync"], false);
    assert_eq!(
        decimal_from_value(&result["health"]["max_abs_delta"])?,
        dec!(200.00)
    );
    assert_eq!(metric_delta(&result, "total_gain_loss")?, dec!(-200.00));
    assert_eq!(result["by_symbol"][0]["key"], "XYZ");

    let cross = checklist_item(&result, "cross_account_replacements_likely")?;
    assert_eq!(cross["flag"], true);
    assert_eq!(cross["evidence"][0], "s1");

    let lot_method = checklist_item(&result, "lot_method_mismatch")?;
    assert_eq!(lot_method["flag"], false);
    Ok(())
}

#[test]
fn test_check_json_reports_replay_and_conservation() -> Result<()> {
    let dir = TempDir::new()?;
    let trades = write_trades(&dir, &full_wash_rows());

    let check = run_cmd_json(&["check", trades.to_str().unwrap(), "--year", "2024"])?;

    assert_eq!(check["replay_ok"], true);
    assert_eq!(check["conservation_ok"], true);
    assert_eq!(check["trades"], 3);
    let fingerprint = check["fingerprint"].as_str().context("fingerprint missing")?;
    assert_eq!(fingerprint.len(), 64);
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(check["warnings"].as_array().map(|w| w.len()), Some(0));
    Ok(())
}

#[test]
fn test_lots_json_lists_adjusted_open_lots() -> Result<()> {
    let dir = TempDir::new()?;
    let trades = write_trades(&dir, &full_wash_rows());

    let lots = run_cmd_json(&[
        "lots",
        trades.to_str().unwrap(),
        "--as-of",
        "2024-12-31",
    ])?;

    let rows = lots.as_array().context("expected a JSON array")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["account_id"], "taxable-1");
    assert_eq!(decimal_from_value(&rows[0]["open_quantity"])?, dec!(100));
    assert_eq!(decimal_from_value(&rows[0]["adjusted_basis"])?, dec!(1050.00));
    Ok(())
}
