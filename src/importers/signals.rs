use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{CorporateActionSignal, Warning, WarningKind};
use super::require_headers;

const REQUIRED_HEADERS: [&str; 3] = ["symbol", "effective_date", "kind"];

/// Parse the optional corporate-action signal file (splits, reverse splits,
/// symbol changes). Signals only inform the reconciliation checklist; the
/// engine never rewrites lots from them.
pub fn import_signals<P: AsRef<Path>>(
    file_path: P,
) -> Result<(Vec<CorporateActionSignal>, Vec<Warning>)> {
    let path = file_path.as_ref();
    info!("Importing corporate action signals from {:?}", path);

    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open signal file {:?}", path))?;
    require_headers(
        reader.headers().context("Failed to read signal file headers")?,
        &REQUIRED_HEADERS,
    )?;

    let mut signals = Vec::new();
    let mut warnings = Vec::new();
    for (idx, result) in reader.deserialize::<CorporateActionSignal>().enumerate() {
        match result {
            Ok(signal) => signals.push(signal),
            Err(e) => {
                let row_num = idx + 2;
                warn!("Skipping signal row {}: {}", row_num, e);
                warnings.push(Warning::new(
                    WarningKind::Ingestion,
                    format!("signal row {}: {}", row_num, e),
                ));
            }
        }
    }

    info!(
        "Imported {} signals ({} rows skipped)",
        signals.len(),
        warnings.len()
    );
    Ok((signals, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CorporateActionKind;
    use chrono::NaiveDate;
    use std::fs;

    #[test]
    fn test_import_signals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.csv");
        fs::write(
            &path,
            "symbol,effective_date,kind,detail\nXYZ,2024-05-01,SPLIT,2:1\nABC,2024-07-15,SYMBOL_CHANGE,\n",
        )
        .unwrap();
        let (signals, warnings) = import_signals(&path).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].kind, CorporateActionKind::Split);
        assert_eq!(signals[0].detail.as_deref(), Some("2:1"));
        assert_eq!(
            signals[1].effective_date,
            NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
        );
        assert!(signals[1].detail.is_none());
    }

    #[test]
    fn test_unknown_kind_skips_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.csv");
        fs::write(
            &path,
            "symbol,effective_date,kind,detail\nXYZ,2024-05-01,MERGER,\n",
        )
        .unwrap();
        let (signals, warnings) = import_signals(&path).unwrap();

        assert!(signals.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Ingestion);
    }
}
