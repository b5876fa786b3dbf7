use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{BrokerRow, Warning, WarningKind};
use super::require_headers;

const REQUIRED_HEADERS: [&str; 3] = ["symbol", "sale_date", "gain_loss"];

/// Parse broker-reported totals rows. Blank fields are preserved as absent
/// values (the reconciler decides later whether a row is diffable); a row
/// that fails to parse at all is skipped with a warning.
pub fn import_broker_rows<P: AsRef<Path>>(file_path: P) -> Result<(Vec<BrokerRow>, Vec<Warning>)> {
    let path = file_path.as_ref();
    info!("Importing broker rows from {:?}", path);

    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open broker file {:?}", path))?;
    require_headers(
        reader.headers().context("Failed to read broker file headers")?,
        &REQUIRED_HEADERS,
    )?;

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for (idx, result) in reader.deserialize::<BrokerRow>().enumerate() {
        let row_num = idx + 2;
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!("Skipping broker row {}: {}", row_num, e);
                warnings.push(Warning::new(
                    WarningKind::ReconciliationInput,
                    format!("broker row {}: {}", row_num, anyhow!(e)),
                ));
            }
        }
    }

    info!(
        "Imported {} broker rows ({} rows skipped)",
        rows.len(),
        warnings.len()
    );
    Ok((rows, warnings))
}
