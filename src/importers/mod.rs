// Import module - normalized trade, broker-row and signal CSV adapters

pub mod broker;
pub mod signals;
pub mod trades;

use anyhow::{anyhow, Result};

pub use broker::import_broker_rows;
pub use signals::import_signals;
pub use trades::import_trades;

/// Fail-fast header check shared by the adapters. Rows are forgiving, the
/// schema itself is not.
pub(crate) fn require_headers(headers: &csv::StringRecord, required: &[&str]) -> Result<()> {
    for name in required {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            return Err(anyhow!("missing required column '{}'", name));
        }
    }
    Ok(())
}
