use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{
    AccountType, ContractSpec, InstrumentType, OptionRight, Trade, TradeSide, Warning,
    WarningKind,
};
use super::require_headers;

const REQUIRED_HEADERS: [&str; 9] = [
    "trade_id",
    "account_id",
    "account_type",
    "executed_at",
    "symbol",
    "instrument",
    "side",
    "quantity",
    "price",
];

/// One row of the normalized trade schema. Enum fields use the wire
/// spellings (`TAXABLE`, `BTO`, `C`, ...); optional columns may be blank or
/// absent entirely.
#[derive(Debug, Deserialize)]
struct RawTradeRecord {
    trade_id: String,
    account_id: String,
    account_type: AccountType,
    executed_at: String,
    symbol: String,
    instrument: InstrumentType,
    side: TradeSide,
    quantity: Decimal,
    price: Decimal,
    #[serde(default)]
    fees: Option<Decimal>,
    #[serde(default)]
    multiplier: Option<u32>,
    #[serde(default)]
    cusip: Option<String>,
    #[serde(default)]
    expiry: Option<NaiveDate>,
    #[serde(default)]
    strike: Option<Decimal>,
    #[serde(default)]
    right: Option<OptionRight>,
    #[serde(default)]
    net_amount: Option<Decimal>,
}

/// Parse the normalized trade CSV. Rows that fail to parse become ingestion
/// warnings and the import continues; a missing required column fails the
/// whole file. Row order assigns `seq`, the tiebreaker for same-timestamp
/// trades.
pub fn import_trades<P: AsRef<Path>>(file_path: P) -> Result<(Vec<Trade>, Vec<Warning>)> {
    let path = file_path.as_ref();
    info!("Importing trades from {:?}", path);

    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open trade file {:?}", path))?;
    require_headers(
        reader.headers().context("Failed to read trade file headers")?,
        &REQUIRED_HEADERS,
    )?;

    let mut trades = Vec::new();
    let mut warnings = Vec::new();
    for (idx, result) in reader.deserialize::<RawTradeRecord>().enumerate() {
        let row_num = idx + 2; // line 1 is the header
        let parsed = result
            .map_err(|e| anyhow!(e))
            .and_then(|raw| raw.into_trade(idx as u64 + 1));
        match parsed {
            Ok(trade) => trades.push(trade),
            Err(e) => {
                warn!("Skipping trade row {}: {}", row_num, e);
                warnings.push(Warning::new(
                    WarningKind::Ingestion,
                    format!("trade row {}: {}", row_num, e),
                ));
            }
        }
    }

    info!(
        "Imported {} trades ({} rows skipped)",
        trades.len(),
        warnings.len()
    );
    Ok((trades, warnings))
}

impl RawTradeRecord {
    fn into_trade(self, seq: u64) -> Result<Trade> {
        if self.trade_id.trim().is_empty() {
            return Err(anyhow!("empty trade id"));
        }
        if self.account_id.trim().is_empty() {
            return Err(anyhow!("empty account id"));
        }
        if self.symbol.trim().is_empty() {
            return Err(anyhow!("empty symbol"));
        }

        let contract = match self.instrument {
            InstrumentType::Stock => ContractSpec::stock(&self.symbol),
            InstrumentType::Option => match (self.expiry, self.strike, self.right) {
                (Some(expiry), Some(strike), Some(right)) => {
                    ContractSpec::option(&self.symbol, expiry, strike, right)
                }
                _ => return Err(anyhow!("option rows need expiry, strike and right")),
            },
        };

        let mut trade = Trade {
            trade_id: self.trade_id.trim().to_string(),
            seq,
            executed_at: parse_timestamp(&self.executed_at)?,
            account_id: self.account_id.trim().to_string(),
            account_type: self.account_type,
            contract,
            cusip: self.cusip.and_then(|c| {
                let c = c.trim().to_ascii_uppercase();
                if c.is_empty() {
                    None
                } else {
                    Some(c)
                }
            }),
            side: self.side,
            quantity: self.quantity,
            price: self.price,
            fees: self.fees.unwrap_or_default(),
            net_amount: Decimal::ZERO,
            multiplier: self.multiplier.unwrap_or(1),
        };
        // Signed cash flow when the file does not carry one: opens and
        // buy-backs pay, sales and short opens receive
        trade.net_amount = match self.net_amount {
            Some(net) => net,
            None => {
                let gross = trade.quantity * trade.price * trade.effective_multiplier();
                match trade.side {
                    TradeSide::Buy | TradeSide::Bto | TradeSide::Btc => -gross - trade.fees,
                    TradeSide::Sell | TradeSide::Sto | TradeSide::Stc => gross - trade.fees,
                }
            }
        };
        Ok(trade)
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("invalid timestamp: {}", text));
    }
    Err(anyhow!("could not parse timestamp: {}", text))
}
