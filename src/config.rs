//! Engine configuration
//!
//! Loaded from an optional TOML file; CLI flags override file values. The
//! long-term threshold is the documented extension point for day-count
//! conventions stricter than the default ">365 days" heuristic.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::models::WashSaleMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Replacement scan window on each side of a loss sale, in days.
    pub wash_sale_window_days: i64,
    /// Holding spans strictly greater than this count in days are long-term.
    pub long_term_holding_days: i64,
    /// Mode used when the CLI does not specify one.
    pub default_mode: String,
    /// Decimal places for presentation rounding.
    pub rounding_dp: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            wash_sale_window_days: 30,
            long_term_holding_days: 365,
            default_mode: "irs".to_string(),
            rounding_dp: 2,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when no file is given; a named file must parse.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.wash_sale_window_days < 0 {
            return Err(EngineError::Config(format!(
                "wash_sale_window_days must be non-negative, got {}",
                self.wash_sale_window_days
            ))
            .into());
        }
        if self.long_term_holding_days <= 0 {
            return Err(EngineError::Config(format!(
                "long_term_holding_days must be positive, got {}",
                self.long_term_holding_days
            ))
            .into());
        }
        if self.rounding_dp > 8 {
            return Err(EngineError::Config(format!(
                "rounding_dp must be at most 8, got {}",
                self.rounding_dp
            ))
            .into());
        }
        self.mode()?;
        Ok(())
    }

    pub fn mode(&self) -> Result<WashSaleMode> {
        WashSaleMode::from_str(&self.default_mode).map_err(|_| {
            EngineError::Config(format!(
                "unknown wash-sale mode '{}', expected 'broker' or 'irs'",
                self.default_mode
            ))
            .into()
        })
    }
}
