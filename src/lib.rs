//! Taxlot - multi-account tax-lot and wash-sale engine
//!
//! This library provides FIFO lot matching across brokerage accounts,
//! wash-sale detection under broker-style and IRS-style replacement scopes,
//! tax-year reporting and reconciliation against broker-issued totals.

pub mod config;
pub mod error;
pub mod importers;
pub mod models;
pub mod tax;
pub mod utils;
