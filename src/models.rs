use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account tax treatment categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Taxable,
    TradIra,
    RothIra,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Taxable => "TAXABLE",
            AccountType::TradIra => "TRAD_IRA",
            AccountType::RothIra => "ROTH_IRA",
        }
    }

    pub fn is_taxable(&self) -> bool {
        matches!(self, AccountType::Taxable)
    }

    /// IRA/Roth lots never record a taxable basis step-up.
    pub fn is_ira(&self) -> bool {
        matches!(self, AccountType::TradIra | AccountType::RothIra)
    }
}

impl FromStr for AccountType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TAXABLE" => Ok(AccountType::Taxable),
            "TRAD_IRA" | "TRADITIONAL_IRA" | "IRA" => Ok(AccountType::TradIra),
            "ROTH_IRA" | "ROTH" => Ok(AccountType::RothIra),
            _ => Err(()),
        }
    }
}

/// Instrument categories supported by the lot engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentType {
    Stock,
    Option,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Stock => "STOCK",
            InstrumentType::Option => "OPTION",
        }
    }
}

impl FromStr for InstrumentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" | "EQUITY" => Ok(InstrumentType::Stock),
            "OPTION" => Ok(InstrumentType::Option),
            _ => Err(()),
        }
    }
}

/// Trade side, including option open/close variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
    Bto,
    Sto,
    Btc,
    Stc,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
            TradeSide::Bto => "BTO",
            TradeSide::Sto => "STO",
            TradeSide::Btc => "BTC",
            TradeSide::Stc => "STC",
        }
    }
}

impl FromStr for TradeSide {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            "BTO" | "BUY_TO_OPEN" => Ok(TradeSide::Bto),
            "STO" | "SELL_TO_OPEN" => Ok(TradeSide::Sto),
            "BTC" | "BUY_TO_CLOSE" => Ok(TradeSide::Btc),
            "STC" | "SELL_TO_CLOSE" => Ok(TradeSide::Stc),
            _ => Err(()),
        }
    }
}

/// Position direction of a lot pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

/// Option right (call or put)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionRight {
    #[serde(rename = "C")]
    Call,
    #[serde(rename = "P")]
    Put,
}

impl OptionRight {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionRight::Call => "C",
            OptionRight::Put => "P",
        }
    }
}

impl FromStr for OptionRight {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Ok(OptionRight::Call),
            "P" | "PUT" => Ok(OptionRight::Put),
            _ => Err(()),
        }
    }
}

/// Contract identity: a plain ticker for stocks, the full contract terms for
/// options. Pool keys and wash-sale identity checks are built on this type,
/// so it is fully ordered and hashable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractSpec {
    Stock {
        symbol: String,
    },
    Option {
        underlying: String,
        expiration: NaiveDate,
        strike: Decimal,
        right: OptionRight,
    },
}

impl ContractSpec {
    pub fn stock(symbol: &str) -> Self {
        ContractSpec::Stock {
            symbol: symbol.trim().to_ascii_uppercase(),
        }
    }

    pub fn option(underlying: &str, expiration: NaiveDate, strike: Decimal, right: OptionRight) -> Self {
        ContractSpec::Option {
            underlying: underlying.trim().to_ascii_uppercase(),
            expiration,
            strike,
            right,
        }
    }

    /// Ticker for stocks, underlying ticker for options.
    pub fn underlying(&self) -> &str {
        match self {
            ContractSpec::Stock { symbol } => symbol,
            ContractSpec::Option { underlying, .. } => underlying,
        }
    }

    pub fn instrument_type(&self) -> InstrumentType {
        match self {
            ContractSpec::Stock { .. } => InstrumentType::Stock,
            ContractSpec::Option { .. } => InstrumentType::Option,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, ContractSpec::Option { .. })
    }
}

impl fmt::Display for ContractSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractSpec::Stock { symbol } => write!(f, "{}", symbol),
            ContractSpec::Option {
                underlying,
                expiration,
                strike,
                right,
            } => write!(f, "{}|{}|{}|{}", underlying, expiration, strike, right.as_str()),
        }
    }
}

/// Normalized trade record, produced by an external ingestion collaborator.
/// The engine treats it as read-only; `seq` is the load-order sequence used
/// as the deterministic tie-break wherever timestamps collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub seq: u64,
    pub executed_at: NaiveDateTime,
    pub account_id: String,
    pub account_type: AccountType,
    pub contract: ContractSpec,
    pub cusip: Option<String>,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fees: Decimal,
    pub net_amount: Decimal,
    pub multiplier: u32,
}

impl Trade {
    pub fn executed_on(&self) -> NaiveDate {
        self.executed_at.date()
    }

    /// Direction of the pool this trade opens, if it is an opening trade.
    pub fn direction_opened(&self) -> Option<Direction> {
        match (self.contract.instrument_type(), self.side) {
            (InstrumentType::Stock, TradeSide::Buy) => Some(Direction::Long),
            (InstrumentType::Option, TradeSide::Bto) => Some(Direction::Long),
            (InstrumentType::Option, TradeSide::Sto) => Some(Direction::Short),
            _ => None,
        }
    }

    /// Direction of the pool this trade closes, if it is a closing trade.
    pub fn direction_closed(&self) -> Option<Direction> {
        match (self.contract.instrument_type(), self.side) {
            (InstrumentType::Stock, TradeSide::Sell) => Some(Direction::Long),
            (InstrumentType::Option, TradeSide::Stc) => Some(Direction::Long),
            (InstrumentType::Option, TradeSide::Btc) => Some(Direction::Short),
            _ => None,
        }
    }

    /// Options trade with an unset multiplier mean standard 100-share contracts.
    pub fn effective_multiplier(&self) -> Decimal {
        if self.contract.is_option() && self.multiplier <= 1 {
            Decimal::from(100u32)
        } else {
            Decimal::from(self.multiplier.max(1))
        }
    }

    /// Wash-sale replacement candidates: stock buys and buy-to-open calls.
    pub fn is_replacement_candidate(&self) -> bool {
        match &self.contract {
            ContractSpec::Stock { .. } => self.side == TradeSide::Buy,
            ContractSpec::Option { right, .. } => {
                self.side == TradeSide::Bto && *right == OptionRight::Call
            }
        }
    }

    /// Contract identity for replacement detection: CUSIP equality when both
    /// records carry one, underlying ticker equality otherwise.
    pub fn same_identity(&self, other: &Trade) -> bool {
        if let (Some(a), Some(b)) = (&self.cusip, &other.cusip) {
            return a.eq_ignore_ascii_case(b);
        }
        self.contract.underlying() == other.contract.underlying()
    }
}

/// Wash-sale scope: same-account (typical broker 1099-B) or full
/// cross-account including IRA-triggered permanent disallowance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WashSaleMode {
    BrokerStyle,
    IrsStyle,
}

impl WashSaleMode {
    pub const ALL: [WashSaleMode; 2] = [WashSaleMode::BrokerStyle, WashSaleMode::IrsStyle];

    pub fn as_str(&self) -> &'static str {
        match self {
            WashSaleMode::BrokerStyle => "BROKER_STYLE",
            WashSaleMode::IrsStyle => "IRS_STYLE",
        }
    }
}

impl FromStr for WashSaleMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BROKER" | "BROKER_STYLE" => Ok(WashSaleMode::BrokerStyle),
            "IRS" | "IRS_STYLE" => Ok(WashSaleMode::IrsStyle),
            _ => Err(()),
        }
    }
}

/// Holding-period classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Term {
    Short,
    Long,
}

impl Term {
    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Short => "SHORT",
            Term::Long => "LONG",
        }
    }
}

impl FromStr for Term {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHORT" | "ST" | "SHORT_TERM" => Ok(Term::Short),
            "LONG" | "LT" | "LONG_TERM" => Ok(Term::Long),
            _ => Err(()),
        }
    }
}

/// Non-fatal data-quality condition classes carried alongside every report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    Ingestion,
    Matching,
    ReconciliationInput,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::Ingestion => "INGESTION",
            WarningKind::Matching => "MATCHING",
            WarningKind::ReconciliationInput => "RECONCILIATION_INPUT",
        }
    }
}

/// Structured warning accumulated during a batch run. The report itself is
/// never altered to mask one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub trade_id: Option<String>,
    pub account_id: Option<String>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Warning {
            kind,
            message: message.into(),
            trade_id: None,
            account_id: None,
        }
    }

    pub fn for_trade(kind: WarningKind, message: impl Into<String>, trade: &Trade) -> Self {
        Warning {
            kind,
            message: message.into(),
            trade_id: Some(trade.trade_id.clone()),
            account_id: Some(trade.account_id.clone()),
        }
    }
}

/// Broker-reported totals row, one per disposition or symbol aggregate.
/// Arrives normalized from a parsed export or manual entry; symbol, sale date
/// and gain/loss are required for diffing, the rest is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerRow {
    pub symbol: String,
    pub sale_date: Option<NaiveDate>,
    pub term: Option<Term>,
    pub proceeds: Option<Decimal>,
    pub cost_basis: Option<Decimal>,
    pub gain_loss: Option<Decimal>,
    pub wash_sale_disallowed: Option<Decimal>,
}

impl BrokerRow {
    /// Rows missing a required field are excluded from diffing.
    pub fn is_diffable(&self) -> bool {
        !self.symbol.trim().is_empty() && self.sale_date.is_some() && self.gain_loss.is_some()
    }
}

/// Externally detected corporate action, consumed as a reconciliation signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorporateActionKind {
    Split,
    ReverseSplit,
    SymbolChange,
}

impl CorporateActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorporateActionKind::Split => "SPLIT",
            CorporateActionKind::ReverseSplit => "REVERSE_SPLIT",
            CorporateActionKind::SymbolChange => "SYMBOL_CHANGE",
        }
    }
}

impl FromStr for CorporateActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPLIT" => Ok(CorporateActionKind::Split),
            "REVERSE_SPLIT" => Ok(CorporateActionKind::ReverseSplit),
            "SYMBOL_CHANGE" | "RENAME" => Ok(CorporateActionKind::SymbolChange),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporateActionSignal {
    pub symbol: String,
    pub effective_date: NaiveDate,
    pub kind: CorporateActionKind,
    pub detail: Option<String>,
}
