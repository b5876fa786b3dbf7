use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::models::{
    AccountType, ContractSpec, Direction, Trade, Warning, WarningKind, WashSaleMode,
};

/// Arena index of a lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LotId(pub usize);

/// Arena index of a realization event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);

/// Basis step-up appended to a replacement lot by the wash-sale pass.
/// Adjustments are append-only; the lot's own unit cost never changes.
#[derive(Debug, Clone)]
pub struct BasisAdjustment {
    pub loss_event: EventId,
    pub mode: WashSaleMode,
    pub quantity: Decimal,
    pub amount: Decimal,
    pub sale_date: NaiveDate,
}

/// A tax lot created by an opening trade.
///
/// `unit_cost_basis` is per unit with the contract multiplier and the
/// per-unit open fee folded in. For SHORT lots it holds the opening credit
/// per unit net of fees instead.
#[derive(Debug, Clone)]
pub struct Lot {
    pub id: LotId,
    pub account_id: String,
    pub account_type: AccountType,
    pub contract: ContractSpec,
    pub direction: Direction,
    pub acquired_at: NaiveDateTime,
    pub origin_trade: String,
    pub origin_seq: u64,
    pub quantity: Decimal,
    pub open_quantity: Decimal,
    pub unit_cost_basis: Decimal,
    pub multiplier: Decimal,
    pub adjustments: Vec<BasisAdjustment>,
}

impl Lot {
    pub fn acquired_on(&self) -> NaiveDate {
        self.acquired_at.date()
    }

    /// Total step-up recorded for a mode.
    pub fn adjustment_total(&self, mode: WashSaleMode) -> Decimal {
        self.adjustments
            .iter()
            .filter(|a| a.mode == mode)
            .map(|a| a.amount)
            .sum()
    }

    /// Basis of the still-open quantity including wash-sale step-ups.
    pub fn adjusted_open_basis(&self, mode: WashSaleMode) -> Decimal {
        self.open_quantity * self.unit_cost_basis + self.adjustment_total(mode)
    }

    pub fn holding_days_as_of(&self, date: NaiveDate) -> i64 {
        (date - self.acquired_on()).num_days().max(0)
    }
}

/// One consumed slice of a lot within a realization event
#[derive(Debug, Clone)]
pub struct LotMatch {
    pub lot: LotId,
    pub quantity: Decimal,
    pub acquired_at: NaiveDateTime,
    pub proceeds: Decimal,
    pub basis: Decimal,
    pub holding_days: i64,
}

/// Realization emitted by a closing trade, one per close, referencing every
/// consumed lot. Immutable once created; the wash-sale pass layers
/// adjustments on separately.
#[derive(Debug, Clone)]
pub struct RealizationEvent {
    pub id: EventId,
    pub close_trade: String,
    pub close_seq: u64,
    pub account_id: String,
    pub account_type: AccountType,
    pub contract: ContractSpec,
    pub cusip: Option<String>,
    pub direction: Direction,
    pub sold_at: NaiveDateTime,
    pub matches: Vec<LotMatch>,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    pub basis_at_close: Decimal,
    pub holding_days: i64,
}

impl RealizationEvent {
    pub fn sale_date(&self) -> NaiveDate {
        self.sold_at.date()
    }

    pub fn gain_loss(&self) -> Decimal {
        self.proceeds - self.basis_at_close
    }

    pub fn is_loss(&self) -> bool {
        self.proceeds < self.basis_at_close
    }
}

#[derive(Debug, Default)]
struct PoolState {
    /// FIFO queue of open lots, oldest first. Trades arrive in chronological
    /// order (ties broken by sequence id), so insertion order is FIFO order.
    open: Vec<LotId>,
    acquired_total: Decimal,
    closed_total: Decimal,
}

type PoolKey = (String, ContractSpec, Direction);

/// Open-lot ledger with FIFO matching per (account, contract, direction) key.
///
/// Owns the lot arena exclusively. The wash-sale pass may only append
/// [`BasisAdjustment`] entries through [`LotLedger::append_adjustment`].
/// Identical tickers in different accounts are independent pools.
#[derive(Debug, Default)]
pub struct LotLedger {
    lots: Vec<Lot>,
    events: Vec<RealizationEvent>,
    pools: BTreeMap<PoolKey, PoolState>,
}

impl LotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a trade to its pool. Opening trades create a lot; closing trades
    /// match FIFO and may emit an event and/or a clipping warning. Expects
    /// trades pre-sorted by `(executed_at, seq)` and pre-validated.
    pub fn process_trade(
        &mut self,
        trade: &Trade,
    ) -> Result<(Option<EventId>, Option<Warning>), EngineError> {
        if let Some(direction) = trade.direction_opened() {
            self.open(trade, direction);
            return Ok((None, None));
        }
        if let Some(direction) = trade.direction_closed() {
            return self.close(trade, direction);
        }
        // All six sides map to open or close for their instrument type, so a
        // validated trade never lands here.
        Err(EngineError::InvariantViolation {
            account_id: trade.account_id.clone(),
            detail: format!("trade {} has unroutable side", trade.trade_id),
        })
    }

    fn open(&mut self, trade: &Trade, direction: Direction) {
        let multiplier = trade.effective_multiplier();
        let fee_per_unit = if trade.quantity > Decimal::ZERO {
            trade.fees / trade.quantity
        } else {
            Decimal::ZERO
        };
        // SHORT opens are credits: the fee reduces the opening proceeds.
        let unit_cost_basis = match direction {
            Direction::Long => trade.price * multiplier + fee_per_unit,
            Direction::Short => trade.price * multiplier - fee_per_unit,
        };

        let id = LotId(self.lots.len());
        self.lots.push(Lot {
            id,
            account_id: trade.account_id.clone(),
            account_type: trade.account_type,
            contract: trade.contract.clone(),
            direction,
            acquired_at: trade.executed_at,
            origin_trade: trade.trade_id.clone(),
            origin_seq: trade.seq,
            quantity: trade.quantity,
            open_quantity: trade.quantity,
            unit_cost_basis,
            multiplier,
            adjustments: Vec::new(),
        });

        let pool = self.pools.entry(Self::key(trade, direction)).or_default();
        pool.open.push(id);
        pool.acquired_total += trade.quantity;
        debug!(
            account = %trade.account_id,
            contract = %trade.contract,
            qty = %trade.quantity,
            "opened lot"
        );
    }

    fn close(
        &mut self,
        trade: &Trade,
        direction: Direction,
    ) -> Result<(Option<EventId>, Option<Warning>), EngineError> {
        let key = Self::key(trade, direction);
        let close_fee_per_unit = if trade.quantity > Decimal::ZERO {
            trade.fees / trade.quantity
        } else {
            Decimal::ZERO
        };

        let mut remaining = trade.quantity;
        let mut matches: Vec<LotMatch> = Vec::new();

        if let Some(pool) = self.pools.get_mut(&key) {
            while remaining > Decimal::ZERO && !pool.open.is_empty() {
                let lot_id = pool.open[0];
                let lot = &mut self.lots[lot_id.0];
                let matched = remaining.min(lot.open_quantity);
                let fee_share = close_fee_per_unit * matched;

                let (proceeds, basis) = match direction {
                    Direction::Long => (
                        matched * trade.price * lot.multiplier - fee_share,
                        matched * lot.unit_cost_basis,
                    ),
                    Direction::Short => (
                        matched * lot.unit_cost_basis,
                        matched * trade.price * lot.multiplier + fee_share,
                    ),
                };

                lot.open_quantity -= matched;
                if lot.open_quantity < Decimal::ZERO {
                    return Err(EngineError::InvariantViolation {
                        account_id: trade.account_id.clone(),
                        detail: format!(
                            "negative open quantity on {} after close {}",
                            lot.contract, trade.trade_id
                        ),
                    });
                }

                matches.push(LotMatch {
                    lot: lot_id,
                    quantity: matched,
                    acquired_at: lot.acquired_at,
                    proceeds,
                    basis,
                    holding_days: (trade.executed_on() - lot.acquired_on()).num_days().max(0),
                });

                pool.closed_total += matched;
                remaining -= matched;
                if self.lots[lot_id.0].open_quantity.is_zero() {
                    pool.open.remove(0);
                }
            }
        }

        let warning = if remaining > Decimal::ZERO {
            let matched_qty = trade.quantity - remaining;
            warn!(
                account = %trade.account_id,
                contract = %trade.contract,
                shortfall = %remaining,
                "close quantity exceeds open lots, clipping"
            );
            Some(Warning::for_trade(
                WarningKind::Matching,
                format!(
                    "close of {} {} exceeds open quantity; matched {}, clipped {}",
                    trade.quantity, trade.contract, matched_qty, remaining
                ),
                trade,
            ))
        } else {
            None
        };

        if matches.is_empty() {
            return Ok((None, warning));
        }

        let quantity: Decimal = matches.iter().map(|m| m.quantity).sum();
        let proceeds: Decimal = matches.iter().map(|m| m.proceeds).sum();
        let basis_at_close: Decimal = matches.iter().map(|m| m.basis).sum();
        // Holding period runs from the earliest consumed lot.
        let holding_days = matches.iter().map(|m| m.holding_days).max().unwrap_or(0);

        let id = EventId(self.events.len());
        self.events.push(RealizationEvent {
            id,
            close_trade: trade.trade_id.clone(),
            close_seq: trade.seq,
            account_id: trade.account_id.clone(),
            account_type: trade.account_type,
            contract: trade.contract.clone(),
            cusip: trade.cusip.clone(),
            direction,
            sold_at: trade.executed_at,
            matches,
            quantity,
            proceeds,
            basis_at_close,
            holding_days,
        });
        Ok((Some(id), warning))
    }

    fn key(trade: &Trade, direction: Direction) -> PoolKey {
        (trade.account_id.clone(), trade.contract.clone(), direction)
    }

    /// Quantity conservation: for every pool, acquired == still open + closed.
    pub fn verify_conservation(&self) -> Result<(), EngineError> {
        for ((account_id, contract, _), pool) in &self.pools {
            let open_sum: Decimal = pool
                .open
                .iter()
                .map(|id| self.lots[id.0].open_quantity)
                .sum();
            if pool.acquired_total != open_sum + pool.closed_total {
                return Err(EngineError::InvariantViolation {
                    account_id: account_id.clone(),
                    detail: format!(
                        "conservation failure on {}: acquired {} != open {} + closed {}",
                        contract, pool.acquired_total, open_sum, pool.closed_total
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn lot(&self, id: LotId) -> &Lot {
        &self.lots[id.0]
    }

    pub fn event(&self, id: EventId) -> &RealizationEvent {
        &self.events[id.0]
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn events(&self) -> &[RealizationEvent] {
        &self.events
    }

    pub fn open_lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter().filter(|l| l.open_quantity > Decimal::ZERO)
    }

    /// The single write path granted to the wash-sale pass.
    pub fn append_adjustment(&mut self, lot: LotId, adjustment: BasisAdjustment) {
        self.lots[lot.0].adjustments.push(adjustment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionRight, TradeSide};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn trade(
        id: &str,
        seq: u64,
        day: u32,
        side: TradeSide,
        qty: Decimal,
        price: Decimal,
    ) -> Trade {
        Trade {
            trade_id: id.to_string(),
            seq,
            executed_at: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            account_id: "acct-1".to_string(),
            account_type: AccountType::Taxable,
            contract: ContractSpec::stock("XYZ"),
            cusip: None,
            side,
            quantity: qty,
            price,
            fees: Decimal::ZERO,
            net_amount: Decimal::ZERO,
            multiplier: 1,
        }
    }

    fn make_buy(id: &str, seq: u64, day: u32, qty: Decimal, price: Decimal) -> Trade {
        trade(id, seq, day, TradeSide::Buy, qty, price)
    }

    fn make_sell(id: &str, seq: u64, day: u32, qty: Decimal, price: Decimal) -> Trade {
        trade(id, seq, day, TradeSide::Sell, qty, price)
    }

    #[test]
    fn test_fifo_spans_multiple_lots() {
        let mut ledger = LotLedger::new();
        ledger.process_trade(&make_buy("b1", 1, 1, dec!(100), dec!(10))).unwrap();
        ledger.process_trade(&make_buy("b2", 2, 5, dec!(100), dec!(12))).unwrap();
        let (event, warning) = ledger
            .process_trade(&make_sell("s1", 3, 10, dec!(150), dec!(11)))
            .unwrap();

        assert!(warning.is_none());
        let event = ledger.event(event.unwrap());
        assert_eq!(event.matches.len(), 2);
        assert_eq!(event.quantity, dec!(150));
        // 100 @ 10 from the oldest lot, 50 @ 12 from the next
        assert_eq!(event.basis_at_close, dec!(1600));
        assert_eq!(event.proceeds, dec!(1650));
        assert_eq!(event.gain_loss(), dec!(50));

        // 50 remain open on the second lot
        let open: Vec<_> = ledger.open_lots().collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].open_quantity, dec!(50));
        ledger.verify_conservation().unwrap();
    }

    #[test]
    fn test_partial_close_splits_a_lot() {
        let mut ledger = LotLedger::new();
        ledger.process_trade(&make_buy("b1", 1, 1, dec!(100), dec!(10))).unwrap();
        let (event, _) = ledger
            .process_trade(&make_sell("s1", 2, 10, dec!(40), dec!(8)))
            .unwrap();

        let event = ledger.event(event.unwrap());
        assert_eq!(event.quantity, dec!(40));
        assert_eq!(event.basis_at_close, dec!(400));
        assert_eq!(event.proceeds, dec!(320));
        assert!(event.is_loss());

        let lot = ledger.lot(LotId(0));
        assert_eq!(lot.open_quantity, dec!(60));
        ledger.verify_conservation().unwrap();
    }

    #[test]
    fn test_oversell_clips_and_warns() {
        let mut ledger = LotLedger::new();
        ledger.process_trade(&make_buy("b1", 1, 1, dec!(50), dec!(10))).unwrap();
        let (event, warning) = ledger
            .process_trade(&make_sell("s1", 2, 10, dec!(80), dec!(9)))
            .unwrap();

        let warning = warning.unwrap();
        assert_eq!(warning.kind, WarningKind::Matching);
        assert!(warning.message.contains("clipped 30"));
        assert_eq!(warning.trade_id.as_deref(), Some("s1"));

        // The matched portion still realizes
        let event = ledger.event(event.unwrap());
        assert_eq!(event.quantity, dec!(50));
        assert_eq!(event.basis_at_close, dec!(500));
        ledger.verify_conservation().unwrap();
    }

    #[test]
    fn test_close_with_no_open_lots_emits_warning_only() {
        let mut ledger = LotLedger::new();
        let (event, warning) = ledger
            .process_trade(&make_sell("s1", 1, 10, dec!(10), dec!(9)))
            .unwrap();
        assert!(event.is_none());
        assert_eq!(warning.unwrap().kind, WarningKind::Matching);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_fees_fold_into_basis_and_proceeds() {
        let mut ledger = LotLedger::new();
        let mut buy = make_buy("b1", 1, 1, dec!(100), dec!(10));
        buy.fees = dec!(5);
        ledger.process_trade(&buy).unwrap();

        let mut sell = make_sell("s1", 2, 10, dec!(100), dec!(12));
        sell.fees = dec!(7);
        let (event, _) = ledger.process_trade(&sell).unwrap();

        let event = ledger.event(event.unwrap());
        assert_eq!(event.basis_at_close, dec!(1005));
        assert_eq!(event.proceeds, dec!(1193));
        assert_eq!(event.gain_loss(), dec!(188));
    }

    #[test]
    fn test_short_pool_realizes_against_opening_credit() {
        let mut ledger = LotLedger::new();
        let option = ContractSpec::option(
            "XYZ",
            NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            dec!(100),
            OptionRight::Call,
        );

        let mut sto = trade("o1", 1, 1, TradeSide::Sto, dec!(2), dec!(3));
        sto.contract = option.clone();
        sto.multiplier = 100;
        ledger.process_trade(&sto).unwrap();

        let mut btc = trade("c1", 2, 15, TradeSide::Btc, dec!(2), dec!(1));
        btc.contract = option;
        btc.multiplier = 100;
        let (event, warning) = ledger.process_trade(&btc).unwrap();

        assert!(warning.is_none());
        let event = ledger.event(event.unwrap());
        assert_eq!(event.direction, Direction::Short);
        // Sold 2 contracts at $3 (credit $600), bought back at $1 ($200)
        assert_eq!(event.proceeds, dec!(600));
        assert_eq!(event.basis_at_close, dec!(200));
        assert_eq!(event.gain_loss(), dec!(400));
    }

    #[test]
    fn test_option_multiplier_defaults_when_unset() {
        let mut ledger = LotLedger::new();
        let option = ContractSpec::option(
            "XYZ",
            NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            dec!(50),
            OptionRight::Call,
        );

        let mut bto = trade("o1", 1, 1, TradeSide::Bto, dec!(1), dec!(2));
        bto.contract = option.clone();
        bto.multiplier = 1;
        ledger.process_trade(&bto).unwrap();

        let mut stc = trade("c1", 2, 20, TradeSide::Stc, dec!(1), dec!(5));
        stc.contract = option;
        stc.multiplier = 1;
        let (event, _) = ledger.process_trade(&stc).unwrap();

        let event = ledger.event(event.unwrap());
        assert_eq!(event.basis_at_close, dec!(200));
        assert_eq!(event.proceeds, dec!(500));
    }

    #[test]
    fn test_accounts_are_independent_pools() {
        let mut ledger = LotLedger::new();
        ledger.process_trade(&make_buy("b1", 1, 1, dec!(100), dec!(10))).unwrap();

        let mut other_sell = make_sell("s1", 2, 10, dec!(50), dec!(11));
        other_sell.account_id = "acct-2".to_string();
        let (event, warning) = ledger.process_trade(&other_sell).unwrap();

        // acct-2 has no open lots; acct-1's pool is untouched
        assert!(event.is_none());
        assert!(warning.is_some());
        assert_eq!(ledger.open_lots().count(), 1);
        ledger.verify_conservation().unwrap();
    }

    #[test]
    fn test_holding_days_from_earliest_consumed_lot() {
        let mut ledger = LotLedger::new();
        ledger.process_trade(&make_buy("b1", 1, 1, dec!(10), dec!(10))).unwrap();
        ledger.process_trade(&make_buy("b2", 2, 9, dec!(10), dec!(10))).unwrap();
        let (event, _) = ledger
            .process_trade(&make_sell("s1", 3, 11, dec!(20), dec!(9)))
            .unwrap();

        let event = ledger.event(event.unwrap());
        assert_eq!(event.holding_days, 10);
        assert_eq!(event.matches[0].holding_days, 10);
        assert_eq!(event.matches[1].holding_days, 2);
    }

    #[test]
    fn test_adjustments_append_only_and_sum_by_mode() {
        let mut ledger = LotLedger::new();
        ledger.process_trade(&make_buy("b1", 1, 1, dec!(100), dec!(8.50))).unwrap();

        ledger.append_adjustment(
            LotId(0),
            BasisAdjustment {
                loss_event: EventId(0),
                mode: WashSaleMode::IrsStyle,
                quantity: dec!(100),
                amount: dec!(200),
                sale_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            },
        );

        let lot = ledger.lot(LotId(0));
        assert_eq!(lot.adjustment_total(WashSaleMode::IrsStyle), dec!(200));
        assert_eq!(lot.adjustment_total(WashSaleMode::BrokerStyle), dec!(0));
        assert_eq!(lot.adjusted_open_basis(WashSaleMode::IrsStyle), dec!(1050));
        assert_eq!(lot.unit_cost_basis, dec!(8.50));
    }
}
