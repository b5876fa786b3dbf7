use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::EngineError;
use crate::models::{AccountType, ContractSpec, Trade, WashSaleMode};
use super::lots::{BasisAdjustment, EventId, LotId, LotLedger};

/// One replacement-lot allocation within a wash-sale adjustment. Quantities
/// are share equivalents (option contracts count at their multiplier).
#[derive(Debug, Clone)]
pub struct ReplacementAllocation {
    pub lot: LotId,
    pub account_id: String,
    pub account_type: AccountType,
    pub contract: ContractSpec,
    pub acquired_on: NaiveDate,
    pub quantity: Decimal,
    pub amount: Decimal,
    pub cross_account: bool,
    pub ira_replacement: bool,
}

/// Wash-sale outcome attached to a loss event for one mode.
#[derive(Debug, Clone)]
pub struct WashSaleAdjustment {
    pub loss_event: EventId,
    pub mode: WashSaleMode,
    pub loss_amount: Decimal,
    pub loss_quantity: Decimal,
    pub replaced_quantity: Decimal,
    pub disallowed_amount: Decimal,
    pub allowed_loss: Decimal,
    pub allocations: Vec<ReplacementAllocation>,
    pub ira_permanent_disallowance: bool,
}

/// Result of one wash-sale pass over the full realization set.
#[derive(Debug, Clone)]
pub struct WashSalePass {
    pub mode: WashSaleMode,
    pub adjustments: BTreeMap<EventId, WashSaleAdjustment>,
}

impl WashSalePass {
    pub fn adjustment_for(&self, event: EventId) -> Option<&WashSaleAdjustment> {
        self.adjustments.get(&event)
    }

    pub fn total_disallowed(&self) -> Decimal {
        self.adjustments.values().map(|a| a.disallowed_amount).sum()
    }
}

/// Loss sale snapshot, extracted before the mutation phase so the ledger can
/// be borrowed mutably while allocating.
struct LossCase {
    event: EventId,
    account_id: String,
    contract: ContractSpec,
    cusip: Option<String>,
    sale_date: NaiveDate,
    loss: Decimal,
    loss_quantity: Decimal,
    /// Share equivalents this sale itself consumed, by opening trade seq.
    /// Shares sold in the loss sale cannot replace themselves.
    self_consumed: BTreeMap<u64, Decimal>,
}

struct Candidate<'a> {
    trade: &'a Trade,
    lot: LotId,
    quantity_equiv: Decimal,
}

/// Scan every taxable loss sale for replacement acquisitions inside
/// `[sale_date - window, sale_date + window]` and disallow the replaced
/// portion of the loss, stepping up replacement-lot basis. BROKER_STYLE
/// restricts the scan to the loss account; IRS_STYLE spans all accounts and
/// marks IRA landings as permanently disallowed (no step-up anywhere).
///
/// Runs strictly after lot matching completes: the scan needs the full
/// realization set across accounts. Losses are processed in sale order and
/// each replacement share absorbs at most one disallowance, so the result is
/// deterministic for a given trade set.
pub fn apply_wash_sales(
    ledger: &mut LotLedger,
    trades: &[Trade],
    skip_accounts: &BTreeSet<String>,
    mode: WashSaleMode,
    window_days: i64,
) -> Result<WashSalePass, EngineError> {
    let lot_by_seq: BTreeMap<u64, LotId> =
        ledger.lots().iter().map(|l| (l.origin_seq, l.id)).collect();

    let mut candidates: Vec<Candidate> = trades
        .iter()
        .filter(|t| t.is_replacement_candidate() && !skip_accounts.contains(&t.account_id))
        .filter_map(|t| {
            lot_by_seq.get(&t.seq).map(|lot| Candidate {
                trade: t,
                lot: *lot,
                quantity_equiv: t.quantity * t.effective_multiplier(),
            })
        })
        .collect();
    candidates.sort_by(|a, b| {
        (a.trade.executed_at, a.trade.seq).cmp(&(b.trade.executed_at, b.trade.seq))
    });

    let mut losses: Vec<LossCase> = ledger
        .events()
        .iter()
        .filter(|e| {
            e.account_type.is_taxable()
                && e.is_loss()
                && !skip_accounts.contains(&e.account_id)
        })
        .map(|e| {
            let multiplier = ledger.lot(e.matches[0].lot).multiplier;
            let mut self_consumed = BTreeMap::new();
            for m in &e.matches {
                let seq = ledger.lot(m.lot).origin_seq;
                *self_consumed.entry(seq).or_insert(Decimal::ZERO) += m.quantity * multiplier;
            }
            LossCase {
                event: e.id,
                account_id: e.account_id.clone(),
                contract: e.contract.clone(),
                cusip: e.cusip.clone(),
                sale_date: e.sale_date(),
                loss: e.basis_at_close - e.proceeds,
                loss_quantity: e.quantity * multiplier,
                self_consumed,
            }
        })
        .collect();
    losses.sort_by_key(|c| {
        let e = ledger.event(c.event);
        (e.sold_at, e.close_seq)
    });

    // Share equivalents already claimed by earlier losses, by candidate seq.
    let mut claimed: BTreeMap<u64, Decimal> = BTreeMap::new();
    let mut adjustments = BTreeMap::new();

    for case in &losses {
        let window_start = case.sale_date - Duration::days(window_days);
        let window_end = case.sale_date + Duration::days(window_days);

        let in_scope: Vec<(&Candidate, Decimal)> = candidates
            .iter()
            .filter(|c| {
                let day = c.trade.executed_on();
                day >= window_start
                    && day <= window_end
                    && matches_identity(case, c.trade)
                    && (mode == WashSaleMode::IrsStyle || c.trade.account_id == case.account_id)
            })
            .filter_map(|c| {
                let used = claimed.get(&c.trade.seq).copied().unwrap_or(Decimal::ZERO)
                    + case
                        .self_consumed
                        .get(&c.trade.seq)
                        .copied()
                        .unwrap_or(Decimal::ZERO);
                let capacity = c.quantity_equiv - used;
                (capacity > Decimal::ZERO).then_some((c, capacity))
            })
            .collect();

        let available: Decimal = in_scope.iter().map(|(_, cap)| *cap).sum();
        let replaced_quantity = case.loss_quantity.min(available);
        if replaced_quantity <= Decimal::ZERO {
            continue;
        }

        // Single division keeps full replacement exact: replaced == loss
        // quantity yields disallowed == loss to the last digit.
        let disallowed = case.loss * replaced_quantity / case.loss_quantity;

        // Earliest acquisition absorbs first, before or after the sale alike.
        let mut takes: Vec<(&Candidate, Decimal)> = Vec::new();
        let mut remaining = replaced_quantity;
        for (candidate, capacity) in &in_scope {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(*capacity);
            takes.push((*candidate, take));
            remaining -= take;
        }

        let mut allocations = Vec::with_capacity(takes.len());
        let mut allocated_total = Decimal::ZERO;
        let last = takes.len() - 1;
        for (i, (candidate, take)) in takes.iter().enumerate() {
            // Final allocation takes the exact remainder so the amounts sum
            // to the disallowed total with no rounding residue.
            let amount = if i == last {
                disallowed - allocated_total
            } else {
                disallowed * *take / replaced_quantity
            };
            allocated_total += amount;
            *claimed.entry(candidate.trade.seq).or_insert(Decimal::ZERO) += *take;

            let ira_replacement = candidate.trade.account_type.is_ira();
            if !ira_replacement {
                ledger.append_adjustment(
                    candidate.lot,
                    BasisAdjustment {
                        loss_event: case.event,
                        mode,
                        quantity: *take,
                        amount,
                        sale_date: case.sale_date,
                    },
                );
            }
            allocations.push(ReplacementAllocation {
                lot: candidate.lot,
                account_id: candidate.trade.account_id.clone(),
                account_type: candidate.trade.account_type,
                contract: candidate.trade.contract.clone(),
                acquired_on: candidate.trade.executed_on(),
                quantity: *take,
                amount,
                cross_account: candidate.trade.account_id != case.account_id,
                ira_replacement,
            });
        }

        if allocated_total != disallowed {
            return Err(EngineError::InvariantViolation {
                account_id: case.account_id.clone(),
                detail: format!(
                    "wash-sale allocation drift on {}: allocated {} != disallowed {}",
                    case.contract, allocated_total, disallowed
                ),
            });
        }
        if disallowed > case.loss {
            return Err(EngineError::InvariantViolation {
                account_id: case.account_id.clone(),
                detail: format!(
                    "disallowed {} exceeds loss {} on {}",
                    disallowed, case.loss, case.contract
                ),
            });
        }

        debug!(
            mode = mode.as_str(),
            contract = %case.contract,
            sale_date = %case.sale_date,
            disallowed = %disallowed,
            "wash sale detected"
        );
        adjustments.insert(
            case.event,
            WashSaleAdjustment {
                loss_event: case.event,
                mode,
                loss_amount: case.loss,
                loss_quantity: case.loss_quantity,
                replaced_quantity,
                disallowed_amount: disallowed,
                allowed_loss: case.loss - disallowed,
                ira_permanent_disallowance: allocations.iter().any(|a| a.ira_replacement),
                allocations,
            },
        );
    }

    Ok(WashSalePass { mode, adjustments })
}

/// CUSIP equality when both records carry one, underlying ticker otherwise.
fn matches_identity(case: &LossCase, candidate: &Trade) -> bool {
    if let (Some(a), Some(b)) = (&case.cusip, &candidate.cusip) {
        return a.eq_ignore_ascii_case(b);
    }
    case.contract.underlying() == candidate.contract.underlying()
}
