//! Allocation transfer: moving the full slot between (symbol, side) pairs.

use crate::domain::features::MarketView;
use crate::domain::portfolio::{Portfolio, PortfolioHistory, Side};
use crate::domain::valuation::position_value;
use serde::Serialize;

/// Multiplicative haircut applied to deallocated funds, keyed by the side
/// being entered. Shorting costs more to enter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferPenalties {
    pub long: f64,
    pub short: f64,
}

impl Default for TransferPenalties {
    fn default() -> Self {
        Self {
            long: 0.005,
            short: 0.01,
        }
    }
}

impl TransferPenalties {
    pub fn rate(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }
}

/// The closed side of a transfer. Absent when the ledger was flat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLeg {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub shares: f64,
    pub held_ticks: usize,
    /// Realized fractional return of the closed position, net of its side's
    /// entry penalty.
    pub realized_return: f64,
}

/// Immutable record of one transfer, appended to the event history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationEvent {
    pub tick: usize,
    pub source: Option<SourceLeg>,
    pub target_symbol: String,
    pub target_side: Side,
    pub target_price: f64,
    pub target_shares: f64,
}

/// Outcome of a transfer: the snapshots before and after, for observer
/// notification, plus the event record.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub old_portfolio: Portfolio,
    pub new_portfolio: Portfolio,
    pub event: AllocationEvent,
}

/// Close the source slot at `tick`, haircut the freed funds by the target
/// side's penalty, and open the target slot with the converted share count.
///
/// Negative deallocated funds (a short that lost more than its notional) are
/// propagated as-is; the resulting adverse share count surfaces the loss at
/// the next valuation instead of being clamped away.
pub fn transfer(
    view: &MarketView,
    history: &mut PortfolioHistory,
    penalties: &TransferPenalties,
    target_symbol: &str,
    target_side: Side,
    tick: usize,
) -> TransferOutcome {
    let (_, current) = history.as_of(tick);
    let old_portfolio = current.clone();
    let mut new_portfolio = old_portfolio.clone();

    let mut deallocated_funds = 0.0;
    let mut source = None;
    if let Some((source_symbol, source_side, position)) = old_portfolio.allocated() {
        let open_price = view.price(source_symbol, position.opened_at);
        let current_price = view.price(source_symbol, tick);
        deallocated_funds = position_value(position.shares, open_price, current_price);

        let price_move = (current_price - open_price) / open_price * source_side.sign();
        source = Some(SourceLeg {
            symbol: source_symbol.to_string(),
            side: source_side,
            price: current_price,
            shares: position.shares,
            held_ticks: tick - position.opened_at,
            realized_return: price_move - penalties.rate(source_side),
        });
        new_portfolio.clear_position(source_symbol);
    }

    deallocated_funds *= 1.0 - penalties.rate(target_side);

    let target_price = view.price(target_symbol, tick);
    let target_shares = target_side.sign() * deallocated_funds / target_price;
    new_portfolio.set_position(target_symbol, target_shares, tick);

    let event = AllocationEvent {
        tick,
        source,
        target_symbol: target_symbol.to_string(),
        target_side,
        target_price,
        target_shares,
    };

    history.record(tick, new_portfolio.clone());

    TransferOutcome {
        old_portfolio,
        new_portfolio,
        event,
    }
}
