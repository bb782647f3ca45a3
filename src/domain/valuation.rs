//! Mark-to-market valuation of positions and portfolios.

use crate::domain::features::MarketView;
use crate::domain::portfolio::PortfolioHistory;

/// Value of a signed share count at `current_price`, given the price the
/// position was opened at.
///
/// Longs are worth `shares * price`. A short is valued as the mirror image
/// of a long opened at the same price: `-(2 * open - current) * shares`,
/// which gains as the price falls below the opening mark.
pub fn position_value(shares: f64, open_price: f64, current_price: f64) -> f64 {
    if shares >= 0.0 {
        shares * current_price
    } else {
        -(2.0 * open_price - current_price) * shares
    }
}

/// Portfolio value at `tick`, using the snapshot in effect at that tick.
///
/// Only one position is ever non-zero under the single-slot invariant, but
/// the sum generalizes.
pub fn portfolio_value(view: &MarketView, history: &PortfolioHistory, tick: usize) -> f64 {
    let (_, portfolio) = history.as_of(tick);
    portfolio
        .iter()
        .filter(|(_, position)| !position.is_flat())
        .map(|(symbol, position)| {
            let open_price = view.price(symbol, position.opened_at);
            let current_price = view.price(symbol, tick);
            position_value(position.shares, open_price, current_price)
        })
        .sum()
}
