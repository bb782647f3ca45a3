//! Portfolio ledger: positions, snapshots, and as-of lookup.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Direction of a bet. Share-count sign encodes the side on a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Signed share count plus the tick the position was opened at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub shares: f64,
    pub opened_at: usize,
}

impl Position {
    pub fn flat(opened_at: usize) -> Self {
        Self {
            shares: 0.0,
            opened_at,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.shares == 0.0
    }

    pub fn side(&self) -> Option<Side> {
        if self.shares > 0.0 {
            Some(Side::Long)
        } else if self.shares < 0.0 {
            Some(Side::Short)
        } else {
            None
        }
    }
}

/// A full allocation snapshot: every tradable symbol maps to a position,
/// possibly flat. At most one symbol holds a non-zero position at any tick
/// (single-slot portfolio).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Portfolio {
    positions: BTreeMap<String, Position>,
}

impl Portfolio {
    /// Seed a portfolio over `symbols` from an initial share allocation.
    /// Symbols absent from `allocation` start flat.
    pub fn seed<'a>(
        symbols: impl IntoIterator<Item = &'a str>,
        allocation: &BTreeMap<String, f64>,
        opened_at: usize,
    ) -> Self {
        let positions = symbols
            .into_iter()
            .map(|symbol| {
                let shares = allocation.get(symbol).copied().unwrap_or(0.0);
                (symbol.to_string(), Position { shares, opened_at })
            })
            .collect();
        Self { positions }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn set_position(&mut self, symbol: &str, shares: f64, opened_at: usize) {
        self.positions
            .insert(symbol.to_string(), Position { shares, opened_at });
    }

    pub fn clear_position(&mut self, symbol: &str) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.shares = 0.0;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.positions.iter().map(|(s, p)| (s.as_str(), p))
    }

    /// The single allocated (symbol, side) slot, or `None` when every
    /// position is flat.
    pub fn allocated(&self) -> Option<(&str, Side, &Position)> {
        self.positions.iter().find_map(|(symbol, position)| {
            position
                .side()
                .map(|side| (symbol.as_str(), side, position))
        })
    }

    /// Symbol → share count view for step info and observers.
    pub fn allocation(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(symbol, position)| (symbol.clone(), position.shares))
            .collect()
    }
}

/// Tick-keyed snapshots of the portfolio, appended at every transfer.
#[derive(Debug, Clone)]
pub struct PortfolioHistory {
    snapshots: BTreeMap<usize, Portfolio>,
}

impl PortfolioHistory {
    pub fn new(initial: Portfolio, tick: usize) -> Self {
        let mut snapshots = BTreeMap::new();
        snapshots.insert(tick, initial);
        Self { snapshots }
    }

    pub fn record(&mut self, tick: usize, portfolio: Portfolio) {
        self.snapshots.insert(tick, portfolio);
    }

    /// Latest snapshot not exceeding `tick`. Queries before the first
    /// snapshot fall back to the earliest one.
    pub fn as_of(&self, tick: usize) -> (usize, &Portfolio) {
        self.snapshots
            .range(..=tick)
            .next_back()
            .or_else(|| self.snapshots.iter().next())
            .map(|(t, p)| (*t, p))
            .expect("history always holds the initial snapshot")
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Portfolio)> {
        self.snapshots.iter().map(|(t, p)| (*t, p))
    }
}
