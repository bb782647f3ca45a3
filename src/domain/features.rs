//! Feature preprocessing: price arrays, signal matrices, frame bound.

use crate::domain::error::PortsimError;
use crate::domain::table::SymbolTable;
use std::collections::BTreeMap;

/// The `[start, end]` tick range over which a run is valid. The simulation
/// begins at `start` and terminates when the tick reaches `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBound {
    pub start: usize,
    pub end: usize,
}

/// Preprocessed market data shared by valuation, transfer, and observation
/// building. Immutable for a given data snapshot; rebuilt wholesale when new
/// rows are appended.
#[derive(Debug, Clone)]
pub struct MarketView {
    frame_bound: FrameBound,
    window_size: usize,
    /// Interpolated price array per symbol, full table length.
    prices: BTreeMap<String, Vec<f64>>,
    /// Signal feature rows per symbol, covering ticks `[0, frame_bound.end)`.
    signals: BTreeMap<String, Vec<Vec<f64>>>,
}

impl MarketView {
    /// Build the view from raw tables.
    ///
    /// The frame bound is derived from the shortest table. Zero or negative
    /// prices are data-quality artifacts and are filled by linear
    /// interpolation against the nearest valid neighbors.
    pub fn build(
        tables: &BTreeMap<String, SymbolTable>,
        window_size: usize,
        price_column: &str,
        signal_columns: &[String],
    ) -> Result<Self, PortsimError> {
        let shortest = tables
            .values()
            .map(SymbolTable::len)
            .min()
            .unwrap_or(0);
        if window_size == 0 || shortest < window_size + 2 {
            return Err(PortsimError::WindowTooLarge {
                window_size,
                available: shortest,
            });
        }
        let frame_bound = FrameBound {
            start: window_size,
            end: shortest - 1,
        };

        let mut prices = BTreeMap::new();
        let mut signals = BTreeMap::new();

        for (symbol, table) in tables {
            let mut price_array = table.column_values(price_column)?;
            interpolate_invalid(&mut price_array).map_err(|_| PortsimError::NoValidPrices {
                symbol: symbol.clone(),
            })?;

            let column_arrays = signal_columns
                .iter()
                .map(|name| table.column_values(name))
                .collect::<Result<Vec<_>, _>>()?;

            let rows = (0..frame_bound.end)
                .map(|tick| column_arrays.iter().map(|col| col[tick]).collect())
                .collect();

            prices.insert(symbol.clone(), price_array);
            signals.insert(symbol.clone(), rows);
        }

        Ok(Self {
            frame_bound,
            window_size,
            prices,
            signals,
        })
    }

    pub fn frame_bound(&self) -> FrameBound {
        self.frame_bound
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Symbols in observation order (lexicographic).
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.prices.keys().map(String::as_str)
    }

    pub fn price(&self, symbol: &str, tick: usize) -> f64 {
        self.prices[symbol][tick]
    }

    pub fn prices(&self, symbol: &str) -> &[f64] {
        &self.prices[symbol]
    }

    pub fn signal_row(&self, symbol: &str, tick: usize) -> &[f64] {
        &self.signals[symbol][tick]
    }

    /// Total signal feature width across all symbols.
    pub fn signal_width(&self) -> usize {
        self.signals
            .values()
            .map(|rows| rows.first().map_or(0, Vec::len))
            .sum()
    }
}

/// Replace non-positive entries by linear interpolation between the nearest
/// valid neighbors; entries before the first (after the last) valid value
/// take that edge value. Errors when no entry is valid.
pub fn interpolate_invalid(values: &mut [f64]) -> Result<(), ()> {
    let valid: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > 0.0)
        .map(|(i, _)| i)
        .collect();
    if valid.is_empty() {
        return Err(());
    }

    for i in 0..values.len() {
        if values[i] > 0.0 {
            continue;
        }
        let right = valid.partition_point(|&j| j < i);
        values[i] = match (right.checked_sub(1).map(|k| valid[k]), valid.get(right)) {
            (Some(lo), Some(&hi)) => {
                let fraction = (i - lo) as f64 / (hi - lo) as f64;
                values[lo] + fraction * (values[hi] - values[lo])
            }
            (Some(lo), None) => values[lo],
            (None, Some(&hi)) => values[hi],
            (None, None) => unreachable!("valid is non-empty"),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn make_table(symbol: &str, closes: &[f64]) -> SymbolTable {
        let mut table = SymbolTable::new(symbol, vec!["Close".into(), "RSI_4".into()]);
        for (i, close) in closes.iter().enumerate() {
            table
                .push_row(ts(i as u32), vec![*close, i as f64 * 10.0])
                .unwrap();
        }
        table
    }

    fn make_view(closes_a: &[f64], closes_b: &[f64], window: usize) -> MarketView {
        let mut tables = BTreeMap::new();
        tables.insert("AAPL".to_string(), make_table("AAPL", closes_a));
        tables.insert("TSLA".to_string(), make_table("TSLA", closes_b));
        MarketView::build(&tables, window, "Close", &["RSI_4".into()]).unwrap()
    }

    #[test]
    fn frame_bound_from_shortest_series() {
        let view = make_view(
            &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0],
            &[20.0, 21.0, 22.0, 23.0, 24.0],
            2,
        );
        assert_eq!(view.frame_bound(), FrameBound { start: 2, end: 4 });
    }

    #[test]
    fn window_too_large_is_fatal() {
        let mut tables = BTreeMap::new();
        tables.insert("AAPL".to_string(), make_table("AAPL", &[10.0, 11.0, 12.0]));
        let err = MarketView::build(&tables, 4, "Close", &["RSI_4".into()]).unwrap_err();
        assert!(matches!(err, PortsimError::WindowTooLarge { .. }));
    }

    #[test]
    fn missing_price_column_is_fatal() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "AAPL".to_string(),
            make_table("AAPL", &[10.0, 11.0, 12.0, 13.0, 14.0]),
        );
        let err = MarketView::build(&tables, 2, "Mid", &["RSI_4".into()]).unwrap_err();
        assert!(matches!(err, PortsimError::MissingColumn { .. }));
    }

    #[test]
    fn signal_rows_cover_ticks_up_to_end() {
        let view = make_view(
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            &[20.0, 21.0, 22.0, 23.0, 24.0],
            2,
        );
        // end = 4, so rows exist for ticks 0..4
        assert_eq!(view.signal_row("AAPL", 0), &[0.0]);
        assert_eq!(view.signal_row("AAPL", 3), &[30.0]);
        assert_eq!(view.signal_width(), 2);
    }

    #[test]
    fn interpolation_fills_interior_gap() {
        let mut values = vec![10.0, 0.0, 0.0, 16.0];
        interpolate_invalid(&mut values).unwrap();
        assert!((values[1] - 12.0).abs() < 1e-12);
        assert!((values[2] - 14.0).abs() < 1e-12);
    }

    #[test]
    fn interpolation_clamps_at_edges() {
        let mut values = vec![-1.0, 10.0, 12.0, 0.0];
        interpolate_invalid(&mut values).unwrap();
        assert!((values[0] - 10.0).abs() < 1e-12);
        assert!((values[3] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn interpolation_all_invalid_errors() {
        let mut values = vec![0.0, -5.0, 0.0];
        assert!(interpolate_invalid(&mut values).is_err());
    }

    #[test]
    fn negative_prices_interpolated_in_view() {
        let view = make_view(
            &[10.0, -1.0, 14.0, 15.0, 16.0],
            &[20.0, 21.0, 22.0, 23.0, 24.0],
            2,
        );
        assert!((view.price("AAPL", 1) - 12.0).abs() < 1e-12);
    }
}
