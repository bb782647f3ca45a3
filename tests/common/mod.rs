#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use portsim::domain::env::{EnvConfig, PortfolioEnv};
use portsim::domain::error::PortsimError;
use portsim::domain::portfolio::Portfolio;
use portsim::domain::reward::BaselineRewardStrategy;
use portsim::domain::table::SymbolTable;
use portsim::ports::observer_port::ObserverPort;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub fn tick_ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::minutes(i as i64)
}

/// Table with a `Close` price column and one synthetic `Signal` column whose
/// value at row `i` is `i`.
pub fn make_table(symbol: &str, closes: &[f64]) -> SymbolTable {
    let mut table = SymbolTable::new(symbol, vec!["Close".into(), "Signal".into()]);
    for (i, close) in closes.iter().enumerate() {
        table.push_row(tick_ts(i), vec![*close, i as f64]).unwrap();
    }
    table
}

pub fn make_tables(series: &[(&str, &[f64])]) -> BTreeMap<String, SymbolTable> {
    series
        .iter()
        .map(|(symbol, closes)| (symbol.to_string(), make_table(symbol, closes)))
        .collect()
}

pub fn allocation(symbol: &str, shares: f64) -> BTreeMap<String, f64> {
    let mut map = BTreeMap::new();
    map.insert(symbol.to_string(), shares);
    map
}

/// Baseline-reward environment over the given series, with the whole initial
/// allocation in the first listed symbol.
pub fn make_env(series: &[(&str, &[f64])], window_size: usize) -> PortfolioEnv {
    let tables = make_tables(series);
    let initial = allocation(series[0].0, 1.0);
    PortfolioEnv::new(
        EnvConfig::new(window_size, "Close", vec!["Signal".into()]),
        tables,
        initial,
        Box::new(BaselineRewardStrategy),
    )
    .unwrap()
}

/// Observer that records which callbacks fired, optionally failing each one.
pub struct RecordingObserver {
    pub calls: Rc<RefCell<Vec<String>>>,
    pub fail: bool,
}

impl RecordingObserver {
    pub fn new(calls: Rc<RefCell<Vec<String>>>) -> Self {
        Self { calls, fail: false }
    }

    pub fn failing(calls: Rc<RefCell<Vec<String>>>) -> Self {
        Self { calls, fail: true }
    }

    fn record(&self, call: &str) -> Result<(), PortsimError> {
        self.calls.borrow_mut().push(call.to_string());
        if self.fail {
            Err(PortsimError::Observer {
                reason: format!("{call} rejected"),
            })
        } else {
            Ok(())
        }
    }
}

impl ObserverPort for RecordingObserver {
    fn notify_new_data(&mut self) -> Result<(), PortsimError> {
        self.record("new_data")
    }

    fn notify_portfolio_change(
        &mut self,
        _old: &Portfolio,
        _new: &Portfolio,
    ) -> Result<(), PortsimError> {
        self.record("portfolio_change")
    }

    fn notify_begin_of_observation(&mut self, _portfolio: &Portfolio) -> Result<(), PortsimError> {
        self.record("begin_of_observation")
    }
}
