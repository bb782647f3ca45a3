//! Tick-stepping simulation environment.

use crate::domain::action::ActionSpace;
use crate::domain::error::PortsimError;
use crate::domain::features::{FrameBound, MarketView};
use crate::domain::portfolio::{Portfolio, PortfolioHistory};
use crate::domain::reward::RewardStrategy;
use crate::domain::table::SymbolTable;
use crate::domain::transfer::{AllocationEvent, TransferPenalties, transfer};
use crate::domain::valuation::portfolio_value;
use crate::ports::observer_port::ObserverPort;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Unrealized-profit runtime signal scaling.
const PROFIT_SIGNAL_SCALE: f64 = 10.0;
/// Position-age runtime signal scaling.
const AGE_SIGNAL_SCALE: f64 = 1.0 / 1000.0;

/// `window_size` rows by `signal_width + 3` columns.
pub type Observation = Vec<Vec<f64>>;

/// Construction parameters for [`PortfolioEnv`].
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub window_size: usize,
    pub price_column: String,
    pub signal_columns: Vec<String>,
    pub penalties: TransferPenalties,
}

impl EnvConfig {
    pub fn new(
        window_size: usize,
        price_column: impl Into<String>,
        signal_columns: Vec<String>,
    ) -> Self {
        Self {
            window_size,
            price_column: price_column.into(),
            signal_columns,
            penalties: TransferPenalties::default(),
        }
    }
}

/// Auxiliary step output consumed by drivers and sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Info {
    pub current_profit: f64,
    pub current_portfolio_value: f64,
    pub portfolio_allocation: BTreeMap<String, f64>,
}

/// The `(observation, reward, done, info)` tuple of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: Info,
}

/// Discrete-time portfolio allocation simulator.
///
/// Owns the ledger, histories, and preprocessed market view; an external
/// driver repeatedly calls [`PortfolioEnv::step`] with an action index, and
/// in live mode interleaves [`PortfolioEnv::append_data`].
pub struct PortfolioEnv {
    config: EnvConfig,
    tables: BTreeMap<String, SymbolTable>,
    initial_allocation: BTreeMap<String, f64>,
    view: MarketView,
    history: PortfolioHistory,
    events: Vec<AllocationEvent>,
    action_space: ActionSpace,
    reward_strategy: Box<dyn RewardStrategy>,
    observer: Option<Box<dyn ObserverPort>>,
    current_tick: usize,
    done: bool,
    reset_enabled: bool,
    initial_value: f64,
    profit_history: Vec<f64>,
    age_history: Vec<f64>,
    reward_history: Vec<f64>,
    last_output: Option<StepOutput>,
}

impl fmt::Debug for PortfolioEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortfolioEnv")
            .field("config", &self.config)
            .field("current_tick", &self.current_tick)
            .field("done", &self.done)
            .field("reset_enabled", &self.reset_enabled)
            .field("initial_value", &self.initial_value)
            .finish_non_exhaustive()
    }
}

impl PortfolioEnv {
    pub fn new(
        config: EnvConfig,
        tables: BTreeMap<String, SymbolTable>,
        initial_allocation: BTreeMap<String, f64>,
        reward_strategy: Box<dyn RewardStrategy>,
    ) -> Result<Self, PortsimError> {
        if initial_allocation.is_empty() {
            return Err(PortsimError::EmptyAllocation);
        }
        for symbol in initial_allocation.keys() {
            if !tables.contains_key(symbol) {
                return Err(PortsimError::UnknownSymbol {
                    symbol: symbol.clone(),
                });
            }
        }

        let view = MarketView::build(
            &tables,
            config.window_size,
            &config.price_column,
            &config.signal_columns,
        )?;
        let start = view.frame_bound().start;

        let portfolio = Portfolio::seed(
            tables.keys().map(String::as_str),
            &initial_allocation,
            start - 1,
        );
        let history = PortfolioHistory::new(portfolio, start - 1);

        let initial_value = portfolio_value(&view, &history, start);
        if initial_value <= 0.0 {
            return Err(PortsimError::ZeroInitialValue);
        }

        let action_space = ActionSpace::new(tables.keys().cloned().collect());
        let window = config.window_size;

        Ok(Self {
            config,
            tables,
            initial_allocation,
            view,
            history,
            events: Vec::new(),
            action_space,
            reward_strategy,
            observer: None,
            current_tick: start,
            done: false,
            reset_enabled: true,
            initial_value,
            profit_history: vec![0.0; window],
            age_history: vec![0.0; window],
            reward_history: vec![0.0; window],
            last_output: None,
        })
    }

    /// Reinitialize tick, ledger, and histories. A no-op once reset has been
    /// disabled, so live-mode state survives episode boundaries.
    pub fn reset(&mut self) -> Observation {
        if self.reset_enabled {
            let start = self.view.frame_bound().start;
            let portfolio = Portfolio::seed(
                self.tables.keys().map(String::as_str),
                &self.initial_allocation,
                start - 1,
            );
            self.history = PortfolioHistory::new(portfolio, start - 1);
            self.events.clear();
            self.current_tick = start;
            self.done = false;
            self.initial_value = portfolio_value(&self.view, &self.history, start);
            self.profit_history = vec![0.0; self.config.window_size];
            self.age_history = vec![0.0; self.config.window_size];
            self.reward_history = vec![0.0; self.config.window_size];
            self.last_output = None;
        }
        self.observation_at(self.current_tick)
    }

    pub fn disable_reset(&mut self) {
        self.reset_enabled = false;
    }

    /// Attach an observer and announce the portfolio it starts from.
    pub fn observe(&mut self, observer: Box<dyn ObserverPort>) {
        self.observer = Some(observer);
        let portfolio = self.history.as_of(self.current_tick).1.clone();
        if let Some(observer) = &mut self.observer
            && let Err(err) = observer.notify_begin_of_observation(&portfolio)
        {
            warn!("observer failed on begin of observation: {err}");
        }
    }

    /// Advance the simulation by one tick.
    ///
    /// After the run is done, further calls return the last output unchanged
    /// instead of raising. An out-of-range action index panics: that is a
    /// driver bug, not a recoverable condition.
    pub fn step(&mut self, action: usize) -> StepOutput {
        if self.done {
            if self.last_output.is_none() {
                let output = self.build_output();
                self.last_output = Some(output);
            }
            return self.last_output.clone().expect("output cached above");
        }

        let (symbol, side) = self.action_space.decode(action);
        let symbol = symbol.to_string();

        let allocated = self
            .history
            .as_of(self.current_tick)
            .1
            .allocated()
            .map(|(s, allocated_side, _)| (s.to_string(), allocated_side));

        if allocated != Some((symbol.clone(), side)) {
            let outcome = transfer(
                &self.view,
                &mut self.history,
                &self.config.penalties,
                &symbol,
                side,
                self.current_tick,
            );
            self.events.push(outcome.event);
            if let Some(observer) = &mut self.observer
                && let Err(err) =
                    observer.notify_portfolio_change(&outcome.old_portfolio, &outcome.new_portfolio)
            {
                warn!("observer failed on portfolio change: {err}");
            }
        }

        self.current_tick += 1;
        self.append_runtime_signals();
        self.done = self.current_tick >= self.view.frame_bound().end;

        if self.done {
            info!(
                profit = self.profit(),
                transfers = self.events.len(),
                "run complete"
            );
        }

        let output = self.build_output();
        self.last_output = Some(output.clone());
        output
    }

    /// Splice newly arrived rows onto every symbol's table and recompute the
    /// derived arrays. Ledger and histories are left untouched.
    pub fn append_data(
        &mut self,
        incoming: &BTreeMap<String, SymbolTable>,
    ) -> Result<(), PortsimError> {
        if let Some(observer) = &mut self.observer
            && let Err(err) = observer.notify_new_data()
        {
            warn!("observer failed on new data: {err}");
        }

        for symbol in self.tables.keys() {
            if !incoming.contains_key(symbol) {
                return Err(PortsimError::AppendMissingSymbol {
                    symbol: symbol.clone(),
                });
            }
        }

        // Splice into a copy so a fatal mid-append error leaves state intact.
        let mut updated = self.tables.clone();
        for (symbol, table) in updated.iter_mut() {
            table.splice(&incoming[symbol])?;
        }
        let view = MarketView::build(
            &updated,
            self.config.window_size,
            &self.config.price_column,
            &self.config.signal_columns,
        )?;

        self.tables = updated;
        self.view = view;
        self.done = self.current_tick >= self.view.frame_bound().end;

        if !self.done {
            info!(tick = self.current_tick, "new data appended, run continues");
        }
        Ok(())
    }

    pub fn current_tick(&self) -> usize {
        self.current_tick
    }

    pub fn frame_bound(&self) -> FrameBound {
        self.view.frame_bound()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    /// `(rows, columns)` of every observation.
    pub fn observation_shape(&self) -> (usize, usize) {
        (self.config.window_size, self.view.signal_width() + 3)
    }

    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    /// The transfer executed by the most recent step, if any.
    pub fn recent_event(&self) -> Option<&AllocationEvent> {
        self.events
            .last()
            .filter(|event| event.tick + 1 == self.current_tick)
    }

    /// Ticks since the allocated position was opened; zero when flat.
    pub fn position_age(&self) -> usize {
        self.history
            .as_of(self.current_tick)
            .1
            .allocated()
            .map_or(0, |(_, _, position)| self.current_tick - position.opened_at)
    }

    pub fn profit(&self) -> f64 {
        self.profit_at(self.current_tick)
    }

    /// Portfolio value at `tick` relative to the initial allocation's value
    /// at the first valid tick.
    pub fn profit_at(&self, tick: usize) -> f64 {
        self.portfolio_value_at(tick) / self.initial_value
    }

    pub fn portfolio_value(&self) -> f64 {
        self.portfolio_value_at(self.current_tick)
    }

    pub fn portfolio_value_at(&self, tick: usize) -> f64 {
        portfolio_value(&self.view, &self.history, tick)
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.history.as_of(self.current_tick).1
    }

    fn append_runtime_signals(&mut self) {
        if self.profit_history.len() >= self.current_tick {
            return;
        }
        let (profit_signal, age_signal) = match self.history.as_of(self.current_tick).1.allocated()
        {
            Some((symbol, side, position)) => {
                let open_price = self.view.price(symbol, position.opened_at);
                let current_price = self.view.price(symbol, self.current_tick);
                let price_move = (current_price - open_price) * side.sign();
                (
                    price_move * PROFIT_SIGNAL_SCALE / open_price,
                    (self.current_tick - position.opened_at) as f64 * AGE_SIGNAL_SCALE,
                )
            }
            None => (0.0, 0.0),
        };
        self.profit_history.push(profit_signal);
        self.age_history.push(age_signal);
    }

    fn cached_reward(&mut self) -> f64 {
        if self.reward_history.len() < self.current_tick {
            let reward = self.reward_strategy.reward(self);
            self.reward_history.push(reward);
        }
        *self.reward_history.last().expect("seeded at construction")
    }

    fn build_output(&mut self) -> StepOutput {
        let observation = self.observation_at(self.current_tick);
        let reward = self.cached_reward();
        StepOutput {
            observation,
            reward,
            done: self.done,
            info: self.info(),
        }
    }

    fn info(&self) -> Info {
        Info {
            current_profit: self.profit(),
            current_portfolio_value: self.portfolio_value(),
            portfolio_allocation: self.portfolio().allocation(),
        }
    }

    /// Horizontally concatenate, per tick of the window, every symbol's
    /// signal row followed by position age, raw profit, and mean-centered
    /// profit runtime signals.
    fn observation_at(&self, tick: usize) -> Observation {
        let window = self.config.window_size;
        let lo = tick - window;

        let profit_window = &self.profit_history[lo..tick];
        let mean = profit_window.iter().sum::<f64>() / window as f64;

        (lo..tick)
            .map(|t| {
                let mut row =
                    Vec::with_capacity(self.view.signal_width() + 3);
                for symbol in self.view.symbols() {
                    row.extend_from_slice(self.view.signal_row(symbol, t));
                }
                row.push(self.age_history[t]);
                row.push(self.profit_history[t]);
                row.push(self.profit_history[t] - mean);
                row
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::Side;
    use crate::domain::reward::BaselineRewardStrategy;
    use chrono::NaiveDate;

    fn make_table(symbol: &str, closes: &[f64]) -> SymbolTable {
        let mut table = SymbolTable::new(symbol, vec!["Close".into(), "Signal".into()]);
        for (i, close) in closes.iter().enumerate() {
            let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::minutes(i as i64);
            table
                .push_row(ts, vec![*close, i as f64])
                .unwrap();
        }
        table
    }

    fn two_symbol_env(prices_a: &[f64], prices_b: &[f64], window: usize) -> PortfolioEnv {
        let mut tables = BTreeMap::new();
        tables.insert("A".to_string(), make_table("A", prices_a));
        tables.insert("B".to_string(), make_table("B", prices_b));

        let mut allocation = BTreeMap::new();
        allocation.insert("A".to_string(), 1.0);

        PortfolioEnv::new(
            EnvConfig::new(window, "Close", vec!["Signal".into()]),
            tables,
            allocation,
            Box::new(BaselineRewardStrategy),
        )
        .unwrap()
    }

    #[test]
    fn empty_allocation_is_fatal() {
        let mut tables = BTreeMap::new();
        tables.insert("A".to_string(), make_table("A", &[10.0, 10.0, 10.0, 10.0]));
        let err = PortfolioEnv::new(
            EnvConfig::new(1, "Close", Vec::new()),
            tables,
            BTreeMap::new(),
            Box::new(BaselineRewardStrategy),
        )
        .unwrap_err();
        assert!(matches!(err, PortsimError::EmptyAllocation));
    }

    #[test]
    fn zero_valued_allocation_is_fatal() {
        let mut tables = BTreeMap::new();
        tables.insert("A".to_string(), make_table("A", &[10.0, 10.0, 10.0, 10.0]));
        let mut allocation = BTreeMap::new();
        allocation.insert("A".to_string(), 0.0);
        let err = PortfolioEnv::new(
            EnvConfig::new(1, "Close", Vec::new()),
            tables,
            allocation,
            Box::new(BaselineRewardStrategy),
        )
        .unwrap_err();
        assert!(matches!(err, PortsimError::ZeroInitialValue));
    }

    #[test]
    fn allocation_for_unknown_symbol_is_fatal() {
        let mut tables = BTreeMap::new();
        tables.insert("A".to_string(), make_table("A", &[10.0, 10.0, 10.0, 10.0]));
        let mut allocation = BTreeMap::new();
        allocation.insert("Z".to_string(), 1.0);
        let err = PortfolioEnv::new(
            EnvConfig::new(1, "Close", Vec::new()),
            tables,
            allocation,
            Box::new(BaselineRewardStrategy),
        )
        .unwrap_err();
        assert!(matches!(err, PortsimError::UnknownSymbol { .. }));
    }

    #[test]
    fn observation_shape_matches_contract() {
        let env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            2,
        );
        // Two symbols with one signal column each, plus 3 runtime columns.
        assert_eq!(env.observation_shape(), (2, 5));
    }

    #[test]
    fn reset_observation_starts_at_row_zero() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            2,
        );
        let observation = env.reset();
        assert_eq!(observation.len(), 2);
        // Window [0, 2): signal values are the row indices.
        assert_eq!(observation[0][0], 0.0);
        assert_eq!(observation[1][0], 1.0);
    }

    #[test]
    fn holding_constant_prices_keeps_profit_at_one() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 10.0, 10.0, 10.0, 10.0, 10.0],
            1,
        );
        let hold = env.action_space().encode("A", Side::Long).unwrap();
        loop {
            let output = env.step(hold);
            assert!((output.info.current_profit - 1.0).abs() < 1e-9);
            if output.done {
                break;
            }
        }
    }

    #[test]
    fn step_transfers_at_the_acted_on_tick() {
        // Spec scenario: A flat at 10, B rising 10..14, window 1,
        // long(B) selected at tick 1.
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        assert_eq!(env.current_tick(), 1);
        let long_b = env.action_space().encode("B", Side::Long).unwrap();

        let mut output = env.step(long_b);
        let event = &env.events()[0];
        assert_eq!(event.tick, 1);
        assert!((event.target_shares - 9.95 / 11.0).abs() < 1e-9);

        while !output.done {
            output = env.step(long_b);
        }
        assert_eq!(env.current_tick(), 4);
        assert!((output.info.current_portfolio_value - 9.95 / 11.0 * 14.0).abs() < 1e-9);
        assert!((output.info.current_profit - 1.2663).abs() < 1e-3);
    }

    #[test]
    fn same_slot_selection_is_a_noop() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        let hold = env.action_space().encode("A", Side::Long).unwrap();
        env.step(hold);
        assert!(env.events().is_empty());
    }

    #[test]
    fn terminal_step_is_idempotent() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        let hold = env.action_space().encode("A", Side::Long).unwrap();
        let mut output = env.step(hold);
        while !output.done {
            output = env.step(hold);
        }
        let again = env.step(hold);
        assert_eq!(output, again);
        let and_again = env.step(hold);
        assert_eq!(output, and_again);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        let long_b = env.action_space().encode("B", Side::Long).unwrap();
        env.step(long_b);
        assert!(!env.events().is_empty());

        env.reset();
        assert_eq!(env.current_tick(), 1);
        assert!(env.events().is_empty());
        assert_eq!(env.portfolio().allocated().unwrap().0, "A");
    }

    #[test]
    fn disabled_reset_preserves_state() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        let long_b = env.action_space().encode("B", Side::Long).unwrap();
        env.step(long_b);
        env.disable_reset();
        env.reset();
        assert_eq!(env.events().len(), 1);
        assert_eq!(env.portfolio().allocated().unwrap().0, "B");
    }

    #[test]
    fn append_data_extends_the_run() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        let hold = env.action_space().encode("A", Side::Long).unwrap();
        let mut output = env.step(hold);
        while !output.done {
            output = env.step(hold);
        }
        assert!(env.is_done());

        let mut incoming = BTreeMap::new();
        incoming.insert(
            "A".to_string(),
            make_table("A", &[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0]),
        );
        incoming.insert(
            "B".to_string(),
            make_table("B", &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]),
        );
        env.append_data(&incoming).unwrap();

        assert!(!env.is_done());
        assert_eq!(env.frame_bound().end, 6);

        let output = env.step(hold);
        assert_eq!(env.current_tick(), 5);
        assert!(!output.done);
    }

    #[test]
    fn append_data_requires_every_symbol() {
        let mut env = two_symbol_env(
            &[10.0, 10.0, 10.0, 10.0, 10.0],
            &[10.0, 11.0, 12.0, 13.0, 14.0],
            1,
        );
        let mut incoming = BTreeMap::new();
        incoming.insert(
            "A".to_string(),
            make_table("A", &[10.0, 10.0, 10.0, 10.0, 10.0, 10.0]),
        );
        let err = env.append_data(&incoming).unwrap_err();
        assert!(matches!(err, PortsimError::AppendMissingSymbol { .. }));
    }

    #[test]
    fn single_slot_invariant_holds_across_random_walk() {
        let mut env = two_symbol_env(
            &[10.0, 10.5, 11.0, 10.2, 10.8, 10.4, 10.9, 11.2],
            &[20.0, 19.5, 19.0, 19.8, 20.2, 20.6, 20.1, 19.9],
            2,
        );
        for action in [0usize, 3, 1, 2, 0] {
            let output = env.step(action);
            let allocated = output
                .info
                .portfolio_allocation
                .values()
                .filter(|shares| **shares != 0.0)
                .count();
            assert!(allocated <= 1);
            if output.done {
                break;
            }
        }
    }
}
