//! Observer adapters: logging sink, fan-out, and failure isolation.

use crate::domain::error::PortsimError;
use crate::domain::portfolio::Portfolio;
use crate::ports::observer_port::ObserverPort;
use tracing::{info, warn};

/// Writes simulation lifecycle events to the log.
#[derive(Debug, Default)]
pub struct LogObserver;

fn describe(portfolio: &Portfolio) -> String {
    match portfolio.allocated() {
        Some((symbol, side, position)) => {
            format!("{} {} {:.4} shares", side, symbol, position.shares.abs())
        }
        None => "flat".to_string(),
    }
}

impl ObserverPort for LogObserver {
    fn notify_new_data(&mut self) -> Result<(), PortsimError> {
        info!("new market data appended");
        Ok(())
    }

    fn notify_portfolio_change(
        &mut self,
        old: &Portfolio,
        new: &Portfolio,
    ) -> Result<(), PortsimError> {
        info!(from = describe(old), to = describe(new), "allocation moved");
        Ok(())
    }

    fn notify_begin_of_observation(&mut self, portfolio: &Portfolio) -> Result<(), PortsimError> {
        info!(portfolio = describe(portfolio), "observation started");
        Ok(())
    }
}

/// Fans every notification out to each wrapped observer.
///
/// All observers are notified even when an earlier one fails; the first
/// error is returned after the pass completes.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn ObserverPort>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Box<dyn ObserverPort>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn fan_out(
        &mut self,
        mut notify: impl FnMut(&mut Box<dyn ObserverPort>) -> Result<(), PortsimError>,
    ) -> Result<(), PortsimError> {
        let mut first_error = None;
        for observer in &mut self.observers {
            if let Err(err) = notify(observer)
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ObserverPort for CompositeObserver {
    fn notify_new_data(&mut self) -> Result<(), PortsimError> {
        self.fan_out(|observer| observer.notify_new_data())
    }

    fn notify_portfolio_change(
        &mut self,
        old: &Portfolio,
        new: &Portfolio,
    ) -> Result<(), PortsimError> {
        self.fan_out(|observer| observer.notify_portfolio_change(old, new))
    }

    fn notify_begin_of_observation(&mut self, portfolio: &Portfolio) -> Result<(), PortsimError> {
        self.fan_out(|observer| observer.notify_begin_of_observation(portfolio))
    }
}

/// Swallows the wrapped observer's errors after logging them, so one broken
/// sink cannot disturb the simulation or its sibling observers.
pub struct SafeObserver {
    inner: Box<dyn ObserverPort>,
}

impl SafeObserver {
    pub fn new(inner: Box<dyn ObserverPort>) -> Self {
        Self { inner }
    }

    fn suppress(result: Result<(), PortsimError>, callback: &str) -> Result<(), PortsimError> {
        if let Err(err) = result {
            warn!("observer failed on {callback}: {err}");
        }
        Ok(())
    }
}

impl ObserverPort for SafeObserver {
    fn notify_new_data(&mut self) -> Result<(), PortsimError> {
        Self::suppress(self.inner.notify_new_data(), "new data")
    }

    fn notify_portfolio_change(
        &mut self,
        old: &Portfolio,
        new: &Portfolio,
    ) -> Result<(), PortsimError> {
        Self::suppress(
            self.inner.notify_portfolio_change(old, new),
            "portfolio change",
        )
    }

    fn notify_begin_of_observation(&mut self, portfolio: &Portfolio) -> Result<(), PortsimError> {
        Self::suppress(
            self.inner.notify_begin_of_observation(portfolio),
            "begin of observation",
        )
    }
}
