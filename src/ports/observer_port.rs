//! Simulation observer port trait.

use crate::domain::error::PortsimError;
use crate::domain::portfolio::Portfolio;

/// Receives lifecycle callbacks from a running simulation.
///
/// Callback failures are reported back so wrappers can decide policy; the
/// environment itself never lets an observer error interrupt stepping.
pub trait ObserverPort {
    /// New market rows were appended to the environment's tables.
    fn notify_new_data(&mut self) -> Result<(), PortsimError>;

    /// The allocation moved; both the before and after ledgers are provided.
    fn notify_portfolio_change(
        &mut self,
        old: &Portfolio,
        new: &Portfolio,
    ) -> Result<(), PortsimError>;

    /// Observation started against the given ledger state.
    fn notify_begin_of_observation(&mut self, portfolio: &Portfolio) -> Result<(), PortsimError>;
}
