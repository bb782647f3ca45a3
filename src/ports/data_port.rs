//! Market data access port trait.

use crate::domain::error::PortsimError;
use crate::domain::table::SymbolTable;

pub trait DataPort {
    /// Load the full per-symbol table: timestamps plus every numeric column.
    fn fetch_table(&self, symbol: &str) -> Result<SymbolTable, PortsimError>;

    fn list_symbols(&self) -> Result<Vec<String>, PortsimError>;
}
