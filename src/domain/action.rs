//! Discrete action enumeration: two slots (long, short) per symbol.

use crate::domain::portfolio::Side;

/// Fixed mapping between action indices and (symbol, side) pairs.
///
/// Index `2 * i` selects symbol `i` long, `2 * i + 1` selects it short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    symbols: Vec<String>,
}

impl ActionSpace {
    pub fn new(symbols: Vec<String>) -> Self {
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Decode an action index. An out-of-range index is a programming error
    /// in the driver and fails fast.
    pub fn decode(&self, action: usize) -> (&str, Side) {
        assert!(
            action < self.len(),
            "action index {action} out of range for {} actions",
            self.len()
        );
        let side = if action % 2 == 0 {
            Side::Long
        } else {
            Side::Short
        };
        (&self.symbols[action / 2], side)
    }

    pub fn encode(&self, symbol: &str, side: Side) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol).map(|i| {
            i * 2
                + match side {
                    Side::Long => 0,
                    Side::Short => 1,
                }
        })
    }
}
