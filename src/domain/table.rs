//! Per-symbol time-indexed tables of numeric columns.

use crate::domain::error::PortsimError;
use chrono::NaiveDateTime;

/// A time-indexed table of numeric columns for one symbol.
///
/// Rows are kept in ascending timestamp order. The table is the raw input to
/// the feature preprocessor; live mode grows it via [`SymbolTable::splice`].
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    symbol: String,
    columns: Vec<String>,
    timestamps: Vec<NaiveDateTime>,
    rows: Vec<Vec<f64>>,
}

impl SymbolTable {
    pub fn new(symbol: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            symbol: symbol.into(),
            columns,
            timestamps: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<f64>, PortsimError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| PortsimError::MissingColumn {
                symbol: self.symbol.clone(),
                column: name.to_string(),
            })?;
        Ok(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Append a row, keeping timestamp order. Out-of-order or wrong-arity
    /// rows are rejected.
    pub fn push_row(
        &mut self,
        timestamp: NaiveDateTime,
        values: Vec<f64>,
    ) -> Result<(), PortsimError> {
        if values.len() != self.columns.len() {
            return Err(PortsimError::Data {
                reason: format!(
                    "row for {} has {} values, table has {} columns",
                    self.symbol,
                    values.len(),
                    self.columns.len()
                ),
            });
        }
        if let Some(last) = self.last_timestamp()
            && timestamp <= last
        {
            return Err(PortsimError::Data {
                reason: format!(
                    "row for {} at {} is not after last timestamp {}",
                    self.symbol, timestamp, last
                ),
            });
        }
        self.timestamps.push(timestamp);
        self.rows.push(values);
        Ok(())
    }

    /// Splice newly arrived rows onto this table.
    ///
    /// Only rows strictly after the last known timestamp are taken. The
    /// incoming table must reach back to the last known timestamp or earlier
    /// so that continuity is verifiable; otherwise the series would silently
    /// skip rows and the feature matrices would misalign across symbols.
    /// Returns the number of rows appended.
    pub fn splice(&mut self, incoming: &SymbolTable) -> Result<usize, PortsimError> {
        if incoming.columns != self.columns {
            return Err(PortsimError::AppendColumns {
                symbol: self.symbol.clone(),
                reason: format!(
                    "expected {:?}, got {:?}",
                    self.columns, incoming.columns
                ),
            });
        }

        let Some(last) = self.last_timestamp() else {
            // Empty table: take everything.
            self.timestamps = incoming.timestamps.clone();
            self.rows = incoming.rows.clone();
            return Ok(self.rows.len());
        };

        let Some(first_incoming) = incoming.timestamps.first() else {
            return Err(PortsimError::AppendGap {
                symbol: self.symbol.clone(),
            });
        };
        if *first_incoming > last {
            return Err(PortsimError::AppendGap {
                symbol: self.symbol.clone(),
            });
        }

        let mut appended = 0;
        for (ts, row) in incoming.timestamps.iter().zip(&incoming.rows) {
            if *ts > last {
                self.timestamps.push(*ts);
                self.rows.push(row.clone());
                appended += 1;
            }
        }
        Ok(appended)
    }
}
