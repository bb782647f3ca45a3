//! CSV file data adapter.
//!
//! One file per symbol, `{symbol}.csv`, first column a timestamp and every
//! remaining column numeric.

use crate::domain::error::PortsimError;
use crate::domain::table::SymbolTable;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

pub struct CsvTableAdapter {
    base_path: PathBuf,
}

impl CsvTableAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn parse_timestamp(value: &str) -> Result<NaiveDateTime, PortsimError> {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is valid"))
            })
            .map_err(|e| PortsimError::Data {
                reason: format!("invalid timestamp {:?}: {}", value, e),
            })
    }
}

impl DataPort for CsvTableAdapter {
    fn fetch_table(&self, symbol: &str) -> Result<SymbolTable, PortsimError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| PortsimError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());

        let headers = rdr.headers().map_err(|e| PortsimError::Data {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?;
        if headers.len() < 2 {
            return Err(PortsimError::Data {
                reason: format!(
                    "{} needs a timestamp column and at least one value column",
                    path.display()
                ),
            });
        }
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut table = SymbolTable::new(symbol, columns);
        for result in rdr.records() {
            let record = result.map_err(|e| PortsimError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            let timestamp = Self::parse_timestamp(record.get(0).unwrap_or_default())?;

            let mut values = Vec::with_capacity(record.len() - 1);
            for field in record.iter().skip(1) {
                let value: f64 = field.parse().map_err(|e| PortsimError::Data {
                    reason: format!("invalid value {:?} for {}: {}", field, symbol, e),
                })?;
                values.push(value);
            }
            table.push_row(timestamp, values)?;
        }
        Ok(table)
    }

    fn list_symbols(&self) -> Result<Vec<String>, PortsimError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PortsimError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PortsimError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
