//! Domain error types.

/// Top-level error type for portsim.
#[derive(Debug, thiserror::Error)]
pub enum PortsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no table for symbol {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("column {column} not found in table for {symbol}")]
    MissingColumn { symbol: String, column: String },

    #[error("initial allocation is empty")]
    EmptyAllocation,

    #[error("initial portfolio value is zero")]
    ZeroInitialValue,

    #[error("no valid prices for {symbol}: every entry is zero or negative")]
    NoValidPrices { symbol: String },

    #[error("window size {window_size} too large for {available} available rows")]
    WindowTooLarge { window_size: usize, available: usize },

    #[error("appended rows for {symbol} leave a gap after the last known timestamp")]
    AppendGap { symbol: String },

    #[error("appended table for {symbol} has mismatched columns: {reason}")]
    AppendColumns { symbol: String, reason: String },

    #[error("symbol {symbol} missing from appended data")]
    AppendMissingSymbol { symbol: String },

    #[error("observer failure: {reason}")]
    Observer { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PortsimError> for std::process::ExitCode {
    fn from(err: &PortsimError) -> Self {
        let code: u8 = match err {
            PortsimError::Io(_) => 1,
            PortsimError::ConfigParse { .. }
            | PortsimError::ConfigMissing { .. }
            | PortsimError::ConfigInvalid { .. } => 2,
            PortsimError::Data { .. }
            | PortsimError::UnknownSymbol { .. }
            | PortsimError::MissingColumn { .. } => 3,
            PortsimError::EmptyAllocation
            | PortsimError::ZeroInitialValue
            | PortsimError::NoValidPrices { .. }
            | PortsimError::WindowTooLarge { .. } => 4,
            PortsimError::AppendGap { .. }
            | PortsimError::AppendColumns { .. }
            | PortsimError::AppendMissingSymbol { .. } => 5,
            PortsimError::Observer { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
