//! Domain error types.

/// Top-level error type for indigraph.
///
/// Data errors (missing or sentinel values) are never reported through this
/// type; they surface as entries flagged `INSUFFICIENT_DATA`.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
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

    #[error("circular dependency: attaching {source_node} to {node} would make {node} its own upstream")]
    CircularDependency { node: String, source_node: String },

    #[error("dependency chain above {node} exceeds {max_hops} hops")]
    DependencyTooDeep { node: String, max_hops: usize },

    #[error("{node} requires a data source providing [{required}]")]
    MissingDataSource { node: String, required: String },

    #[error("{node} requires [{required}] but {source_node} provides [{provided}]")]
    IncompatibleCapabilities {
        node: String,
        source_node: String,
        required: String,
        provided: String,
    },

    #[error("mode {mode} out of range for {node} ({count} values per entry)")]
    ModeOutOfRange {
        node: String,
        mode: usize,
        count: usize,
    },

    #[error("out-of-order tick at {timestamp} ms: bucket {last_bucket} already started")]
    OutOfOrderTick { timestamp: i64, last_bucket: i64 },

    #[error("history gap: indices {from}..={to} could not be regenerated: {reason}")]
    HistoryGap { from: i64, to: i64, reason: String },

    #[error("invalid resource handle for {key}")]
    InvalidHandle { key: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Whether this error is a graph configuration error raised while wiring nodes.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            GraphError::CircularDependency { .. }
                | GraphError::DependencyTooDeep { .. }
                | GraphError::MissingDataSource { .. }
                | GraphError::IncompatibleCapabilities { .. }
                | GraphError::ModeOutOfRange { .. }
        )
    }
}

impl From<&GraphError> for std::process::ExitCode {
    fn from(err: &GraphError) -> Self {
        let code: u8 = match err {
            GraphError::Io(_) => 1,
            GraphError::ConfigParse { .. }
            | GraphError::ConfigMissing { .. }
            | GraphError::ConfigInvalid { .. } => 2,
            GraphError::Data { .. }
            | GraphError::HistoryGap { .. }
            | GraphError::InvalidHandle { .. } => 3,
            GraphError::CircularDependency { .. }
            | GraphError::DependencyTooDeep { .. }
            | GraphError::MissingDataSource { .. }
            | GraphError::IncompatibleCapabilities { .. }
            | GraphError::ModeOutOfRange { .. } => 4,
            GraphError::OutOfOrderTick { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
