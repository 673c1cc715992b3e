use std::fmt;

/// Typed errors for bounded list construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The memory threshold must be positive, a zero threshold would rotate on
    /// every prepend
    ZeroMemoryThreshold,
    /// The history ring needs at least two slots to separate the newest
    /// historic segment from the eviction candidate
    HistoryTooShort {
        /// The rejected ring length
        got: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroMemoryThreshold => {
                write!(f, "memory threshold must be greater than zero")
            }
            ConfigError::HistoryTooShort { got } => {
                write!(f, "max history must be at least 2, got {}", got)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
