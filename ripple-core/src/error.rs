//! Error types for the reactive runtime.
//!
//! Most failure modes in the engine are not errors at all: user callbacks
//! that panic unwind straight through, and misuse such as wrapping a scalar
//! with `reactive` only logs a warning. The variants here cover the few
//! conditions a caller is expected to handle.

use thiserror::Error;

/// Errors reported by the runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The scheduler kept finding new work after the configured number of
    /// flush passes. The queue has been cleared.
    #[error(
        "possible infinite reactive loop: effect queue still busy after \
         {iterations} flush iterations ({pending} effects were pending)"
    )]
    InfiniteLoop { iterations: usize, pending: usize },

    /// A handle outlived the runtime that created it.
    #[error("the reactive runtime backing this handle has been dropped")]
    RuntimeDropped,

    /// A configuration value is out of range.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    /// A configuration document could not be parsed.
    #[error("failed to parse runtime configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_loop_message_names_the_cap() {
        let err = ReactiveError::InfiniteLoop {
            iterations: 100,
            pending: 2,
        };
        let message = err.to_string();
        assert!(message.contains("infinite reactive loop"));
        assert!(message.contains("100"));
    }

    #[test]
    fn json_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ReactiveError = parse.into();
        assert!(matches!(err, ReactiveError::ConfigParse(_)));
    }
}
