use std::time::Duration;

/// Errors raised by a ledger adapter for a single request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("ledger returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("ledger rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl LedgerError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::Server { .. }
        )
    }
}

/// Errors surfaced by the retrying gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The endpoint's breaker is open; no request was made.
    #[error("circuit open for {endpoint}, retry after {retry_after:?}")]
    CircuitOpen {
        endpoint: String,
        retry_after: Duration,
    },

    /// The operation failed after `attempts` tries.
    #[error("{operation} on {endpoint} failed after {attempts} attempt(s): {source}")]
    Ledger {
        endpoint: String,
        operation: &'static str,
        attempts: u32,
        #[source]
        source: LedgerError,
    },
}

impl GatewayError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// The underlying ledger error, if a request was actually made.
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            Self::Ledger { source, .. } => Some(source),
            Self::CircuitOpen { .. } => None,
        }
    }
}
