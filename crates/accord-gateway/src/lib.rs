//! Accord Gateway Layer
//!
//! Wraps every call to the remote ledger in bounded exponential-backoff retry
//! nested inside a per-endpoint circuit breaker, and provides the ledger
//! adapters (HTTP and in-memory) behind a single trait.

pub mod error;
pub mod traits;
pub mod circuit_breaker;
pub mod retry;
pub mod gateway;
pub mod adapters;

pub use error::{GatewayError, LedgerError};
pub use traits::ILedgerGateway;
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use retry::RetryPolicy;
pub use gateway::RetryingGateway;
pub use adapters::http::HttpLedger;
pub use adapters::memory::{InMemoryLedger, LedgerOp};
