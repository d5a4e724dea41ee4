//! Crate-level error types.
//!
//! [`MirrorError`] unifies every error source (configuration, WebSocket,
//! JSON, gateway rejections) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for
//! easy propagation.

use crate::models::order::OrderError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// A configuration value was missing or could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading from or writing to a local stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The ledger answered the request with a failure.
    #[error("{method} rejected by ledger: {reason}")]
    Rejected { method: String, reason: String },

    /// The ledger did not answer within the configured timeout.
    #[error("{method} timed out")]
    Timeout { method: String },

    /// The gateway connection closed before a response arrived.
    #[error("gateway disconnected")]
    Disconnected,

    /// A pair symbol cannot be encoded as a 32-byte ticker.
    #[error("invalid ticker: {0}")]
    InvalidTicker(String),

    /// The ledger lists no pair besides the base asset.
    #[error("ledger lists no tradeable pairs")]
    NoTradeablePairs,

    /// The requested pair is not one of the tradeable pairs.
    #[error("unknown pair: {0}")]
    UnknownPair(String),

    /// A deposit or withdrawal amount was zero.
    #[error("amount must be positive")]
    InvalidAmount,

    /// An order failed local validation before submission.
    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    /// An amount could not be converted between display and native units.
    #[error("unit conversion error: {0}")]
    Units(String),
}
