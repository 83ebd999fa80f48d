use thiserror::Error;

/// Common error type for PDU client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure: connect, DNS, timeout, body read.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered with a non-2xx HTTP status.
    #[error("Non-2xx status code in RPC response: {status}")]
    Http { status: reqwest::StatusCode },

    /// Malformed JSON-RPC envelope: undecodable body, missing result.
    #[error("RPC protocol error: {0}")]
    Protocol(String),

    /// Error object reported by the device.
    #[error("RPC error, code: {code}, \"{message}\", data: {data:?}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A bulk sub-call failed, or the response shape did not line up with
    /// the request list.
    #[error("Bulk call error: {0}")]
    Bulk(String),

    /// The operation is not supported by the device protocol.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using the client's Error.
pub type Result<T> = std::result::Result<T, Error>;
