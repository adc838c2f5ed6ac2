use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use cda_batch::BatchError;
use cda_bridge::BridgeError;

/// JSON-RPC 2.0 error codes.
pub mod rpc_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The ledger's record failed verification.
    pub const VERIFICATION_FAILED: i64 = -32001;
    /// The ledger could not be reached in time. Retryable.
    pub const UPSTREAM_FAILED: i64 = -32002;
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BatchError> for ServerError {
    fn from(e: BatchError) -> Self {
        Self::Bridge(BridgeError::Batch(e))
    }
}

impl ServerError {
    /// HTTP status for this error.
    ///
    /// Lifecycle misuse is the caller's fault, rejected ledger answers are
    /// unprocessable, and upstream failures are a bad gateway.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Bridge(e) => match e {
                BridgeError::Batch(BatchError::NotFound(_)) => StatusCode::NOT_FOUND,
                BridgeError::Batch(BatchError::Poisoned) => StatusCode::INTERNAL_SERVER_ERROR,
                BridgeError::Batch(b) if b.is_too_large() => StatusCode::PAYLOAD_TOO_LARGE,
                BridgeError::Batch(_) | BridgeError::InvalidDigest(_) => StatusCode::BAD_REQUEST,
                BridgeError::Verify(_) | BridgeError::DataMismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                BridgeError::UpstreamStoreFailed(_) | BridgeError::UpstreamFetchFailed(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error code for this error.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidRequest(_) => rpc_code::INVALID_REQUEST,
            Self::MethodNotFound(_) => rpc_code::METHOD_NOT_FOUND,
            Self::InvalidParams(_) | Self::PayloadTooLarge(_) => rpc_code::INVALID_PARAMS,
            Self::Bridge(e) if e.is_rejection() => rpc_code::VERIFICATION_FAILED,
            Self::Bridge(e) if e.is_retryable() => rpc_code::UPSTREAM_FAILED,
            Self::Bridge(BridgeError::Batch(BatchError::Poisoned)) => rpc_code::INTERNAL_ERROR,
            Self::Bridge(_) => rpc_code::INVALID_PARAMS,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => rpc_code::INTERNAL_ERROR,
        }
    }
}

/// REST errors carry the status and a message, never record data.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
