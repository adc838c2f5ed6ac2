//! JSON-RPC 2.0 surface of the chunked store.
//!
//! Quantities and byte strings travel as `0x`-prefixed hex strings in
//! positional params:
//!
//! - `das_startChunkedStore [timestamp, nChunks, chunkSize, totalSize, timeout, sig]`
//! - `das_sendChunk [batchId, chunkId, message, sig]`
//! - `das_commitChunkedStore [batchId, sig]`
//!
//! Caller signatures are decoded for well-formedness but not checked.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use cda_types::{BatchId, BatchSpec, CommitReceipt};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub const START_CHUNKED_STORE: &str = "das_startChunkedStore";
pub const SEND_CHUNK: &str = "das_sendChunk";
pub const COMMIT_CHUNKED_STORE: &str = "das_commitChunkedStore";

#[derive(Clone, Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: &ServerError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code: error.rpc_code(),
                message: error.to_string(),
            }),
            id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChunkedStoreReply {
    pub batch_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendChunkReply {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitChunkedStoreReply {
    pub data_hash: String,
    pub timeout: String,
    pub signers_mask: String,
    pub keyset_hash: String,
    pub sig: String,
    pub version: String,
}

impl From<&CommitReceipt> for CommitChunkedStoreReply {
    fn from(receipt: &CommitReceipt) -> Self {
        Self {
            data_hash: receipt.digest.to_prefixed_hex(),
            timeout: quantity(receipt.timeout),
            signers_mask: quantity(receipt.signers_mask),
            keyset_hash: receipt.keyset_digest.to_prefixed_hex(),
            sig: format!("0x{}", hex::encode(&receipt.signature)),
            version: quantity(receipt.version),
        }
    }
}

/// Run one JSON-RPC call against the bridge.
pub async fn dispatch(state: &AppState, request: &RpcRequest) -> ServerResult<Value> {
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return Err(ServerError::InvalidRequest("jsonrpc must be \"2.0\"".into()));
    }
    let params = Params::new(&request.method, &request.params)?;
    let reply = match request.method.as_str() {
        START_CHUNKED_STORE => to_value(start_chunked_store(state, &params)?)?,
        SEND_CHUNK => to_value(send_chunk(state, &params)?)?,
        COMMIT_CHUNKED_STORE => to_value(commit_chunked_store(state, &params).await?)?,
        other => return Err(ServerError::MethodNotFound(other.to_string())),
    };
    Ok(reply)
}

fn start_chunked_store(state: &AppState, params: &Params<'_>) -> ServerResult<StartChunkedStoreReply> {
    params.expect_len(6)?;
    let _timestamp = params.quantity(0, "timestamp")?;
    let n_chunks = params.quantity(1, "nChunks")?;
    let chunk_size = params.quantity(2, "chunkSize")?;
    let total_size = params.quantity(3, "totalSize")?;
    let timeout = params.quantity(4, "timeout")?;
    let _sig = params.data(5, "sig")?;

    let limits = &state.limits;
    if chunk_size > limits.max_chunk_size {
        return Err(ServerError::PayloadTooLarge(format!(
            "chunkSize {chunk_size} exceeds {}",
            limits.max_chunk_size
        )));
    }
    let announced = n_chunks.checked_mul(chunk_size).unwrap_or(u64::MAX).max(total_size);
    if announced > limits.max_batch_size {
        return Err(ServerError::PayloadTooLarge(format!(
            "batch of {announced} bytes exceeds {}",
            limits.max_batch_size
        )));
    }

    let total_size = (total_size > 0).then_some(total_size);
    let spec = BatchSpec {
        timeout_hint: timeout,
        expected_chunks: (n_chunks > 0).then_some(n_chunks),
        total_size,
        max_chunk_size: Some(if chunk_size > 0 { chunk_size } else { limits.max_chunk_size }),
        max_size: Some(total_size.map_or(limits.max_batch_size, |t| t.min(limits.max_batch_size))),
    };
    let id = state.bridge.store().create_batch(spec)?;
    debug!(batch_id = %id, n_chunks, ?total_size, "chunked store started");
    Ok(StartChunkedStoreReply {
        batch_id: id.to_prefixed_hex(),
    })
}

fn send_chunk(state: &AppState, params: &Params<'_>) -> ServerResult<SendChunkReply> {
    params.expect_len(4)?;
    let id = BatchId::new(params.quantity(0, "batchId")?);
    let index = params.quantity(1, "chunkId")?;
    let message = params.data(2, "message")?;
    let _sig = params.data(3, "sig")?;
    state.bridge.store().insert_chunk(id, index, &message)?;
    Ok(SendChunkReply {})
}

async fn commit_chunked_store(
    state: &AppState,
    params: &Params<'_>,
) -> ServerResult<CommitChunkedStoreReply> {
    params.expect_len(2)?;
    let id = BatchId::new(params.quantity(0, "batchId")?);
    let _sig = params.data(1, "sig")?;
    let receipt = state.bridge.commit_batch(id).await?;
    Ok(CommitChunkedStoreReply::from(&receipt))
}

/// Positional string params of one call.
struct Params<'a> {
    method: &'a str,
    values: &'a [Value],
}

impl<'a> Params<'a> {
    fn new(method: &'a str, params: &'a Value) -> ServerResult<Self> {
        match params {
            Value::Array(values) => Ok(Self { method, values }),
            Value::Null => Ok(Self { method, values: &[] }),
            _ => Err(ServerError::InvalidParams(format!("{method}: params must be an array"))),
        }
    }

    fn expect_len(&self, len: usize) -> ServerResult<()> {
        if self.values.len() == len {
            Ok(())
        } else {
            Err(ServerError::InvalidParams(format!(
                "{}: expected {len} params, got {}",
                self.method,
                self.values.len()
            )))
        }
    }

    fn hex_str(&self, index: usize, name: &str) -> ServerResult<&'a str> {
        self.values
            .get(index)
            .and_then(Value::as_str)
            .and_then(|s| s.strip_prefix("0x"))
            .ok_or_else(|| {
                ServerError::InvalidParams(format!("{}: {name} must be a 0x-prefixed string", self.method))
            })
    }

    fn quantity(&self, index: usize, name: &str) -> ServerResult<u64> {
        let digits = self.hex_str(index, name)?;
        if digits.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(digits, 16)
            .map_err(|e| ServerError::InvalidParams(format!("{}: {name}: {e}", self.method)))
    }

    fn data(&self, index: usize, name: &str) -> ServerResult<Vec<u8>> {
        let digits = self.hex_str(index, name)?;
        hex::decode(digits).map_err(|e| ServerError::InvalidParams(format!("{}: {name}: {e}", self.method)))
    }
}

fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

fn to_value<T: Serialize>(reply: T) -> ServerResult<Value> {
    serde_json::to_value(reply).map_err(|e| ServerError::Internal(e.to_string()))
}
