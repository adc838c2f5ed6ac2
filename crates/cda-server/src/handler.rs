use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::rpc::{self, RpcRequest, RpcResponse};
use crate::state::AppState;

/// Body of a successful `GET /get-by-hash/{digest}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetByHashResponse {
    pub certificate: String,
    pub witness: String,
    pub data: String,
    pub canister: String,
    pub expiration_policy: String,
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "cda-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// JSON-RPC entry point.
///
/// Errors use the HTTP status of their class and a JSON-RPC error body.
pub async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = ServerError::InvalidRequest(e.to_string());
            let mut response = RpcResponse::failure(Value::Null, &error);
            if let Some(err) = response.error.as_mut() {
                err.code = crate::error::rpc_code::PARSE_ERROR;
            }
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    debug!(method = %request.method, "rpc call");
    match rpc::dispatch(&state, &request).await {
        Ok(result) => Json(RpcResponse::success(request.id, result)).into_response(),
        Err(error) => {
            warn!(method = %request.method, status = %error.status(), "rpc call failed: {error}");
            (error.status(), Json(RpcResponse::failure(request.id, &error))).into_response()
        }
    }
}

/// Serve a stored record by content digest, only after it verifies.
pub async fn get_by_hash_handler(
    State(state): State<AppState>,
    Path(digest): Path<String>,
) -> ServerResult<Json<GetByHashResponse>> {
    let fetched = state.bridge.fetch_by_hex(&digest).await.inspect_err(|e| {
        warn!(digest = %digest, "get-by-hash rejected: {e}");
    })?;
    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(Json(GetByHashResponse {
        certificate: b64.encode(&fetched.record.certificate),
        witness: b64.encode(&fetched.record.witness),
        data: b64.encode(&fetched.record.data),
        canister: state.bridge.owner().to_text(),
        expiration_policy: String::new(),
    }))
}
