//! HTTP routes for appending, syncing, validating and resetting the chain.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::chain::ChainFault;
use crate::error::LedgerError;
use crate::model::Block;
use crate::AppState;

/// `{ "error": message }` body for failed requests.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler error: maps ledger failures and rejected bodies onto status codes.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    /// The request body could not be read as the expected JSON.
    BadBody(&'static str),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "rejected request body");
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => "expected Content-Type: application/json",
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "request body has the wrong shape",
            _ => "request body could not be read",
        };
        Self::BadBody(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadBody(message) => (StatusCode::BAD_REQUEST, message.to_string()),
            Self::Ledger(e) => {
                let status = match &e {
                    LedgerError::SignatureInvalid | LedgerError::InvalidSequence { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                warn!(status = %status, error = %e, "request failed");
                (status, e.to_string())
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// GET /chain
pub async fn get_chain(State(state): State<AppState>) -> Result<Json<Vec<Block>>, ApiError> {
    let chain = state.ledger.chain().await?;
    Ok(Json(chain.into_blocks()))
}

#[derive(Serialize)]
pub struct AddBlockResp {
    pub message: &'static str,
    pub block: Block,
}

/// POST /add-block — body is the block payload.
pub async fn add_block(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AddBlockResp>, ApiError> {
    let Json(data) = payload?;
    let block = state.ledger.append(data).await?;
    // Outside the chain lock; the response does not wait on peers.
    state.peers.broadcast(&block);
    Ok(Json(AddBlockResp {
        message: "Block added",
        block,
    }))
}

#[derive(Serialize)]
pub struct MessageResp {
    pub message: String,
}

/// POST /sync-block — a block pushed by a peer.
pub async fn sync_block(
    State(state): State<AppState>,
    payload: Result<Json<Block>, JsonRejection>,
) -> Result<Json<MessageResp>, ApiError> {
    let Json(block) = payload?;
    state.ledger.accept_peer_block(block).await?;
    Ok(Json(MessageResp {
        message: "Synced successfully".into(),
    }))
}

#[derive(Serialize)]
pub struct ValidateResp {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<ChainFault>,
}

/// GET /validate
pub async fn validate_chain(State(state): State<AppState>) -> Result<Json<ValidateResp>, ApiError> {
    let fault = state.ledger.validate().await?;
    Ok(Json(ValidateResp {
        valid: fault.is_none(),
        reason: fault.map(|f| f.to_string()),
        fault,
    }))
}

#[derive(Serialize)]
pub struct ResetResp {
    pub message: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

/// POST /reset — archive the chain file and start a new genesis chain.
pub async fn reset(State(state): State<AppState>) -> Result<Json<ResetResp>, ApiError> {
    let outcome = state.ledger.reset().await?;
    Ok(Json(ResetResp {
        message: format!("{} reset successfully", state.node_name),
        file: outcome.file.display().to_string(),
        backup: outcome.backup.map(|p| p.display().to_string()),
    }))
}

/// GET /pubkey — hex verifying key
#[derive(Serialize)]
pub struct PubKeyResp {
    pub pubkey_hex: String,
}
pub async fn pubkey(State(state): State<AppState>) -> Json<PubKeyResp> {
    Json(PubKeyResp {
        pubkey_hex: state.ledger.store().keys().public_hex(),
    })
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub node: String,
}
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        node: state.node_name.to_string(),
    })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
