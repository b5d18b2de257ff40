//! Route handlers implementing the bridge HTTP contract.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::auth::{ApiKey, InstanceToken, MaybeInstanceToken};
use super::AppState;
use crate::common::AppError;
use crate::registry::{
    DispatchedMessage, HealthSnapshot, InstanceSnapshot, NumberCheck, PairingOutcome,
};
use crate::transport::ProfileInfo;

/// Status string reported for tokens with no registry entry.
const NOT_INITIALIZED: &str = "not_initialized";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub instances: HealthSnapshot,
}

#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub success: bool,
    pub token: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub token: String,
    pub ready: bool,
    #[serde(rename = "hasQr")]
    pub has_qr: bool,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub qr: Option<String>,
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub number: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(flatten)]
    pub dispatched: DispatchedMessage,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub token: String,
    #[serde(flatten)]
    pub profile: ProfileInfo,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub success: bool,
    pub token: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instances: state.registry.health(),
    })
}

pub async fn init(
    State(state): State<AppState>,
    _auth: ApiKey,
    MaybeInstanceToken(header_token): MaybeInstanceToken,
    body: Option<Json<InitRequest>>,
) -> Result<Json<LifecycleResponse>, AppError> {
    let body_token = body.and_then(|Json(req)| req.token);
    let token = header_token
        .or(body_token)
        .ok_or_else(|| AppError::BadRequest("missing instance token".to_string()))?;

    let snapshot = state.registry.init(&token).await?;
    Ok(Json(lifecycle_response(snapshot)))
}

pub async fn status(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
) -> Json<StatusResponse> {
    match state.registry.status(&token) {
        Some(snapshot) => Json(StatusResponse {
            token,
            ready: snapshot.ready,
            has_qr: snapshot.has_qr,
            status: snapshot.status.as_str().to_string(),
        }),
        // unknown token is an answer here, not an error
        None => Json(StatusResponse {
            token,
            ready: false,
            has_qr: false,
            status: NOT_INITIALIZED.to_string(),
        }),
    }
}

pub async fn qr(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
) -> Json<QrResponse> {
    let response = match state.registry.pairing(&token) {
        PairingOutcome::NotInitialized => QrResponse {
            qr: None,
            status: NOT_INITIALIZED,
            message: "Instance not found. Initialize connection first.".to_string(),
        },
        PairingOutcome::Ready { qr } => QrResponse {
            qr: Some(qr),
            status: "qr_ready",
            message: "QR code ready for scanning".to_string(),
        },
        PairingOutcome::AlreadyConnected => QrResponse {
            qr: None,
            status: "already_connected",
            message: "Instance is already connected".to_string(),
        },
        PairingOutcome::NotReady { status } => QrResponse {
            qr: None,
            status: "not_ready",
            message: format!("QR code not available while {status}"),
        },
    };
    Json(response)
}

pub async fn number_id(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
    Path(number): Path<String>,
) -> Result<Json<NumberCheck>, AppError> {
    let check = state.registry.number_id(&token, &number).await?;
    Ok(Json(check))
}

pub async fn send(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, AppError> {
    let (Some(number), Some(message)) = (request.number, request.message) else {
        return Err(AppError::BadRequest(
            "number and message are required".to_string(),
        ));
    };
    if number.trim().is_empty() || message.is_empty() {
        return Err(AppError::BadRequest(
            "number and message are required".to_string(),
        ));
    }

    let dispatched = state.registry.send(&token, &number, &message).await?;
    Ok(Json(SendResponse {
        success: true,
        dispatched,
    }))
}

pub async fn info(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
) -> Result<Json<InfoResponse>, AppError> {
    let profile = state.registry.profile_info(&token)?;
    Ok(Json(InfoResponse { token, profile }))
}

pub async fn logout(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
) -> Result<Json<LifecycleResponse>, AppError> {
    let snapshot = state.registry.logout(&token).await?;
    Ok(Json(lifecycle_response(snapshot)))
}

pub async fn restart(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
) -> Result<Json<LifecycleResponse>, AppError> {
    let snapshot = state.registry.restart(&token).await?;
    Ok(Json(lifecycle_response(snapshot)))
}

pub async fn remove(
    State(state): State<AppState>,
    _auth: ApiKey,
    InstanceToken(token): InstanceToken,
) -> Result<Json<RemoveResponse>, AppError> {
    state.registry.remove(&token).await?;
    Ok(Json(RemoveResponse {
        success: true,
        token,
    }))
}

pub async fn list_instances(
    State(state): State<AppState>,
    _auth: ApiKey,
) -> Json<Vec<InstanceSnapshot>> {
    Json(state.registry.list())
}

pub async fn unknown_route() -> AppError {
    AppError::NotFound("unknown route".to_string())
}

fn lifecycle_response(snapshot: InstanceSnapshot) -> LifecycleResponse {
    LifecycleResponse {
        success: true,
        token: snapshot.token,
        status: snapshot.status.as_str().to_string(),
    }
}
