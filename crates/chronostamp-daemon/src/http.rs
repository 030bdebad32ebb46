//! HTTP surface for the claim service.
//!
//! Three request/response contracts ride on this router:
//!
//! - `POST /claims/authorize` - validate a claim attempt and issue a
//!   signed `(nonce, signature)` authorization
//! - `POST /claims/record` - record a confirmed on-chain mint exactly once
//! - `GET  /claims/:address` - list an address's stamps
//!
//! plus `POST /events` as the organizer-facing data producer and
//! `GET /healthz` as the signer health probe.
//!
//! Every failure carries a stable machine-readable kind and a human
//! message; internal error text never reaches the wire.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chronostamp_core::claim::{
    AuthorizeRequest, ClaimError, ClaimOrchestrator, RecordRequest,
};
use chronostamp_core::ledger::{EventRecord, LedgerError, NewEvent};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shared handler state.
pub type SharedOrchestrator = Arc<ClaimOrchestrator>;

/// Builds the service router.
#[must_use]
pub fn router(orchestrator: SharedOrchestrator) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/events", post(create_event))
        .route("/claims/authorize", post(authorize))
        .route("/claims/record", post(record))
        .route("/claims/:address", get(user_claims))
        .with_state(orchestrator)
}

/// A claim-flow failure shaped for the wire.
#[derive(Debug)]
pub struct ApiError(ClaimError);

impl ApiError {
    /// Maps the error taxonomy onto HTTP status codes:
    ///
    /// - `InvalidInput`, `ContractNotDeployed`, window errors: 400
    /// - `EventNotFound`: 404
    /// - `AlreadyClaimed`, `AlreadyRecorded`: 409
    /// - `SoldOut`: 410
    /// - `StorageUnavailable`: 503
    /// - `ServerMisconfigured`, anything internal: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match &self.0 {
            ClaimError::InvalidInput { .. }
            | ClaimError::ContractNotDeployed
            | ClaimError::ClaimingNotYetOpen
            | ClaimError::ClaimingClosed => StatusCode::BAD_REQUEST,
            ClaimError::EventNotFound => StatusCode::NOT_FOUND,
            ClaimError::AlreadyClaimed | ClaimError::AlreadyRecorded => StatusCode::CONFLICT,
            ClaimError::SoldOut => StatusCode::GONE,
            ClaimError::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ClaimError> for ApiError {
    fn from(error: ClaimError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

async fn health(State(orchestrator): State<SharedOrchestrator>) -> Response {
    match orchestrator.signer().validate_config() {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(e) => {
            warn!(error = %e, "health check failed");
            ApiError(ClaimError::ServerMisconfigured).into_response()
        }
    }
}

async fn authorize(
    State(orchestrator): State<SharedOrchestrator>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<Response, ApiError> {
    let authorization = orchestrator.authorize(&request)?;
    Ok(Json(authorization).into_response())
}

async fn record(
    State(orchestrator): State<SharedOrchestrator>,
    Json(request): Json<RecordRequest>,
) -> Result<Response, ApiError> {
    let recorded = orchestrator.record(&request)?;
    Ok(Json(recorded).into_response())
}

async fn user_claims(
    State(orchestrator): State<SharedOrchestrator>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let stamps = orchestrator.stamps_for_user(&address)?;
    Ok(Json(stamps).into_response())
}

/// Organizer request to create an event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// Join code attendees will enter; uppercased on write.
    pub event_code: String,
    /// Display name.
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Stamp artwork URL.
    #[serde(default)]
    pub image_url: String,
    /// Human-readable event date.
    #[serde(default)]
    pub event_date: String,
    /// Organizer display name.
    #[serde(default)]
    pub organizer: String,
    /// On-chain contract address, when already deployed.
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Supply cap; omit for unbounded.
    #[serde(default)]
    pub max_supply: Option<u32>,
    /// Claim window start (unix seconds).
    #[serde(default)]
    pub claim_start: Option<i64>,
    /// Claim window end (unix seconds).
    #[serde(default)]
    pub claim_end: Option<i64>,
}

/// Event shape returned to organizers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    /// Ledger id.
    pub id: i64,
    /// Join code, uppercased.
    pub event_code: String,
    /// Display name.
    pub name: String,
    /// On-chain contract address, if deployed.
    pub contract_address: Option<String>,
    /// Supply cap, if bounded.
    pub max_supply: Option<u32>,
    /// Claims recorded so far.
    pub total_claimed: u32,
}

impl From<EventRecord> for EventResponse {
    fn from(event: EventRecord) -> Self {
        Self {
            id: event.id,
            event_code: event.event_code,
            name: event.name,
            contract_address: event.contract_address,
            max_supply: event.max_supply,
            total_claimed: event.total_claimed,
        }
    }
}

async fn create_event(
    State(orchestrator): State<SharedOrchestrator>,
    Json(request): Json<CreateEventRequest>,
) -> Result<Response, ApiError> {
    if request.event_code.trim().is_empty() || request.name.trim().is_empty() {
        return Err(ClaimError::InvalidInput {
            reason: "event code and name are required".to_string(),
        }
        .into());
    }

    let created = orchestrator.ledger().create_event(&NewEvent {
        event_code: request.event_code,
        name: request.name,
        description: request.description,
        image_url: request.image_url,
        event_date: request.event_date,
        organizer: request.organizer,
        contract_address: request.contract_address,
        max_supply: request.max_supply,
        claim_start: request.claim_start,
        claim_end: request.claim_end,
    });

    match created {
        Ok(event) => Ok((StatusCode::CREATED, Json(EventResponse::from(event))).into_response()),
        Err(LedgerError::DuplicateEventCode { code }) => {
            let body = serde_json::json!({
                "error": "duplicate_event_code",
                "message": format!("event code already in use: {code}"),
            });
            Ok((StatusCode::CONFLICT, Json(body)).into_response())
        }
        Err(e) => Err(ClaimError::from(e).into()),
    }
}
