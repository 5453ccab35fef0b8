//! HTTP surface of a cluster node.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::application::context::NodeContext;
use crate::application::error::HttpError;
use crate::application::reader::ContentReader;
use crate::application::repos::RepoError;
use crate::cache::payload;
use crate::cluster::{Ack, BroadcastReport, DistributedCache, Envelope, Receipt, WireMessage};
use crate::domain::ContentId;
use crate::refresher::CONTENT_REFRESHER_ID;

pub const MESSAGES_PATH: &str = "/cluster/messages";
pub const PUBLISH_PATH: &str = "/cluster/publish";

#[derive(Clone)]
pub struct HttpState {
    pub cluster: Arc<DistributedCache>,
    pub reader: ContentReader,
}

impl From<&NodeContext> for HttpState {
    fn from(node: &NodeContext) -> Self {
        Self {
            cluster: node.cluster.clone(),
            reader: node.reader.clone(),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(MESSAGES_PATH, post(receive_message))
        .route(PUBLISH_PATH, post(publish))
        .route("/content/{id}", get(read_content))
        .route("/health", get(health))
        .with_state(state)
}

/// Acknowledgement body returned for an inbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptBody {
    pub message_id: Uuid,
    pub ack: Ack,
    #[serde(default)]
    pub operations: usize,
    #[serde(default)]
    pub failed_steps: usize,
    #[serde(default)]
    pub rejected: Option<String>,
}

impl From<&Receipt> for ReceiptBody {
    fn from(receipt: &Receipt) -> Self {
        Self {
            message_id: receipt.message_id,
            ack: receipt.ack,
            operations: receipt.reports.len(),
            failed_steps: receipt.failed_steps(),
            rejected: receipt.rejected().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Defaults to the content refresher.
    #[serde(default)]
    pub refresher_id: Option<Uuid>,
    pub message: WireMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerOutcome {
    pub peer: String,
    pub attempts: u32,
    #[serde(default)]
    pub ack: Option<Ack>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub message_id: Uuid,
    pub local: ReceiptBody,
    pub peers: Vec<PeerOutcome>,
}

impl From<&BroadcastReport> for PublishResponse {
    fn from(report: &BroadcastReport) -> Self {
        Self {
            message_id: report.message_id(),
            local: ReceiptBody::from(&report.local),
            peers: report
                .deliveries
                .iter()
                .map(|delivery| PeerOutcome {
                    peer: delivery.peer.clone(),
                    attempts: delivery.attempts,
                    ack: delivery.outcome.as_ref().ok().copied(),
                    error: delivery.outcome.as_ref().err().map(|err| err.to_string()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthBody<'a> {
    status: &'static str,
    node_id: &'a str,
    peers: usize,
    refreshers: usize,
}

async fn receive_message(
    State(state): State<HttpState>,
    Json(envelope): Json<Envelope>,
) -> Json<ReceiptBody> {
    let receipt = state.cluster.receive(envelope);
    Json(ReceiptBody::from(&receipt))
}

async fn publish(
    State(state): State<HttpState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, HttpError> {
    let refresher_id = request.refresher_id.unwrap_or(CONTENT_REFRESHER_ID);
    if state.cluster.refreshers().get(refresher_id).is_none() {
        return Err(HttpError::new(
            "infra::http::publish",
            StatusCode::NOT_FOUND,
            "Unknown refresher",
            format!("no refresher registered under {refresher_id}"),
        ));
    }
    if let WireMessage::RefreshByPayload { payload: raw } = &request.message
        && let Err(err) = payload::deserialize(raw)
    {
        return Err(HttpError::from_error(
            "infra::http::publish",
            StatusCode::BAD_REQUEST,
            "Malformed change payload",
            &err,
        ));
    }

    info!(
        refresher_id = %refresher_id,
        kind = request.message.kind(),
        "Publishing cache notification"
    );
    let report = state.cluster.broadcast(refresher_id, request.message).await;
    Ok(Json(PublishResponse::from(&report)))
}

async fn read_content(
    State(state): State<HttpState>,
    Path(id): Path<ContentId>,
) -> Result<Response, HttpError> {
    match state.reader.by_id(id) {
        Ok(Some(doc)) => Ok(Json(doc.as_ref()).into_response()),
        Ok(None) => Ok(StatusCode::NOT_FOUND.into_response()),
        Err(err) => Err(repo_error_to_http("infra::http::read_content", err)),
    }
}

async fn health(State(state): State<HttpState>) -> Response {
    Json(HealthBody {
        status: "ok",
        node_id: state.cluster.node_id().as_str(),
        peers: state.cluster.peers().len(),
        refreshers: state.cluster.refreshers().len(),
    })
    .into_response()
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Content store timeout",
            "Content store timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}
