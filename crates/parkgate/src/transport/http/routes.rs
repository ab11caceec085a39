//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::service::GateService;
use crate::token::TokenId;

const INDEX_HTML: &str = include_str!("../../../static/index.html");

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub available_slots: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    #[serde(default)]
    pub uid: Option<TokenId>,
}

impl ReserveRequest {
    /// Parse a request body. Anything that does not carry a usable uid
    /// yields `None`.
    fn uid_from_body(body: &[u8]) -> Option<TokenId> {
        let request: Self = serde_json::from_slice(body).ok()?;
        TokenId::parse(request.uid?.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn message(status: StatusCode, message: &'static str) -> (StatusCode, Json<MessageResponse>) {
    (status, Json(MessageResponse { message }))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(service): State<Arc<GateService>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        available_slots: service.available_slots(),
    })
}

async fn reserve(
    State(service): State<Arc<GateService>>,
    body: Bytes,
) -> (StatusCode, Json<MessageResponse>) {
    let Some(uid) = ReserveRequest::uid_from_body(&body) else {
        tracing::debug!("Reservation request without a usable uid");
        return message(StatusCode::FORBIDDEN, "Access Denied: Invalid UID");
    };

    match service.reserve(&uid).await {
        Ok(()) => message(StatusCode::OK, "Reservation Successful"),
        Err(GateError::Unregistered(_)) => {
            message(StatusCode::FORBIDDEN, "Access Denied: Invalid UID")
        }
        Err(_) => message(StatusCode::INTERNAL_SERVER_ERROR, "Reservation Failed"),
    }
}

pub fn routes(service: Arc<GateService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/reserve", post(reserve))
        .with_state(service)
}
