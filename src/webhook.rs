//! Inbound webhook verification and event filtering.
//!
//! Signature verification happens in a middleware layer over the raw
//! body, before any parsing; a mismatch is rejected with 400 and no side
//! effects. Only `pull_request` events with an actionable action reach
//! the orchestrator.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::review::ReviewRequest;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

const ACTIONABLE_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub action: Option<String>,
    pub pull_request: Option<PullRequestEvent>,
    pub repository: Option<RepositoryEvent>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestEvent {
    pub number: u64,
    pub head: GitRefEvent,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitRefEvent {
    pub sha: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryEvent {
    pub full_name: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

fn verify_sha256(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    // Constant-time comparison.
    mac.verify_slice(&signature_bytes).is_ok()
}

fn verify_sha1(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha1=") else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Check the event signature. The SHA-256 header wins when present; the
/// legacy SHA-1 header is accepted only in its absence.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    sha256_header: Option<&str>,
    sha1_header: Option<&str>,
) -> bool {
    if let Some(signature) = sha256_header {
        return verify_sha256(secret, payload, signature);
    }
    if let Some(signature) = sha1_header {
        return verify_sha1(secret, payload, signature);
    }
    false
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let sha256_header = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let sha1_header = parts
        .headers
        .get("x-hub-signature")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    if !verify_signature(
        &state.webhook_secret,
        &bytes,
        sha256_header.as_deref(),
        sha1_header.as_deref(),
    ) {
        error!("invalid webhook signature");
        return Err(StatusCode::BAD_REQUEST);
    }

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(request).await)
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let event_type = request
        .headers()
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    if event_type != "pull_request" {
        info!(event = %event_type, "ignoring non-pull-request event");
        return Ok(Json(WebhookResponse {
            message: "event ignored".to_string(),
        }));
    }

    let payload: WebhookPayload =
        serde_json::from_slice(&bytes).map_err(|_| StatusCode::BAD_REQUEST)?;

    let action = payload.action.as_deref().unwrap_or_default();
    if !ACTIONABLE_ACTIONS.contains(&action) {
        info!(action, "ignoring pull_request action");
        return Ok(Json(WebhookResponse {
            message: "action ignored".to_string(),
        }));
    }

    let (Some(pr), Some(repo)) = (&payload.pull_request, &payload.repository) else {
        warn!("pull_request event missing pull request or repository data");
        return Err(StatusCode::BAD_REQUEST);
    };

    let review = state
        .store
        .create(ReviewRequest {
            repository: repo.full_name.clone(),
            pr_number: pr.number,
            commit_sha: Some(pr.head.sha.clone()),
        })
        .await;

    info!(
        review_id = review.id,
        repo = %repo.full_name,
        pr = pr.number,
        action,
        "accepted pull_request event"
    );

    let orchestrator = state.orchestrator.clone();
    let review_id = review.id;
    tokio::spawn(async move {
        if let Err(e) = orchestrator.process_review(review_id).await {
            error!(review_id, error = %e, "failed to process review");
        }
    });

    Ok(Json(WebhookResponse {
        message: format!("review {} accepted", review.id),
    }))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}
