//! Direct API surface over the review rows: create (which schedules
//! orchestration), read, and explicit status correction.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::review::{Review, ReviewRequest, ReviewStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReviewBody {
    pub repository: String,
    pub pull_request_number: u64,
    pub commit_sha: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: ReviewStatus,
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reviews", post(create_review).get(list_reviews))
        .route("/api/reviews/{id}", get(get_review))
        .route("/api/reviews/{id}/status", put(update_status))
}

async fn create_review(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateReviewBody>,
) -> (StatusCode, Json<Review>) {
    let review = state
        .store
        .create(ReviewRequest {
            repository: body.repository,
            pr_number: body.pull_request_number,
            commit_sha: body.commit_sha,
        })
        .await;

    info!(
        review_id = review.id,
        repo = %review.repository,
        pr = review.pr_number,
        "accepted direct review request"
    );

    let orchestrator = state.orchestrator.clone();
    let review_id = review.id;
    tokio::spawn(async move {
        if let Err(e) = orchestrator.process_review(review_id).await {
            error!(review_id, error = %e, "failed to process review");
        }
    });

    (StatusCode::ACCEPTED, Json(review))
}

async fn list_reviews(State(state): State<Arc<AppState>>) -> Json<Vec<Review>> {
    Json(state.store.list().await)
}

async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Review>, StatusCode> {
    state
        .store
        .get(id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Review>, StatusCode> {
    state
        .store
        .set_status(id, body.status)
        .await
        .map(Json)
        .map_err(|_| StatusCode::NOT_FOUND)
}
