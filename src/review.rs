use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// Lifecycle status of a review.
///
/// Transitions inside the pipeline are monotonic: PENDING → IN_PROGRESS →
/// {COMPLETED, FAILED}. Only an explicit status-update call may move a
/// review outside that path (external correction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Completed | ReviewStatus::Failed)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::InProgress => "IN_PROGRESS",
            ReviewStatus::Completed => "COMPLETED",
            ReviewStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommentCategory {
    Logic,
    Security,
    Performance,
    Style,
    TestCoverage,
    Documentation,
    Refactoring,
    Uncategorized,
}

impl CommentCategory {
    /// Case-insensitive match against the known labels; anything else
    /// falls back to `Uncategorized` rather than failing the record.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "LOGIC" => CommentCategory::Logic,
            "SECURITY" => CommentCategory::Security,
            "PERFORMANCE" => CommentCategory::Performance,
            "STYLE" => CommentCategory::Style,
            "TEST_COVERAGE" => CommentCategory::TestCoverage,
            "DOCUMENTATION" => CommentCategory::Documentation,
            "REFACTORING" => CommentCategory::Refactoring,
            _ => CommentCategory::Uncategorized,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommentCategory::Logic => "LOGIC",
            CommentCategory::Security => "SECURITY",
            CommentCategory::Performance => "PERFORMANCE",
            CommentCategory::Style => "STYLE",
            CommentCategory::TestCoverage => "TEST_COVERAGE",
            CommentCategory::Documentation => "DOCUMENTATION",
            CommentCategory::Refactoring => "REFACTORING",
            CommentCategory::Uncategorized => "UNCATEGORIZED",
        }
    }
}

/// One structured observation extracted from backend output. Owned by its
/// parent review; never shared between reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file_path: String,
    /// None when the observation is diff-level rather than line-level.
    pub line_number: Option<u32>,
    pub category: CommentCategory,
    pub severity: String,
    pub body: String,
    pub suggested_fix: Option<String>,
    pub resolved: bool,
}

/// A unit of review work. Immutable once accepted; consumed exactly once
/// by the orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub repository: String,
    pub pr_number: u64,
    pub commit_sha: Option<String>,
}

/// Parsed `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn parse(full_name: &str) -> Result<Self> {
        fn invalid(full_name: &str) -> Error {
            Error::Configuration(format!(
                "invalid repository identifier '{full_name}' (expected owner/name)"
            ))
        }
        let (owner, name) = full_name
            .split_once('/')
            .ok_or_else(|| invalid(full_name))?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid(full_name));
        }
        if owner == ".." || name == ".." || owner == "." || name == "." {
            return Err(invalid(full_name));
        }
        Ok(RepoId {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: u64,
    pub repository: String,
    pub pr_number: u64,
    pub commit_sha: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub head_branch: Option<String>,
    pub base_branch: Option<String>,
    /// Provider-reported PR state ("open", "closed", ...). Informational
    /// only; `status` governs the lifecycle.
    pub provider_state: Option<String>,
    pub status: ReviewStatus,
    pub comments: Vec<ReviewComment>,
    pub test_suggestions: Vec<String>,
    pub documentation_suggestions: Vec<String>,
    pub refactoring_suggestions: Vec<String>,
    pub quality_analysis: HashMap<String, String>,
    pub suggested_reviewers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory review store. The only cross-request shared mutable state
/// besides the broker's token cache.
pub struct ReviewStore {
    reviews: RwLock<HashMap<u64, Review>>,
    next_id: AtomicU64,
}

impl Default for ReviewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewStore {
    pub fn new() -> Self {
        Self {
            reviews: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Accept a request and create its review row in PENDING.
    pub async fn create(&self, request: ReviewRequest) -> Review {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let review = Review {
            id,
            repository: request.repository,
            pr_number: request.pr_number,
            commit_sha: request.commit_sha,
            title: None,
            description: None,
            author: None,
            head_branch: None,
            base_branch: None,
            provider_state: None,
            status: ReviewStatus::Pending,
            comments: Vec::new(),
            test_suggestions: Vec::new(),
            documentation_suggestions: Vec::new(),
            refactoring_suggestions: Vec::new(),
            quality_analysis: HashMap::new(),
            suggested_reviewers: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        };
        self.reviews.write().await.insert(id, review.clone());
        review
    }

    pub async fn get(&self, id: u64) -> Option<Review> {
        self.reviews.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<Review> {
        let mut all: Vec<Review> = self.reviews.read().await.values().cloned().collect();
        all.sort_by_key(|r| r.id);
        all
    }

    /// Overwrite the stored row with an updated snapshot.
    pub async fn save(&self, review: Review) {
        self.reviews.write().await.insert(review.id, review);
    }

    /// Atomically move a PENDING review to IN_PROGRESS and return its
    /// snapshot. Any other current status is rejected without mutation,
    /// which is what makes a second `process_review` call on the same
    /// review a no-op failure.
    pub async fn begin_processing(&self, id: u64) -> Result<Review> {
        let mut reviews = self.reviews.write().await;
        let review = reviews
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("review {id}")))?;
        if review.status != ReviewStatus::Pending {
            return Err(Error::InvalidState {
                id,
                status: review.status.to_string(),
            });
        }
        review.status = ReviewStatus::InProgress;
        Ok(review.clone())
    }

    /// Explicit status update (external correction). Keeps the invariant
    /// that `completed_at` is set if and only if the status is terminal.
    pub async fn set_status(&self, id: u64, status: ReviewStatus) -> Result<Review> {
        let mut reviews = self.reviews.write().await;
        let review = reviews
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("review {id}")))?;
        review.status = status;
        review.completed_at = if status.is_terminal() {
            Some(Utc::now())
        } else {
            None
        };
        Ok(review.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ReviewRequest {
        ReviewRequest {
            repository: "acme/widgets".to_string(),
            pr_number: 42,
            commit_sha: Some("abc123".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let store = ReviewStore::new();
        let review = store.create(request()).await;
        assert_eq!(review.status, ReviewStatus::Pending);
        assert_eq!(review.repository, "acme/widgets");
        assert_eq!(review.pr_number, 42);
        assert!(review.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_ordered() {
        let store = ReviewStore::new();
        let a = store.create(request()).await;
        let b = store.create(request()).await;
        assert!(b.id > a.id);
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_begin_processing_requires_pending() {
        let store = ReviewStore::new();
        let review = store.create(request()).await;

        let started = store.begin_processing(review.id).await.unwrap();
        assert_eq!(started.status, ReviewStatus::InProgress);

        // Second call finds IN_PROGRESS and rejects without mutation.
        let err = store.begin_processing(review.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_eq!(
            store.get(review.id).await.unwrap().status,
            ReviewStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_begin_processing_rejects_terminal() {
        let store = ReviewStore::new();
        let review = store.create(request()).await;
        store
            .set_status(review.id, ReviewStatus::Completed)
            .await
            .unwrap();

        let err = store.begin_processing(review.id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_completed_at_tracks_terminal_status() {
        let store = ReviewStore::new();
        let review = store.create(request()).await;

        let updated = store
            .set_status(review.id, ReviewStatus::Failed)
            .await
            .unwrap();
        assert!(updated.completed_at.is_some());

        // Moving back to a non-terminal status clears the timestamp.
        let updated = store
            .set_status(review.id, ReviewStatus::Pending)
            .await
            .unwrap();
        assert!(updated.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_review_is_not_found() {
        let store = ReviewStore::new();
        assert!(matches!(
            store.begin_processing(999).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_category_parse_is_tolerant() {
        assert_eq!(CommentCategory::parse("security"), CommentCategory::Security);
        assert_eq!(
            CommentCategory::parse(" Test_Coverage "),
            CommentCategory::TestCoverage
        );
        assert_eq!(
            CommentCategory::parse("banana"),
            CommentCategory::Uncategorized
        );
    }

    #[test]
    fn test_repo_id_parse() {
        let repo = RepoId::parse("acme/widgets").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.to_string(), "acme/widgets");

        assert!(RepoId::parse("no-slash").is_err());
        assert!(RepoId::parse("/widgets").is_err());
        assert!(RepoId::parse("acme/").is_err());
        assert!(RepoId::parse("acme/widgets/extra").is_err());
        assert!(RepoId::parse("../widgets").is_err());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ReviewStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
    }
}
