//! End-to-end review pipeline: create → fetch PR → fetch diff → analyze
//! → parse → publish → finalize, with all failure handling.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::{AnalysisBackend, CompletionOptions};
use crate::context::ContextStore;
use crate::error::Result;
use crate::github::{GitHubClient, PullRequestMetadata};
use crate::parser;
use crate::prompt::{build_prompt, TaskKind};
use crate::review::{RepoId, Review, ReviewStatus, ReviewStore};

pub struct ReviewOrchestrator {
    github: Arc<GitHubClient>,
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<ReviewStore>,
    context: Arc<ContextStore>,
    options: CompletionOptions,
}

impl ReviewOrchestrator {
    pub fn new(
        github: Arc<GitHubClient>,
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<ReviewStore>,
        context: Arc<ContextStore>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            github,
            backend,
            store,
            context,
            options,
        }
    }

    pub fn store(&self) -> &Arc<ReviewStore> {
        &self.store
    }

    /// Drive one review from PENDING to a terminal status.
    ///
    /// Not idempotent by design: the review must be PENDING, so a second
    /// call on the same review finds it IN_PROGRESS or terminal and is
    /// rejected without side effects.
    pub async fn process_review(&self, id: u64) -> Result<Review> {
        let review = self.store.begin_processing(id).await?;
        info!(
            review_id = id,
            repo = %review.repository,
            pr = review.pr_number,
            "starting review"
        );

        match self.run_pipeline(review).await {
            Ok(mut review) => {
                review.status = ReviewStatus::Completed;
                review.completed_at = Some(Utc::now());
                self.store.save(review.clone()).await;
                self.publish_final_status(&review, "success", "Automated review complete")
                    .await;
                info!(
                    review_id = id,
                    comments = review.comments.len(),
                    "review completed"
                );
                Ok(review)
            }
            Err(err) => {
                error!(review_id = id, error = %err, "review failed");
                let failed = self.store.set_status(id, ReviewStatus::Failed).await?;
                self.publish_final_status(&failed, "failure", "Automated review failed")
                    .await;
                Err(err)
            }
        }
    }

    /// The fatal portion of the pipeline. An error here marks the review
    /// FAILED; sibling-task degradation is handled inside.
    async fn run_pipeline(&self, mut review: Review) -> Result<Review> {
        let repo = RepoId::parse(&review.repository)?;

        let pr = self.github.get_pull_request(&repo, review.pr_number).await?;
        let diff = self.github.get_diff(&repo, review.pr_number).await?;

        review.title = Some(pr.title.clone());
        review.description = pr.body.clone();
        review.author = Some(pr.author.clone());
        review.head_branch = Some(pr.head_ref.clone());
        review.base_branch = Some(pr.base_ref.clone());
        review.provider_state = Some(pr.state.clone());
        review.commit_sha = Some(pr.head_sha.clone());
        self.store.save(review.clone()).await;

        if let Err(e) = self
            .github
            .update_commit_status(&repo, &pr.head_sha, "pending", "Automated review in progress")
            .await
        {
            warn!(error = %e, "failed to publish pending status");
        }

        let context = self
            .context
            .project_context(&repo)
            .await
            .unwrap_or_default();

        // The five analysis tasks are independent and run concurrently
        // against the same diff. Results are joined here; a failure in
        // one task does not abort the others.
        let (review_out, tests_out, docs_out, refactor_out, quality_out) = tokio::join!(
            self.complete_task(TaskKind::Review, &diff, &context),
            self.complete_task(TaskKind::TestSuggestions, &diff, &context),
            self.complete_task(TaskKind::DocumentationSuggestions, &diff, &context),
            self.complete_task(TaskKind::RefactoringSuggestions, &diff, &context),
            self.complete_task(TaskKind::QualityAnalysis, &diff, &context),
        );

        // The review-comment task is the primary one; without it the
        // review has no result worth publishing and is FAILED. The other
        // four only degrade their own suggestion sets.
        let review_text = review_out?;
        review.comments = parser::parse_review_comments(&review_text);
        review.test_suggestions = task_output(TaskKind::TestSuggestions, tests_out)
            .map(|text| parser::parse_suggestion_list(&text))
            .unwrap_or_default();
        review.documentation_suggestions =
            task_output(TaskKind::DocumentationSuggestions, docs_out)
                .map(|text| parser::parse_suggestion_list(&text))
                .unwrap_or_default();
        review.refactoring_suggestions = task_output(TaskKind::RefactoringSuggestions, refactor_out)
            .map(|text| parser::parse_suggestion_list(&text))
            .unwrap_or_default();
        review.quality_analysis = task_output(TaskKind::QualityAnalysis, quality_out)
            .map(|text| parser::parse_quality_metrics(&text))
            .unwrap_or_default();

        self.store.save(review.clone()).await;

        self.publish(&repo, &pr, &mut review).await;
        self.store.save(review.clone()).await;

        Ok(review)
    }

    async fn complete_task(&self, kind: TaskKind, diff: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(kind, diff, context, None);
        self.backend.complete(&prompt, &self.options).await
    }

    /// Best-effort result publication. Failures are logged and do not
    /// change the review status.
    async fn publish(&self, repo: &RepoId, pr: &PullRequestMetadata, review: &mut Review) {
        match self.github.suggest_reviewers(repo, Some(&pr.author)).await {
            Ok(reviewers) => {
                if !reviewers.is_empty() {
                    review.suggested_reviewers = reviewers.clone();
                    if let Err(e) = self
                        .github
                        .request_reviewers(repo, review.pr_number, &reviewers)
                        .await
                    {
                        warn!(error = %e, "failed to request reviewers");
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to suggest reviewers"),
        }

        for comment in &review.comments {
            if let Err(e) = self
                .github
                .post_review_comment(repo, review.pr_number, &pr.head_sha, comment)
                .await
            {
                warn!(
                    file = %comment.file_path,
                    error = %e,
                    "failed to publish review comment"
                );
            }
        }

        if let Err(e) = self
            .github
            .post_summary(repo, review.pr_number, &review.comments)
            .await
        {
            warn!(error = %e, "failed to publish review summary");
        }
    }

    async fn publish_final_status(&self, review: &Review, state: &str, description: &str) {
        let Some(sha) = review.commit_sha.as_deref() else {
            return;
        };
        let Ok(repo) = RepoId::parse(&review.repository) else {
            return;
        };
        if let Err(e) = self
            .github
            .update_commit_status(&repo, sha, state, description)
            .await
        {
            warn!(error = %e, "failed to publish final commit status");
        }
    }
}

fn task_output(kind: TaskKind, outcome: Result<String>) -> Option<String> {
    match outcome {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(task = %kind, error = %e, "analysis task failed, continuing without it");
            None
        }
    }
}
