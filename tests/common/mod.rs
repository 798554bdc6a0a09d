//! Shared harness: a fake GitHub API and a fake inference server behind
//! wiremock, plus orchestrator wiring against them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reviewbotics::auth::CredentialBroker;
use reviewbotics::backend::{CompletionOptions, OllamaBackend};
use reviewbotics::context::ContextStore;
use reviewbotics::github::GitHubClient;
use reviewbotics::orchestrator::ReviewOrchestrator;
use reviewbotics::review::{Review, ReviewStore};

pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test_key.pem");

pub const REVIEW_RESPONSE: &str = "src/login.rs|42|SECURITY|HIGH|Password compared without constant-time equality|Use a constant-time comparison\nLogin.java: Missing null check for user input.\n";
pub const TEST_RESPONSE: &str =
    "Add a unit test for empty passwords\nAdd an integration test for lockout\n";
pub const DOC_RESPONSE: &str = "Document the lockout threshold\n";
pub const REFACTOR_RESPONSE: &str = "Extract the retry loop into a helper\n";
pub const QUALITY_RESPONSE: &str = "COMPLEXITY|7|High cyclomatic complexity\nMAINTAINABILITY|5\n";

pub const DIFF: &str = "diff --git a/src/login.rs b/src/login.rs\n+fn check(p: &str) {}\n";

pub async fn mount_auth(github: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/installation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 77})))
        .mount(github)
        .await;
    Mock::given(method("POST"))
        .and(path("/app/installations/77/access_tokens"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "token": "ghs_e2e",
            "expires_at": (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
        })))
        .mount(github)
        .await;
}

pub async fn mount_pull_request(github: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42"))
        .and(wiremock::matchers::header(
            "Accept",
            "application/vnd.github.v3+json",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "number": 42,
            "title": "Add login",
            "body": "Adds the login flow",
            "state": "open",
            "user": {"login": "octocat"},
            "head": {"sha": "abc123", "ref": "feature/login"},
            "base": {"sha": "def456", "ref": "main"},
        })))
        .mount(github)
        .await;
}

pub async fn mount_diff(github: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/pulls/42"))
        .and(wiremock::matchers::header(
            "Accept",
            "application/vnd.github.v3.diff",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(DIFF))
        .mount(github)
        .await;
}

/// Best-effort publication endpoints: statuses, comments, summary,
/// reviewer suggestion and request.
pub async fn mount_publication(github: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/statuses/abc123"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
        .mount(github)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/pulls/42/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 1})))
        .mount(github)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/issues/42/comments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 2})))
        .mount(github)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/contributors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"login": "octocat"},
            {"login": "alice"},
            {"login": "bob"},
        ])))
        .mount(github)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/widgets/pulls/42/requested_reviewers"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({})))
        .mount(github)
        .await;
}

/// One canned answer per task kind, routed by distinctive prompt text.
pub async fn mount_backend(llm: &MockServer) {
    let cases = [
        ("Report one issue per line", REVIEW_RESPONSE),
        ("testing expert", TEST_RESPONSE),
        ("documentation expert", DOC_RESPONSE),
        ("refactoring expert", REFACTOR_RESPONSE),
        ("Analyze the quality", QUALITY_RESPONSE),
    ];
    for (marker, response) in cases {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_string_contains(marker))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": response})),
            )
            .mount(llm)
            .await;
    }
}

pub fn build_orchestrator(
    github: &MockServer,
    llm: &MockServer,
    store: Arc<ReviewStore>,
) -> Arc<ReviewOrchestrator> {
    let broker = Arc::new(CredentialBroker::new(1234, TEST_PRIVATE_KEY, github.uri()).unwrap());
    let client = Arc::new(GitHubClient::new(broker, github.uri()).unwrap());
    let backend = Arc::new(OllamaBackend::new(llm.uri(), "codellama".to_string()).unwrap());
    let context = Arc::new(ContextStore::new(
        PathBuf::from("/nonexistent-rules"),
        true,
        Duration::from_secs(60),
    ));
    Arc::new(ReviewOrchestrator::new(
        client,
        backend,
        store,
        context,
        CompletionOptions {
            temperature: 0.3,
            max_tokens: 512,
            timeout: Duration::from_secs(5),
        },
    ))
}

pub async fn wait_for_terminal(store: &ReviewStore, id: u64) -> Review {
    for _ in 0..200 {
        if let Some(review) = store.get(id).await {
            if review.status.is_terminal() {
                return review;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("review {id} did not reach a terminal status in time");
}
