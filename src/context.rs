//! Per-repository project context for prompt construction.
//!
//! Context lives in `{rules_dir}/{owner}/{name}/context.yaml` and is
//! cached by repository with a TTL. A missing or unreadable file simply
//! means no context; prompts then carry an empty context section.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

use crate::review::RepoId;

const CONTEXT_FILE: &str = "context.yaml";

#[derive(Debug, Deserialize)]
struct ContextFile {
    description: String,
}

pub struct ContextStore {
    rules_dir: PathBuf,
    cache_enabled: bool,
    ttl: Duration,
    cache: RwLock<HashMap<String, (String, Instant)>>,
}

impl ContextStore {
    pub fn new(rules_dir: PathBuf, cache_enabled: bool, ttl: Duration) -> Self {
        Self {
            rules_dir,
            cache_enabled,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The project description for a repository, or None when no context
    /// has been configured for it.
    pub async fn project_context(&self, repo: &RepoId) -> Option<String> {
        let key = repo.to_string();

        if self.cache_enabled {
            let cache = self.cache.read().await;
            if let Some((description, loaded_at)) = cache.get(&key) {
                if loaded_at.elapsed() < self.ttl {
                    return Some(description.clone());
                }
            }
        }

        let path = self
            .rules_dir
            .join(&repo.owner)
            .join(&repo.name)
            .join(CONTEXT_FILE);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => return None,
        };

        let parsed: ContextFile = match serde_yaml::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(repo = %repo, error = %e, "unreadable context file");
                return None;
            }
        };

        if self.cache_enabled {
            self.cache
                .write()
                .await
                .insert(key, (parsed.description.clone(), Instant::now()));
        }

        Some(parsed.description)
    }
}
