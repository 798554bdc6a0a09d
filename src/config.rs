use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which analysis backend to wire in. Selected once at startup; the
/// orchestrator only ever sees the `AnalysisBackend` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone)]
pub struct Config {
    pub github_app_id: u64,
    pub github_private_key: String,
    pub github_webhook_secret: String,
    pub github_api_base: String,
    pub llm_provider: LlmProvider,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
    pub openai_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    /// Directory holding per-repository `context.yaml` rules files.
    pub context_rules_dir: PathBuf,
    pub context_cache_enabled: bool,
    pub context_cache_ttl: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_app_id = env::var("GITHUB_APP_ID")
            .context("GITHUB_APP_ID environment variable is required")?
            .parse::<u64>()
            .context("GITHUB_APP_ID must be a valid number")?;

        let github_private_key = env::var("GITHUB_PRIVATE_KEY")
            .context("GITHUB_PRIVATE_KEY environment variable is required")?
            .replace("\\n", "\n");

        let github_webhook_secret = env::var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let github_api_base =
            env::var("GITHUB_API_BASE").unwrap_or_else(|_| "https://api.github.com".to_string());

        let llm_provider = match env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "ollama".to_string())
            .to_lowercase()
            .as_str()
        {
            "openai" => LlmProvider::OpenAi,
            "ollama" => LlmProvider::Ollama,
            other => anyhow::bail!("LLM_PROVIDER must be 'openai' or 'ollama', got '{other}'"),
        };

        let openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty());
        if llm_provider == LlmProvider::OpenAi && openai_api_key.is_none() {
            anyhow::bail!("OPENAI_API_KEY is required when LLM_PROVIDER=openai");
        }

        let openai_api_base = env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let openai_model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let ollama_url =
            env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());

        let ollama_model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| "codellama".to_string());

        let llm_temperature = env::var("LLM_TEMPERATURE")
            .unwrap_or_else(|_| "0.3".to_string())
            .parse::<f32>()
            .context("LLM_TEMPERATURE must be a valid number")?;

        let llm_max_tokens = env::var("LLM_MAX_TOKENS")
            .unwrap_or_else(|_| "2048".to_string())
            .parse::<u32>()
            .context("LLM_MAX_TOKENS must be a valid number")?;

        let llm_timeout = Duration::from_secs(
            env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .context("LLM_TIMEOUT_SECS must be a valid number")?,
        );

        let context_rules_dir = env::var("CONTEXT_RULES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("rules"));

        let context_cache_enabled = env::var("CONTEXT_CACHE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let context_cache_ttl = Duration::from_secs(
            env::var("CONTEXT_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse::<u64>()
                .context("CONTEXT_CACHE_TTL_SECS must be a valid number")?,
        );

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        Ok(Config {
            github_app_id,
            github_private_key,
            github_webhook_secret,
            github_api_base,
            llm_provider,
            openai_api_key,
            openai_api_base,
            openai_model,
            ollama_url,
            ollama_model,
            llm_temperature,
            llm_max_tokens,
            llm_timeout,
            context_rules_dir,
            context_cache_enabled,
            context_cache_ttl,
            port,
        })
    }
}
