use crate::types::ProviderConfig;
use crate::util::is_local_endpoint_url;
use anyhow::{bail, Result};
use std::path::PathBuf;

const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_LOCAL_MODEL: &str = "local/default";

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub anthropic_version: String,
    pub system_prompt: Option<String>,
    /// Hard cap on output tokens; None disables the cap and the trimmer.
    pub max_output_tokens: Option<u32>,
    pub workspace_root: PathBuf,
    /// Snapshot file for draft/archive state; None keeps everything in memory.
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Local,
}

impl Config {
    pub fn load() -> Result<Self> {
        let provider = std::env::var("COLLOQUY_PROVIDER")
            .ok()
            .and_then(parse_provider)
            .unwrap_or(ProviderKind::Anthropic);

        let api_url = std::env::var("COLLOQUY_API_URL").unwrap_or_else(|_| {
            match provider {
                ProviderKind::Anthropic => DEFAULT_ANTHROPIC_URL,
                ProviderKind::OpenAi => DEFAULT_OPENAI_URL,
                ProviderKind::Local => DEFAULT_LOCAL_URL,
            }
            .to_string()
        });
        let api_key = std::env::var("COLLOQUY_API_KEY").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let model = std::env::var("COLLOQUY_MODEL").unwrap_or_else(|_| {
            match provider {
                ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
                ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
                ProviderKind::Local => DEFAULT_LOCAL_MODEL,
            }
            .to_string()
        });
        let anthropic_version =
            std::env::var("COLLOQUY_ANTHROPIC_VERSION").unwrap_or_else(|_| "2023-06-01".to_string());
        let system_prompt = std::env::var("COLLOQUY_SYSTEM_PROMPT")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let max_output_tokens = std::env::var("COLLOQUY_MAX_OUTPUT_TOKENS")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v > 0)
            .map(|v| v.clamp(128, 8192));
        let state_path = std::env::var("COLLOQUY_STATE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            provider,
            api_key,
            model,
            api_url,
            anthropic_version,
            system_prompt,
            max_output_tokens,
            workspace_root: std::env::current_dir()?,
            state_path,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid COLLOQUY_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        let local_endpoint = is_local_endpoint_url(&self.api_url);
        if self.provider != ProviderKind::Local && !local_endpoint && self.api_key.is_none() {
            bail!(
                "COLLOQUY_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.provider == ProviderKind::Local && !local_endpoint {
            bail!(
                "Local provider requires a localhost endpoint (url: '{}')",
                self.api_url
            );
        }

        Ok(())
    }

    /// Collapse the raw settings into the tagged provider contract the
    /// backend consumes.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        self.validate()?;
        Ok(match self.provider {
            ProviderKind::Anthropic => ProviderConfig::Anthropic {
                api_key: self.api_key.clone().unwrap_or_default(),
                model: self.model.clone(),
                version: self.anthropic_version.clone(),
            },
            ProviderKind::OpenAi => ProviderConfig::OpenAi {
                api_key: self.api_key.clone().unwrap_or_default(),
                model: self.model.clone(),
            },
            ProviderKind::Local => ProviderConfig::Local {
                base_url: self.api_url.clone(),
                api_key: self.api_key.clone(),
                model: self.model.clone(),
            },
        })
    }
}

fn parse_provider(value: String) -> Option<ProviderKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "anthropic" | "claude" => Some(ProviderKind::Anthropic),
        "openai" | "gpt" => Some(ProviderKind::OpenAi),
        "local" | "ollama" | "lmstudio" => Some(ProviderKind::Local),
        _ => None,
    }
}
