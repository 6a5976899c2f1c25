use super::ImagePayload;
use serde::{Deserialize, Serialize};

/// Provider selection with its per-provider settings. Replaces untyped
/// payload switching with one tagged sum type sharing a common request
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Anthropic {
        api_key: String,
        model: String,
        version: String,
    },
    OpenAi {
        api_key: String,
        model: String,
    },
    /// OpenAI-compatible local server (LM Studio, Ollama, llama.cpp).
    Local {
        base_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        model: String,
    },
}

/// One generation request as handed to the model backend. History folding,
/// context selection, and attachment capture happen in the engine; the
/// backend only renders this into a provider payload.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub image: Option<ImagePayload>,
    /// RAG context chunks, each a pre-formatted file block.
    pub context_files: Option<Vec<String>>,
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    /// Prepend RAG context blocks to the prompt the way the backends
    /// expect a single user turn.
    pub fn prompt_with_context(&self) -> String {
        match &self.context_files {
            Some(files) if !files.is_empty() => {
                let mut combined = String::new();
                combined.push_str("Relevant project files:\n\n");
                for block in files {
                    combined.push_str(block);
                    combined.push_str("\n\n");
                }
                combined.push_str(&self.prompt);
                combined
            }
            _ => self.prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_tagged_serialization() {
        let provider = ProviderConfig::Local {
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "qwen2.5-coder".to_string(),
        };
        let json = serde_json::to_string(&provider).unwrap();
        assert!(json.contains("\"kind\":\"local\""));
        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, provider);
    }

    #[test]
    fn test_prompt_with_context_prepends_blocks() {
        let request = GenerateRequest {
            prompt: "what does main do?".to_string(),
            context_files: Some(vec!["--- main.rs ---\nfn main() {}".to_string()]),
            ..Default::default()
        };
        let combined = request.prompt_with_context();
        assert!(combined.starts_with("Relevant project files:"));
        assert!(combined.ends_with("what does main do?"));
    }

    #[test]
    fn test_prompt_without_context_is_unchanged() {
        let request = GenerateRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        };
        assert_eq!(request.prompt_with_context(), "hi");
    }
}
