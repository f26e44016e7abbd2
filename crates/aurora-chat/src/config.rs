//! Provider credentials and model selection.

use std::path::Path;

use aurora_core::ProviderKind;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Aurora, a friendly assistant. \
     Answer briefly and clearly, in the language the user writes in.";

/// Stored provider configuration (optionally loaded from a JSON file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.into()
}
fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.into()
}
fn default_groq_model() -> String {
    DEFAULT_GROQ_MODEL.into()
}
fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.into()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> usize {
    1024
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            gemini_api_key: None,
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            groq_model: default_groq_model(),
            gemini_model: default_gemini_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl ProviderSettings {
    /// Load settings from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// Same as [`ProviderSettings::load`] with an explicit env lookup.
    pub fn load_with(config_path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings: ProviderSettings = match std::fs::read_to_string(config_path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => {
                    info!("Loaded provider config from {}", config_path.display());
                    parsed
                }
                Err(e) => {
                    warn!("Ignoring invalid provider config {}: {}", config_path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Env vars as fallback for API keys
        if settings.openai_api_key.is_none() {
            settings.openai_api_key = env("OPENAI_API_KEY");
        }
        if settings.anthropic_api_key.is_none() {
            settings.anthropic_api_key = env("ANTHROPIC_API_KEY");
        }
        if settings.groq_api_key.is_none() {
            settings.groq_api_key = env("GROQ_API_KEY");
        }
        if settings.gemini_api_key.is_none() {
            settings.gemini_api_key = env("GEMINI_API_KEY").or_else(|| env("GOOGLE_API_KEY"));
        }

        settings
    }

    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::OpenAI => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderKind::Groq => self.groq_api_key.as_deref(),
            ProviderKind::Gemini => self.gemini_api_key.as_deref(),
        }
    }

    pub fn model(&self, provider: ProviderKind) -> &str {
        match provider {
            ProviderKind::OpenAI => &self.openai_model,
            ProviderKind::Anthropic => &self.anthropic_model,
            ProviderKind::Groq => &self.groq_model,
            ProviderKind::Gemini => &self.gemini_model,
        }
    }

    /// Providers that have credentials.
    pub fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::all()
            .iter()
            .copied()
            .filter(|p| self.api_key(*p).is_some())
            .collect()
    }
}
