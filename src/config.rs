//! Configuration types for the parliament engine

use crate::error::{Error, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Number of sequential policies in a session
pub const POLICY_COUNT: usize = 7;

/// Default total budget per actor
pub const DEFAULT_BUDGET: u32 = 14;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Game rules and runtime knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Units every actor may spend across the whole session
    pub total_budget: u32,
    /// Agents drawn from the persona pool at session start
    pub agents_per_session: usize,
    /// Option used when an agent's preference is missing or malformed
    pub fallback_option: u8,
    /// Pause between sequential agent calls, in milliseconds
    pub agent_delay_ms: u64,
    /// Seed for the tie-break RNG; entropy when unset
    pub tie_break_seed: Option<u64>,
    /// Model requested from OpenRouter for agent preferences and opinions
    pub model: String,
    /// Directory of the sled store; in-memory when unset
    pub store_path: Option<PathBuf>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            total_budget: DEFAULT_BUDGET,
            agents_per_session: 4,
            fallback_option: 2,
            agent_delay_ms: 0,
            tie_break_seed: None,
            model: presets::BALANCED.to_string(),
            store_path: None,
        }
    }
}

impl GameConfig {
    /// Load configuration from defaults, an optional YAML file and `BEAN_*` env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| Error::config(format!("Failed to encode defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        builder = builder.add_source(config::Environment::with_prefix("BEAN").try_parsing(true));

        let loaded: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the rules are playable
    pub fn validate(&self) -> Result<()> {
        if usize::try_from(self.total_budget).map_or(false, |budget| budget < POLICY_COUNT) {
            return Err(Error::config(format!(
                "total_budget {} cannot cover {} policies at 1 unit each",
                self.total_budget, POLICY_COUNT
            )));
        }
        if !(1..=3).contains(&self.fallback_option) {
            return Err(Error::config(format!(
                "fallback_option must be 1, 2 or 3, got {}",
                self.fallback_option
            )));
        }
        if self.agents_per_session == 0 {
            return Err(Error::config("agents_per_session must be at least 1"));
        }
        Ok(())
    }

    /// Delay between sequential agent calls
    pub fn agent_delay(&self) -> Duration {
        Duration::from_millis(self.agent_delay_ms)
    }

    /// Set the tie-break seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.tie_break_seed = Some(seed);
        self
    }

    /// Set the agent delay
    pub fn with_agent_delay(mut self, delay: Duration) -> Self {
        self.agent_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// OpenRouter client configuration
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// API key (loaded from environment variable)
    pub api_key: SecretString,
    /// Base URL for OpenRouter API
    pub base_url: Url,
    /// Request timeout
    pub timeout: Duration,
    /// App name for OpenRouter tracking
    pub app_name: String,
}

impl OpenRouterConfig {
    /// Create a new OpenRouter configuration from environment
    pub fn from_env() -> Result<Self> {
        // Load .env if present so local development picks up OPENROUTER_API_KEY
        let _ = dotenv();

        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| Error::config("OPENROUTER_API_KEY environment variable not set"))?;

        let mut config = Self::new(api_key)?;
        if let Ok(base_url) = std::env::var("OPENROUTER_BASE_URL") {
            let url = Url::parse(&base_url)
                .map_err(|e| Error::config(format!("Invalid OPENROUTER_BASE_URL: {}", e)))?;
            config = config.with_base_url(url);
        }
        Ok(config)
    }

    /// Create a new OpenRouter configuration with a specific API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(OPENROUTER_BASE_URL)
            .map_err(|e| Error::config(format!("Invalid OpenRouter URL: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            base_url,
            timeout: Duration::from_secs(30),
            app_name: "Republic of Bean".to_string(),
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the app name
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Recommended model identifiers
pub mod presets {
    /// Balanced performance and cost
    pub const BALANCED: &str = "openai/gpt-4o-mini";

    /// Stronger persona role-play
    pub const QUALITY: &str = "anthropic/claude-sonnet-4";

    /// Free tier model
    pub const FREE_TIER: &str = "meta-llama/llama-3.3-70b-instruct:free";
}
