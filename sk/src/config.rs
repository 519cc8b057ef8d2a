//! SeekHelp configuration types and loading

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main SeekHelp configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Per-phase budgets for the recommendation pipeline
    pub pipeline: PipelineConfig,

    /// Conversational endpoint settings
    pub chat: ChatConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Fails fast when the API key variable is unset or when the phase
    /// timeouts do not nest inside each other.
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            bail!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            );
        }
        self.pipeline.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .seekhelp.yml
        let local_config = PathBuf::from(".seekhelp.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/seekhelp/seekhelp.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed: the full load reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(".seekhelp.yml"))
                .chain(user_config_path())
                .collect(),
        };

        candidates
            .into_iter()
            .find(|path| path.exists())
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("seekhelp").join("seekhelp.yml"))
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai")
    pub provider: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Transport timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries for transient provider errors
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            timeout_ms: 60_000,
            max_retries: 0,
        }
    }
}

/// Model, token budget, temperature and timeout for one LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// Model identifier
    pub model: String,

    /// Maximum tokens in the response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Phase timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl PhaseConfig {
    fn new(max_tokens: u32, temperature: f32, timeout_ms: u64) -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens,
            temperature,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self::new(2048, 0.7, 20_000)
    }
}

/// Recommendation pipeline budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Task decomposition call
    pub orchestrator: PhaseConfig,

    /// One specialist call per subtask
    pub worker: PhaseConfig,

    /// Final merge call
    pub synthesis: PhaseConfig,

    /// Outer bound on the whole worker fan-out
    #[serde(rename = "worker-pool-timeout-ms")]
    pub worker_pool_timeout_ms: u64,

    /// Backstop for one complete pipeline run
    #[serde(rename = "total-budget-ms")]
    pub total_budget_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            orchestrator: PhaseConfig::new(2048, 0.6, 15_000),
            worker: PhaseConfig::new(2048, 0.8, 20_000),
            synthesis: PhaseConfig::new(3072, 0.5, 20_000),
            worker_pool_timeout_ms: 25_000,
            total_budget_ms: 60_000,
        }
    }
}

impl PipelineConfig {
    pub fn worker_pool_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_pool_timeout_ms)
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_millis(self.total_budget_ms)
    }

    /// Check that phase timeouts nest inside each other
    pub fn validate(&self) -> Result<()> {
        if self.worker.timeout_ms >= self.worker_pool_timeout_ms {
            bail!(
                "pipeline.worker.timeout-ms ({}) must be less than pipeline.worker-pool-timeout-ms ({})",
                self.worker.timeout_ms,
                self.worker_pool_timeout_ms
            );
        }

        let Some(phases) = self
            .orchestrator
            .timeout_ms
            .checked_add(self.worker_pool_timeout_ms)
            .and_then(|sum| sum.checked_add(self.synthesis.timeout_ms))
        else {
            bail!("orchestrator + worker-pool + synthesis timeouts overflow; use millisecond values");
        };
        if phases > self.total_budget_ms {
            bail!(
                "orchestrator + worker-pool + synthesis timeouts ({}ms) exceed pipeline.total-budget-ms ({}ms)",
                phases,
                self.total_budget_ms
            );
        }

        for (name, phase) in [
            ("orchestrator", &self.orchestrator),
            ("worker", &self.worker),
            ("synthesis", &self.synthesis),
        ] {
            if phase.max_tokens == 0 {
                bail!("pipeline.{name}.max-tokens must be greater than zero");
            }
            if !(0.0..=2.0).contains(&phase.temperature) {
                bail!("pipeline.{name}.temperature must be between 0 and 2");
            }
        }

        Ok(())
    }
}

/// Conversational endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model identifier
    pub model: String,

    /// Maximum tokens per reply
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Number of previous messages forwarded to the model
    #[serde(rename = "history-window")]
    pub history_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 400,
            temperature: 0.7,
            history_window: 3,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Prompt template overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory whose `<name>.pmt` files replace the built-in templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}
