use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STEPWISE_DIR: &str = ".stepwise";

pub const DEFAULT_RECURSION_LIMIT: usize = 50;
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub enabled: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: String,
    pub engine_id: String,
    /// Environment variable consulted when `api_key` is empty.
    pub api_key_env: String,
    /// Environment variable consulted when `engine_id` is empty.
    pub engine_id_env: String,
    pub endpoint: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            engine_id: String::new(),
            api_key_env: "GOOGLE_SEARCH_API_KEY".to_string(),
            engine_id_env: "GOOGLE_SEARCH_ENGINE_ID".to_string(),
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            max_results: 3,
            timeout_secs: 20,
        }
    }
}

impl SearchConfig {
    pub fn resolved_api_key(&self) -> String {
        value_or_env(&self.api_key, &self.api_key_env)
    }

    pub fn resolved_engine_id(&self) -> String {
        value_or_env(&self.engine_id, &self.engine_id_env)
    }
}

fn value_or_env(value: &str, var_name: &str) -> String {
    if !value.is_empty() {
        return value.to_string();
    }
    std::env::var(var_name).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScrapeConfig {
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f64,
    /// Upper bound on graph transitions per run.
    pub recursion_limit: usize,
    /// Upper bound on model round trips inside one executor step.
    pub max_tool_rounds: usize,
    pub stream: StreamConfig,
    pub search: SearchConfig,
    pub scrape: ScrapeConfig,
    #[serde(skip)]
    pub workspace_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: None,
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_tool_rounds: 20,
            stream: StreamConfig::default(),
            search: SearchConfig::default(),
            scrape: ScrapeConfig::default(),
            workspace_dir: get_stepwise_dir().join("workspace"),
        }
    }
}

pub fn get_stepwise_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(STEPWISE_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_stepwise_dir().join("config.toml")
}

pub fn get_history_path() -> PathBuf {
    get_stepwise_dir().join("history.txt")
}

pub fn ensure_stepwise_dir() -> Result<PathBuf> {
    let stepwise_dir = get_stepwise_dir();

    if !stepwise_dir.exists() {
        std::fs::create_dir_all(&stepwise_dir).with_context(|| {
            format!(
                "Failed to create stepwise directory at {}",
                stepwise_dir.display()
            )
        })?;
    }

    Ok(stepwise_dir)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.recursion_limit == 0 {
            anyhow::bail!("recursion_limit must be at least 1");
        }
        if self.max_tool_rounds == 0 {
            anyhow::bail!("max_tool_rounds must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!(
                "Config file not found. Run 'stepwise onboard' to set up your configuration."
            )
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config in {}", config_path.display()))?;

    config.workspace_dir = config_path
        .parent()
        .map(|dir| dir.join("workspace"))
        .unwrap_or_else(|| get_stepwise_dir().join("workspace"));

    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_stepwise_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
