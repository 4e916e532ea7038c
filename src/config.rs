//! Layered configuration (§3.3, §6.3): defaults < config file < environment
//! < command-line flags. Loaded once per process into an immutable snapshot
//! shared read-only by every request handler.
//!
//! Grounded on the teacher's `Config::load` (file-then-env layering); this
//! gateway adds a fourth, highest-precedence layer for explicit CLI flags.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unrecognized log level '{}'", other)),
        }
    }
}

/// Immutable, process-wide configuration snapshot (§3.1, §3.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub listen_port: u16,
    pub ollama_base_url: String,
    pub default_model: String,
    pub model_map: HashMap<String, String>,
    pub strict_thinking: bool,
    pub sequential_tool_calls: bool,
    pub log_level: LogLevel,
    pub log_file: Option<String>,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            listen_port: 3000,
            ollama_base_url: "http://localhost:11434".to_string(),
            default_model: "llama3.1".to_string(),
            model_map: HashMap::new(),
            strict_thinking: false,
            sequential_tool_calls: true,
            log_level: LogLevel::Info,
            log_file: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Fields deserialized straight off the TOML config file. Every field is
/// optional there so a partial file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    port: Option<u16>,
    ollama_url: Option<String>,
    default_model: Option<String>,
    model_map: Option<HashMap<String, String>>,
    strict_thinking: Option<bool>,
    sequential_tool_calls: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// Explicit command-line overrides; every field is `None` when the flag was
/// not passed, so this layer only touches what the operator actually typed.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub ollama_url: Option<String>,
    pub default_model: Option<String>,
    pub strict_thinking: Option<bool>,
    pub sequential_tool_calls: Option<bool>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

impl Configuration {
    /// Loads the layered configuration: defaults, then an optional TOML
    /// config file, then environment variables, then CLI overrides.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        let mut config = Configuration::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let file_config: FileConfig = toml::from_str(&content)?;
                config.apply_file(file_config)?;
            }
        }

        config.apply_env()?;
        config.apply_cli(cli)?;

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<()> {
        if let Some(port) = file.port {
            self.listen_port = port;
        }
        if let Some(url) = file.ollama_url {
            self.ollama_base_url = url;
        }
        if let Some(model) = file.default_model {
            self.default_model = model;
        }
        if let Some(map) = file.model_map {
            self.model_map = map;
        }
        if let Some(strict) = file.strict_thinking {
            self.strict_thinking = strict;
        }
        if let Some(seq) = file.sequential_tool_calls {
            self.sequential_tool_calls = seq;
        }
        if let Some(level) = file.log_level {
            self.log_level = level.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if let Some(log_file) = file.log_file {
            self.log_file = Some(log_file);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            self.listen_port = port.parse()?;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.ollama_base_url = url;
        }
        if let Ok(model) = std::env::var("GATEWAY_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Ok(strict) = std::env::var("GATEWAY_STRICT_THINKING") {
            self.strict_thinking = parse_bool_env(&strict)?;
        }
        if let Ok(seq) = std::env::var("GATEWAY_SEQUENTIAL_TOOL_CALLS") {
            self.sequential_tool_calls = parse_bool_env(&seq)?;
        }
        if let Ok(level) = std::env::var("GATEWAY_LOG_LEVEL") {
            self.log_level = level.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if let Ok(log_file) = std::env::var("GATEWAY_LOG_FILE") {
            self.log_file = Some(log_file);
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: CliOverrides) -> Result<()> {
        if let Some(port) = cli.port {
            self.listen_port = port;
        }
        if let Some(url) = cli.ollama_url {
            self.ollama_base_url = url;
        }
        if let Some(model) = cli.default_model {
            self.default_model = model;
        }
        if let Some(strict) = cli.strict_thinking {
            self.strict_thinking = strict;
        }
        if let Some(seq) = cli.sequential_tool_calls {
            self.sequential_tool_calls = seq;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }
        if let Some(log_file) = cli.log_file {
            self.log_file = Some(log_file);
        }
        Ok(())
    }

    /// Resolve the outbound Ollama model name for a client-supplied model
    /// string (§4.1).
    pub fn resolve_model(&self, client_model: &str) -> String {
        if let Some(mapped) = self.model_map.get(client_model) {
            return mapped.clone();
        }
        if !client_model.starts_with("claude") {
            return client_model.to_string();
        }
        self.default_model.clone()
    }
}

fn parse_bool_env(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("cannot parse '{}' as a boolean", other)),
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(de)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Configuration::default();
        assert_eq!(config.listen_port, 3000);
        assert!(!config.strict_thinking);
        assert!(config.sequential_tool_calls);
    }

    #[test]
    fn resolve_model_uses_map_first() {
        let mut config = Configuration::default();
        config
            .model_map
            .insert("claude-3-5-sonnet-20241022".to_string(), "qwen3:32b".to_string());
        assert_eq!(
            config.resolve_model("claude-3-5-sonnet-20241022"),
            "qwen3:32b"
        );
    }

    #[test]
    fn resolve_model_passes_through_non_claude_names() {
        let config = Configuration::default();
        assert_eq!(config.resolve_model("llama3.1:8b"), "llama3.1:8b");
    }

    #[test]
    fn resolve_model_falls_back_to_default_for_claude_prefix() {
        let config = Configuration::default();
        assert_eq!(
            config.resolve_model("claude-3-opus-20240229"),
            config.default_model
        );
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let mut config = Configuration::default();
        config
            .apply_file(FileConfig {
                port: Some(4000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.listen_port, 4000);
    }

    #[test]
    fn cli_layer_has_final_say() {
        let mut config = Configuration::default();
        config
            .apply_file(FileConfig {
                port: Some(4000),
                ..Default::default()
            })
            .unwrap();
        config
            .apply_cli(CliOverrides {
                port: Some(5000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.listen_port, 5000);
    }
}
