use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};

use directories::BaseDirs;

/// Built-in defaults; user overrides layer on top.
const CONFIG: &str = include_str!("../.config/config.json5");

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();
    pub static ref CONFIG_FILE_ENV: String = format!("{}_CONFIG", PROJECT_NAME.clone());
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut cfg: Self =
            json5::from_str(CONFIG).unwrap_or(Self { planner: PlannerConfig::default() });
        if cfg.planner.openai.api_key.is_empty()
            && let Ok(key) = env::var("OPENAI_API_KEY")
        {
            cfg.planner.openai.api_key = key;
        }
        cfg
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlannerProvider {
    #[default]
    Ollama,
    OpenAI,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PlannerConfig {
    #[serde(default)]
    pub provider: PlannerProvider,
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            provider: PlannerProvider::default(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| String::new());
        Self {
            api_key,
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self { host: default_ollama_host(), model: default_ollama_model() }
    }
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

impl Config {
    /// Layer the embedded defaults with a user config file: an explicit
    /// path wins, then `$DATACHAT_CONFIG`, then `~/.datachat-config.json5`.
    pub fn from_path(config_path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5));

        if let Some(path) = config_path {
            builder = builder.add_source(
                config::File::from(path.clone())
                    .format(config::FileFormat::Json5)
                    .required(true),
            );
        } else if let Some(path) = discovered_config_path() {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json5)
                    .required(false),
            );
        }

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        if cfg.planner.openai.api_key.is_empty()
            && let Ok(key) = env::var("OPENAI_API_KEY")
        {
            cfg.planner.openai.api_key = key;
        }
        Ok(cfg)
    }
}

fn discovered_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_FILE_ENV.as_str()) {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".datachat-config.json5"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn embedded_defaults_parse() {
        let cfg: Config = json5::from_str(CONFIG).unwrap();
        assert_eq!(cfg.planner.provider, PlannerProvider::Ollama);
        assert_eq!(cfg.planner.ollama.host, "http://localhost:11434");
        assert_eq!(cfg.planner.ollama.model, "llama3.2");
        assert_eq!(cfg.planner.timeout_secs, 120);
    }

    #[test]
    fn user_file_overrides_layer_over_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("override.json5");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "{{ planner: {{ provider: \"openai\", openai: {{ model: \"gpt-4o\", api_key: \"k\" }} }} }}"
        )
        .unwrap();

        let cfg = Config::from_path(Some(&path)).unwrap();
        assert_eq!(cfg.planner.provider, PlannerProvider::OpenAI);
        assert_eq!(cfg.planner.openai.model, "gpt-4o");
        assert_eq!(cfg.planner.openai.api_key, "k");
        // untouched fields keep the embedded defaults
        assert_eq!(cfg.planner.ollama.model, "llama3.2");
        assert_eq!(cfg.planner.timeout_secs, 120);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = PathBuf::from("/definitely/not/a/config.json5");
        assert!(Config::from_path(Some(&path)).is_err());
    }
}
