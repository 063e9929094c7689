// Language and limit configuration shared by the judge and its hosts
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::Language;

pub const DEFAULT_CONFIG_PATH: &str = "config/languages.json";

/// Per-test deadline raced against every execution.
pub const DEFAULT_TIME_LIMIT_MS: u64 = 5000;
/// Ceiling on how long an abandoned execution may keep running.
pub const DEFAULT_WALL_CAP_MS: u64 = 30_000;
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024; // 1MB
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024; // 1MB per stream

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageExecution {
    pub command: String,
    pub args: Vec<String>,
    pub file_extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    pub image: String,
    pub execution: LanguageExecution,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::from_json_str(&content)
            .with_context(|| format!("Failed to load {}", config_path.display()))
    }

    /// Load with default path (config/languages.json)
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson =
            serde_json::from_str(content).context("Failed to parse languages.json")?;

        let mut configs = HashMap::new();
        for lang in languages_json.languages {
            let language = Language::from_str(&lang.name)
                .ok_or_else(|| anyhow::anyhow!("Unknown language '{}' in languages.json", lang.name))?;
            configs.insert(language, lang);
        }

        if configs.is_empty() {
            bail!("No languages configured in languages.json");
        }

        Ok(Self { configs })
    }

    /// Interpreters expected on a developer machine, and the images used by the Docker backend
    pub fn builtin() -> Self {
        let configs = Language::ALL
            .iter()
            .map(|language| (*language, builtin_config(*language)))
            .collect();
        Self { configs }
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut languages: Vec<LanguageConfig> = self.configs.values().cloned().collect();
        languages.sort_by(|a, b| a.name.cmp(&b.name));

        let json_content = serde_json::to_string_pretty(&LanguagesJson { languages })
            .context("Failed to serialize languages.json")?;
        fs::write(config_path, json_content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Ok(())
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        self.configs
            .get(language)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", language))
    }

    pub fn is_configured(&self, language: &Language) -> bool {
        self.configs.contains_key(language)
    }

    /// Get Docker image for a language
    pub fn get_image(&self, language: &Language) -> Result<String> {
        Ok(self.get_config(language)?.image.clone())
    }

    /// Get memory limit for a language
    pub fn get_memory_limit_mb(&self, language: &Language) -> Result<u32> {
        Ok(self.get_config(language)?.memory_limit_mb)
    }

    /// Get CPU limit for a language
    pub fn get_cpu_limit(&self, language: &Language) -> Result<f32> {
        Ok(self.get_config(language)?.cpu_limit)
    }

    /// List all configured languages, sorted by name
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().map(|l| l.to_string()).collect();
        names.sort();
        names
    }
}

fn builtin_config(language: Language) -> LanguageConfig {
    let (version, image, command, args, file_extension) = match language {
        Language::Python => ("3.12", "python:3.12-slim", "python3", vec!["-u"], ".py"),
        Language::JavaScript => ("22", "node:22-slim", "node", vec![], ".js"),
        Language::TypeScript => (
            "22",
            "node:22-slim",
            "node",
            vec!["--experimental-strip-types", "--no-warnings"],
            ".ts",
        ),
    };

    LanguageConfig {
        name: language.to_string(),
        version: version.to_string(),
        image: image.to_string(),
        execution: LanguageExecution {
            command: command.to_string(),
            args: args.into_iter().map(String::from).collect(),
            file_extension: file_extension.to_string(),
        },
        memory_limit_mb: 256,
        cpu_limit: 0.5,
    }
}

/// Resource limits applied to every execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub time_limit: Duration,
    pub wall_cap: Duration,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_millis(DEFAULT_TIME_LIMIT_MS),
            wall_cap: Duration::from_millis(DEFAULT_WALL_CAP_MS),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl ExecutionLimits {
    /// Defaults overridden by KATA_TIME_LIMIT_MS, KATA_WALL_CAP_MS and KATA_MAX_OUTPUT_BYTES
    pub fn from_env() -> Result<Self> {
        let mut limits = Self::default();

        if let Some(ms) = env_number::<u64>("KATA_TIME_LIMIT_MS")? {
            limits.time_limit = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("KATA_WALL_CAP_MS")? {
            limits.wall_cap = Duration::from_millis(ms);
        }
        if let Some(bytes) = env_number::<usize>("KATA_MAX_OUTPUT_BYTES")? {
            limits.max_output_bytes = bytes;
        }

        limits.validate()?;
        Ok(limits)
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_limit.is_zero() {
            bail!("Time limit must be greater than zero");
        }
        if self.wall_cap < self.time_limit {
            bail!(
                "Wall cap ({}ms) must not be shorter than the time limit ({}ms)",
                self.wall_cap.as_millis(),
                self.time_limit.as_millis()
            );
        }
        Ok(())
    }
}

fn env_number<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", key, raw, e)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_language() {
        let manager = LanguageConfigManager::builtin();
        for language in Language::ALL {
            assert!(manager.is_configured(&language));
        }
        assert_eq!(manager.list_languages(), vec!["javascript", "python", "typescript"]);
        assert_eq!(manager.get_config(&Language::Python).unwrap().execution.command, "python3");
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "languages": [{
                "name": "python",
                "version": "3.11",
                "image": "python:3.11-slim",
                "execution": { "command": "python3", "args": ["-u"], "file_extension": ".py" },
                "memory_limit_mb": 128,
                "cpu_limit": 1.0
            }]
        }"#;

        let manager = LanguageConfigManager::from_json_str(json).unwrap();
        assert_eq!(manager.get_memory_limit_mb(&Language::Python).unwrap(), 128);
        assert_eq!(manager.get_image(&Language::Python).unwrap(), "python:3.11-slim");
        assert_eq!(manager.get_cpu_limit(&Language::Python).unwrap(), 1.0);
        assert!(!manager.is_configured(&Language::TypeScript));
        assert!(manager.get_config(&Language::JavaScript).is_err());
    }

    #[test]
    fn test_unknown_language_rejected() {
        let json = r#"{
            "languages": [{
                "name": "ruby",
                "version": "3",
                "image": "ruby:3",
                "execution": { "command": "ruby", "args": [], "file_extension": ".rb" },
                "memory_limit_mb": 128,
                "cpu_limit": 1.0
            }]
        }"#;

        let err = LanguageConfigManager::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("ruby"));
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(LanguageConfigManager::from_json_str(r#"{ "languages": [] }"#).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("kata-config-test-{}", std::process::id()));
        let path = dir.join("languages.json");

        LanguageConfigManager::builtin().save(&path).unwrap();
        let loaded = LanguageConfigManager::load(&path).unwrap();
        assert_eq!(
            loaded.get_config(&Language::TypeScript).unwrap(),
            LanguageConfigManager::builtin().get_config(&Language::TypeScript).unwrap()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file() {
        let result = LanguageConfigManager::load(Path::new("/nonexistent/languages.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_limits_validation() {
        assert!(ExecutionLimits::default().validate().is_ok());

        let short_cap = ExecutionLimits {
            wall_cap: Duration::from_millis(10),
            ..ExecutionLimits::default()
        };
        assert!(short_cap.validate().is_err());

        let zero = ExecutionLimits::default().with_time_limit(Duration::ZERO);
        assert!(zero.validate().is_err());
    }
}
