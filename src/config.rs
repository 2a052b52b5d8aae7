use crate::model::block::{DEFAULT_ALLOC_GRANULARITY, DEFAULT_BLOCK_SIZE};
use crate::model::file_io::LineEnding;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Buffer and storage settings
    #[serde(default)]
    pub editor: EditorConfig,
}

/// Per-buffer defaults and storage tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditorConfig {
    /// Display width of a tab stop
    #[serde(default = "default_tab_width")]
    pub tab_width: usize,

    /// Decode buffer content as UTF-8 (otherwise one byte per character)
    #[serde(default = "default_true")]
    pub utf8: bool,

    /// Line ending for new buffers and files without a newline
    #[serde(default)]
    pub default_line_ending: LineEnding,

    /// Nominal block capacity in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Block allocations are rounded up to a multiple of this
    #[serde(default = "default_alloc_granularity")]
    pub alloc_granularity: usize,
}

fn default_tab_width() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_alloc_granularity() -> usize {
    DEFAULT_ALLOC_GRANULARITY
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            tab_width: default_tab_width(),
            utf8: true,
            default_line_ending: LineEnding::default(),
            block_size: default_block_size(),
            alloc_granularity: default_alloc_granularity(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Config)).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.editor.tab_width) {
            return Err(ConfigError::ValidationError(
                "tab_width must be between 1 and 8".to_string(),
            ));
        }

        if self.editor.block_size < 64 {
            return Err(ConfigError::ValidationError(
                "block_size must be at least 64".to_string(),
            ));
        }

        if !self.editor.alloc_granularity.is_power_of_two() {
            return Err(ConfigError::ValidationError(
                "alloc_granularity must be a power of two".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.editor.tab_width, 8);
        assert!(config.editor.utf8);
        assert_eq!(config.editor.default_line_ending, LineEnding::LF);
        assert_eq!(config.editor.block_size, 16 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.editor.tab_width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.editor.tab_width = 9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.editor.block_size = 32;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.editor.alloc_granularity = 48;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let mut config = Config::default();
        config.editor.tab_width = 4;
        config.editor.default_line_ending = LineEnding::CRLF;
        config.save_to_file(&config_path).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.editor, config.editor);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "editor": { "utf8": false } }"#).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert!(!loaded.editor.utf8);
        assert_eq!(loaded.editor.tab_width, 8);
        assert_eq!(loaded.editor.alloc_granularity, 64);
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.json");
        assert!(matches!(
            Config::load_from_file(&missing),
            Err(ConfigError::IoError(_))
        ));

        let bad = temp_dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_file(&bad),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_schema_names_editor_fields() {
        let schema = Config::json_schema().to_string();
        assert!(schema.contains("tab_width"));
        assert!(schema.contains("default_line_ending"));
    }
}
