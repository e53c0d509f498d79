//! Language module configuration (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::STRUCT_MODULE;
use crate::logging::{self, LogConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Directory of Lua libraries made requirable by file stem
    #[serde(default)]
    pub lib_dir: Option<PathBuf>,

    /// Module providing the Vector/Matrix constructors
    #[serde(default = "default_struct_module")]
    pub struct_module: String,

    /// Cap on per-method errors reported for one plugin
    #[serde(default = "default_100")]
    pub max_export_errors: usize,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub json: bool,

    #[serde(default = "default_false")]
    pub spans: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            lib_dir: None,
            struct_module: default_struct_module(),
            max_export_errors: 100,
            log: LogSettings::default(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            json: false,
            spans: false,
        }
    }
}

fn default_struct_module() -> String { STRUCT_MODULE.to_string() }
fn default_level() -> String { "info".to_string() }
fn default_false() -> bool { false }
fn default_100() -> usize { 100 }

impl ModuleConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn with_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_dir = Some(dir.into());
        self
    }
}

impl LogSettings {
    /// Logging configuration for `logging::init_with_config`
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: logging::parse_level(&self.level).unwrap_or(tracing::Level::INFO),
            file_output: self.file.is_some(),
            log_path: self.file.clone(),
            json_format: self.json,
            show_spans: self.spans,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = ModuleConfig::parse("").unwrap();
        assert_eq!(config.struct_module, "plugify");
        assert_eq!(config.max_export_errors, 100);
        assert!(config.lib_dir.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_full() {
        let config = ModuleConfig::parse(
            r#"
            lib_dir = "scripts/lib"
            max_export_errors = 5

            [log]
            level = "debug"
            json = true
            file = "logs/lualink.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.lib_dir.as_deref(), Some(Path::new("scripts/lib")));
        assert_eq!(config.max_export_errors, 5);

        let log = config.log.to_log_config();
        assert_eq!(log.level, tracing::Level::DEBUG);
        assert!(log.json_format);
        assert!(log.file_output);
    }

    #[test]
    fn test_parse_error() {
        let err = ModuleConfig::parse("max_export_errors = \"many\"").unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lualink.toml");
        std::fs::write(&path, "struct_module = \"mathlib\"\n").unwrap();

        let config = ModuleConfig::load(&path).unwrap();
        assert_eq!(config.struct_module, "mathlib");
    }
}
