pub mod keywords;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::{CaseError, CaseResult};

pub use keywords::{LexiconConfig, SpecialtyRule};

pub const SETTINGS_PATH: &str = "config/settings.toml";
pub const KEYWORDS_PATH: &str = "config/keywords.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub extraction: ExtractionConfig,
    pub processing: ProcessingConfig,
    pub output: OutputConfig,
    pub watch: WatchConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// 按顺序尝试的文本提取后端
    pub backends: Vec<String>,
    pub pdftotext_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessingConfig {
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub txt_dir: String,
    pub csv_path: String,
    pub write_bom: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_path: String,
}

impl AppConfig {
    pub fn load() -> CaseResult<Self> {
        Self::load_from(PathBuf::from(SETTINGS_PATH))
    }

    pub fn load_from(path: impl AsRef<Path>) -> CaseResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CaseError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CaseResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CaseError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// sqlx 连接串
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.storage.database_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig {
                backends: vec![
                    "pdftotext".to_string(),
                    "pdf-extract".to_string(),
                    "lopdf".to_string(),
                ],
                pdftotext_path: "pdftotext".to_string(),
            },
            processing: ProcessingConfig { workers: 4 },
            output: OutputConfig {
                txt_dir: "./data/txt".to_string(),
                csv_path: "./data/case_reports.csv".to_string(),
                write_bom: true,
            },
            watch: WatchConfig { interval_secs: 5 },
            storage: StorageConfig {
                database_path: "./data/caserep.db".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut config = AppConfig::default();
        config.processing.workers = 2;
        config.save(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.processing.workers, 2);
        assert_eq!(loaded.extraction.backends, vec!["pdftotext", "pdf-extract", "lopdf"]);
        assert!(loaded.output.write_bom);
    }

    #[test]
    fn missing_settings_use_defaults() {
        let config = AppConfig::load_from("/nonexistent/settings.toml").unwrap();
        assert_eq!(config.watch.interval_secs, 5);
        assert_eq!(config.database_url(), "sqlite:./data/caserep.db?mode=rwc");
    }
}
