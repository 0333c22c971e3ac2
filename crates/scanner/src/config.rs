use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use supabase::SupabaseConfig;

pub const DEFAULT_CONFIG_FILE: &str = "taxonomy_config.json";
pub const DEFAULT_SCAN_INTERVAL_HOURS: u64 = 6;

#[derive(Clone, Debug, Deserialize)]
pub struct TaxonomyConfig {
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub scan_path: Option<PathBuf>,
    #[serde(default)]
    pub scan_limit: Option<usize>,
    #[serde(default = "default_scan_interval_hours")]
    pub scan_interval_hours: u64,
}

fn default_scan_interval_hours() -> u64 {
    DEFAULT_SCAN_INTERVAL_HOURS
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Json(PathBuf, serde_json::Error),
    MissingKey(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => {
                write!(f, "failed to read {}: {}", path.display(), err)
            }
            ConfigError::Json(path, err) => {
                write!(f, "invalid config {}: {}", path.display(), err)
            }
            ConfigError::MissingKey(key) => write!(f, "config key {} is missing or empty", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Loads and validates the JSON config. The database credentials are the
/// only hard requirement; everything else has a default or comes from the
/// command line.
pub fn load_config(path: &Path) -> Result<TaxonomyConfig, ConfigError> {
    let text =
        fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
    let config: TaxonomyConfig =
        serde_json::from_str(&text).map_err(|err| ConfigError::Json(path.to_path_buf(), err))?;
    if config.supabase.url.trim().is_empty() {
        return Err(ConfigError::MissingKey("supabase.url"));
    }
    if config.supabase.service_role_key.trim().is_empty() {
        return Err(ConfigError::MissingKey("supabase.service_role_key"));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn full_config_parses() {
        let file = write_config(
            r#"{
                "supabase": {
                    "url": "https://example.supabase.co",
                    "service_role_key": "secret"
                },
                "scan_path": "/music",
                "scan_limit": 500,
                "scan_interval_hours": 12
            }"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.supabase.url, "https://example.supabase.co");
        assert_eq!(config.scan_path.as_deref(), Some(Path::new("/music")));
        assert_eq!(config.scan_limit, Some(500));
        assert_eq!(config.scan_interval_hours, 12);
    }

    #[test]
    fn interval_defaults_to_six_hours() {
        let file = write_config(
            r#"{"supabase": {"url": "https://x", "service_role_key": "k"}}"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.scan_interval_hours, DEFAULT_SCAN_INTERVAL_HOURS);
        assert_eq!(config.scan_path, None);
    }

    #[test]
    fn blank_credentials_are_rejected() {
        let file = write_config(
            r#"{"supabase": {"url": "https://x", "service_role_key": "  "}}"#,
        );
        match load_config(file.path()) {
            Err(ConfigError::MissingKey(key)) => {
                assert_eq!(key, "supabase.service_role_key")
            }
            other => panic!("expected MissingKey, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn absent_file_reports_the_path() {
        let err = load_config(Path::new("/nonexistent/taxonomy_config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
        assert!(err.to_string().contains("/nonexistent/taxonomy_config.json"));
    }
}
