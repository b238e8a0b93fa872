use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dates::DateFormat;
use crate::documents::DocumentKind;
use crate::error::ConfigError;
use crate::packager::FailurePolicy;
use crate::stylesheet::Stylesheet;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "SURVEILLANCES_CONFIG";
/// Environment variable overriding the bind address.
pub const BIND_ENV: &str = "SURVEILLANCES_BIND";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_address: String,
    /// Directory holding `style_convocation.json` and `style_fiche.json`.
    pub style_dir: PathBuf,
    /// Locale used for every date in the documents, e.g. `fr_FR`.
    pub locale: String,
    pub convocation_date_pattern: String,
    pub fiche_date_pattern: String,
    pub failure_policy: FailurePolicy,
    pub max_upload_bytes: usize,
    pub session_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_address: "127.0.0.1:3000".to_string(),
            style_dir: PathBuf::from("styles"),
            locale: "fr_FR".to_string(),
            convocation_date_pattern: "%A %d %B %Y".to_string(),
            fiche_date_pattern: "%A %-d %B %Y".to_string(),
            failure_policy: FailurePolicy::Continue,
            max_upload_bytes: 10 * 1024 * 1024,
            session_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the file named by `SURVEILLANCES_CONFIG`, then
    /// `SURVEILLANCES_BIND`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) => {
                info!("loading configuration from {}", path);
                Self::from_file(path)?
            }
            Err(_) => AppConfig::default(),
        };
        if let Ok(bind) = env::var(BIND_ENV) {
            config.bind_address = bind;
        }
        Ok(config)
    }

    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in DocumentKind::ALL {
            self.date_format(kind)?;
        }
        Ok(())
    }

    pub fn date_format(&self, kind: DocumentKind) -> Result<DateFormat, ConfigError> {
        let pattern = match kind {
            DocumentKind::Convocation => &self.convocation_date_pattern,
            DocumentKind::Fiche => &self.fiche_date_pattern,
        };
        DateFormat::new(&self.locale, pattern.as_str())
    }

    pub fn stylesheet_path(&self, kind: DocumentKind) -> PathBuf {
        self.style_dir.join(kind.stylesheet_name())
    }

    /// The stylesheet of `kind`, or the defaults when the file is unusable.
    pub fn stylesheet(&self, kind: DocumentKind) -> Stylesheet {
        Stylesheet::load_or_default(self.stylesheet_path(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "bind_address": "0.0.0.0:8080", "failure_policy": "abort" }"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.locale, "fr_FR");
        assert_eq!(
            config.stylesheet_path(DocumentKind::Fiche),
            PathBuf::from("styles/style_fiche.json")
        );
    }

    #[test]
    fn unknown_locale_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "locale": "klingon" }"#).unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(ConfigError::UnknownLocale(_))
        ));
    }

    #[test]
    fn bad_date_patterns_are_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "fiche_date_pattern": "%A %Q" }"#).unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(ConfigError::InvalidPattern(p)) if p == "%A %Q"
        ));

        let config = AppConfig {
            convocation_date_pattern: "%d %Q".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn broken_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn date_formats_follow_kind() {
        let config = AppConfig::default();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            config.date_format(DocumentKind::Convocation).unwrap().format(date),
            "vendredi 05 janvier 2024"
        );
        assert_eq!(
            config.date_format(DocumentKind::Fiche).unwrap().format(date),
            "vendredi 5 janvier 2024"
        );
    }
}
