use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::pipeline::DEFAULT_MAX_STEPS;

pub const DEFAULT_HOST_URL: &str = "http://127.0.0.1:8765/execute";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_HOST_URL: &str = "EDITOR_RELAY_HOST_URL";
pub const ENV_TIMEOUT_SECS: &str = "EDITOR_RELAY_TIMEOUT_SECS";
pub const ENV_MAX_STEPS: &str = "EDITOR_RELAY_MAX_STEPS";
pub const ENV_API_PORT: &str = "EDITOR_RELAY_API_PORT";

// ── Relay settings ───────────────────────────────────────────────

/// Relay settings stored in the config directory.
///
/// Every field has a default so a partial (or missing) `settings.json` is
/// fine. Environment variables and CLI flags are layered on top by the
/// binaries; nothing here reads them implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Editor host command endpoint.
    pub host_url: String,
    /// How long one host call may stay outstanding.
    pub timeout_secs: u64,
    /// Upper bound on steps per pipeline run.
    pub max_pipeline_steps: usize,
    /// HTTP API port. 0 = OS-assigned.
    pub api_port: u16,
    /// Append every host call to the JSONL audit log.
    pub audit: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host_url: DEFAULT_HOST_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_pipeline_steps: DEFAULT_MAX_STEPS,
            api_port: 0,
            audit: true,
        }
    }
}

impl RelaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Overlay `EDITOR_RELAY_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), RelayError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, keyed by environment variable name.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_HOST_URL) {
            self.host_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_env(ENV_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.max_pipeline_steps = parse_env(ENV_MAX_STEPS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_API_PORT) {
            self.api_port = parse_env(ENV_API_PORT, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        let url = self.host_url.trim();
        if url.is_empty() {
            return Err(RelayError::config("host_url must not be empty"));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RelayError::config(format!(
                "host_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(RelayError::config("timeout_secs must be greater than 0"));
        }
        if self.max_pipeline_steps == 0 {
            return Err(RelayError::config("max_pipeline_steps must be greater than 0"));
        }
        Ok(())
    }
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_pipeline_steps: Option<usize>,
    pub api_port: Option<u16>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut RelaySettings) {
        if let Some(url) = &self.host_url {
            settings.host_url.clone_from(url);
        }
        if let Some(secs) = self.timeout_secs {
            settings.timeout_secs = secs;
        }
        if let Some(steps) = self.max_pipeline_steps {
            settings.max_pipeline_steps = steps;
        }
        if let Some(port) = self.api_port {
            settings.api_port = port;
        }
    }
}

/// Defaults, then `settings.json`, then environment, then `overrides`.
/// The merged result is validated before it is returned.
pub fn resolve_settings(
    config_dir: &Path,
    overrides: &SettingsOverrides,
) -> Result<RelaySettings, RelayError> {
    let mut settings = load_or_default(config_dir)?;
    settings.apply_env()?;
    overrides.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, RelayError> {
    raw.trim()
        .parse()
        .map_err(|_| RelayError::config(format!("{key} has an invalid value: '{raw}'")))
}

// ── Load / save ──────────────────────────────────────────────────

/// Load settings from the config directory. Returns `None` if no settings file
/// exists; a file that exists but does not parse is an error.
pub fn load_settings(config_dir: &Path) -> Result<Option<RelaySettings>, RelayError> {
    let path = crate::paths::settings_path(config_dir);
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(&path)?;
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| RelayError::config(format!("{}: {e}", path.display())))
}

/// Settings file contents, or defaults when there is none.
pub fn load_or_default(config_dir: &Path) -> Result<RelaySettings, RelayError> {
    Ok(load_settings(config_dir)?.unwrap_or_default())
}

/// Save settings to the config directory (write to a temp file, then rename).
pub fn save_settings(config_dir: &Path, settings: &RelaySettings) -> Result<(), RelayError> {
    fs::create_dir_all(config_dir)?;
    let path = crate::paths::settings_path(config_dir);
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| RelayError::config(e.to_string()))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_settings_round_trip() {
        let dir = std::env::temp_dir().join("editor_relay_test_settings");
        let _ = fs::remove_dir_all(&dir);

        let settings = RelaySettings {
            host_url: "http://10.0.0.5:9000/execute".into(),
            timeout_secs: 5,
            ..RelaySettings::default()
        };
        save_settings(&dir, &settings).unwrap();

        let loaded = load_settings(&dir).unwrap().expect("should load");
        assert_eq!(loaded, settings);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = std::env::temp_dir().join("editor_relay_test_no_settings");
        let _ = fs::remove_dir_all(&dir);
        assert!(load_settings(&dir).unwrap().is_none());
        assert_eq!(load_or_default(&dir).unwrap(), RelaySettings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join("editor_relay_test_partial_settings");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(crate::paths::settings_path(&dir), r#"{ "timeout_secs": 3 }"#).unwrap();

        let loaded = load_or_default(&dir).unwrap();
        assert_eq!(loaded.timeout_secs, 3);
        assert_eq!(loaded.host_url, DEFAULT_HOST_URL);
        assert_eq!(loaded.max_pipeline_steps, DEFAULT_MAX_STEPS);

        fs::write(crate::paths::settings_path(&dir), "not json").unwrap();
        assert_eq!(load_settings(&dir).unwrap_err().kind(), ErrorKind::ValidationError);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_HOST_URL, "https://editor.local/execute"),
            (ENV_TIMEOUT_SECS, "12"),
            (ENV_MAX_STEPS, "50"),
        ]);
        let mut settings = RelaySettings::default();
        settings
            .apply_env_from(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(settings.host_url, "https://editor.local/execute");
        assert_eq!(settings.timeout(), Duration::from_secs(12));
        assert_eq!(settings.max_pipeline_steps, 50);
        assert_eq!(settings.api_port, 0);
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut settings = RelaySettings::default();
        let err = settings
            .apply_env_from(|k| (k == ENV_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));
        assert!(err.to_string().contains(ENV_TIMEOUT_SECS));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut settings = RelaySettings {
            timeout_secs: 9,
            ..RelaySettings::default()
        };
        let overrides = SettingsOverrides {
            timeout_secs: Some(2),
            api_port: Some(4100),
            ..SettingsOverrides::default()
        };
        overrides.apply(&mut settings);
        assert_eq!(settings.timeout_secs, 2);
        assert_eq!(settings.api_port, 4100);
        assert_eq!(settings.host_url, DEFAULT_HOST_URL);
    }

    #[test]
    fn test_validate() {
        assert!(RelaySettings::default().validate().is_ok());

        let bad = [
            RelaySettings {
                host_url: "  ".into(),
                ..RelaySettings::default()
            },
            RelaySettings {
                host_url: "ftp://host".into(),
                ..RelaySettings::default()
            },
            RelaySettings {
                timeout_secs: 0,
                ..RelaySettings::default()
            },
            RelaySettings {
                max_pipeline_steps: 0,
                ..RelaySettings::default()
            },
        ];
        for settings in bad {
            assert!(settings.validate().is_err(), "{settings:?}");
        }
    }
}
