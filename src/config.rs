use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{self, Classification};

const DEFAULT_ENV_PREFIX: &str = "PICROLL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_categories_base")]
    pub categories_base: String,
    #[serde(default = "default_images_base")]
    pub images_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            categories_base: default_categories_base(),
            images_base: default_images_base(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_categories_base() -> String {
    api::CATEGORIES_BASE.to_string()
}

fn default_images_base() -> String {
    api::IMAGES_BASE.to_string()
}

fn default_user_agent() -> String {
    format!("picroll/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default)]
    pub classification: Classification,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_fade", with = "humantime_serde")]
    pub fade: Duration,
    #[serde(default = "default_auto_fetch")]
    pub auto_fetch: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            classification: Classification::default(),
            category: default_category(),
            fade: default_fade(),
            auto_fetch: default_auto_fetch(),
        }
    }
}

fn default_category() -> String {
    crate::viewer::ALL_CATEGORIES.into()
}

fn default_fade() -> Duration {
    Duration::from_millis(300)
}

fn default_auto_fetch() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(path.exists(), "config file {} not found", path.display());
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.categories_base.is_empty() {
        base.api.categories_base = other.api.categories_base;
    }
    if !other.api.images_base.is_empty() {
        base.api.images_base = other.api.images_base;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.timeout.is_zero() {
        base.api.timeout = other.api.timeout;
    }

    base.ui.classification = other.ui.classification;
    if !other.ui.category.is_empty() {
        base.ui.category = other.ui.category;
    }
    base.ui.fade = other.ui.fade;
    base.ui.auto_fetch = other.ui.auto_fetch;

    if other.log.file.is_some() {
        base.log.file = other.log.file;
    }
    if other.log.filter.is_some() {
        base.log.filter = other.log.filter;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.categories_base" => cfg.api.categories_base = value,
        "api.images_base" => cfg.api.images_base = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "ui.classification" => {
            if let Ok(parsed) = value.parse::<Classification>() {
                cfg.ui.classification = parsed;
            }
        }
        "ui.category" => cfg.ui.category = value,
        "ui.fade" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.ui.fade = duration;
            }
        }
        "ui.auto_fetch" => {
            cfg.ui.auto_fetch = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        // PICROLL_LOG is the short form of PICROLL_LOG__FILE.
        "log" | "log.file" => cfg.log.file = Some(PathBuf::from(value)),
        "log.filter" => cfg.log.filter = Some(value),
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("picroll").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::{tempdir, TempDir};

    fn empty_config() -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "{}\n").unwrap();
        (dir, path)
    }

    #[test]
    fn load_defaults_without_files() {
        let (_dir, path) = empty_config();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("PICROLL_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.categories_base, api::CATEGORIES_BASE);
        assert_eq!(cfg.ui.category, "all");
        assert_eq!(cfg.ui.fade, Duration::from_millis(300));
        assert!(cfg.ui.auto_fetch);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  images_base: http://127.0.0.1:9000\n  timeout: 5s\nui:\n  classification: nsfw\n  category: neko\n  fade: 1s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("PICROLL_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.images_base, "http://127.0.0.1:9000");
        assert_eq!(cfg.api.categories_base, api::CATEGORIES_BASE);
        assert_eq!(cfg.api.timeout, Duration::from_secs(5));
        assert_eq!(cfg.ui.classification, Classification::Nsfw);
        assert_eq!(cfg.ui.category, "neko");
        assert_eq!(cfg.ui.fade, Duration::from_secs(1));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load(LoadOptions {
            config_file: Some(dir.path().join("absent.yaml")),
            env_prefix: Some("PICROLL_TEST_MISSING".into()),
        });
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides() {
        env::set_var("PICROLL_TEST_ENV_UI__FADE", "750ms");
        env::set_var("PICROLL_TEST_ENV_LOG", "/tmp/picroll.log");
        let (_dir, path) = empty_config();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("PICROLL_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.ui.fade, Duration::from_millis(750));
        assert_eq!(cfg.log.file, Some(PathBuf::from("/tmp/picroll.log")));
        env::remove_var("PICROLL_TEST_ENV_UI__FADE");
        env::remove_var("PICROLL_TEST_ENV_LOG");
    }
}
