//! Configuration management for `wordstore`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. Explicit overrides
//! 2. Environment variables (`WORDSTORE_*`)
//! 3. YAML config file (`wordstore.yaml`)
//! 4. Defaults
//!
//! Keys are normalized so `seed_policy`, `seed-policy` and a nested
//! `seed: { policy: ... }` all name the same setting.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::model::Word;
use crate::storage::OpenKind;

/// Default config filename looked up by hosts.
pub const DEFAULT_CONFIG_FILENAME: &str = "wordstore.yaml";

const ENV_PREFIX: &str = "WORDSTORE_";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

const KEY_DB: &str = "db";
const KEY_SEED_POLICY: &str = "seed-policy";
const KEY_SEED_WORDS: &str = "seed-words";
const KEY_SEED_FILE: &str = "seed-file";
const KEY_BUSY_TIMEOUT: &str = "busy-timeout-ms";

/// When the seed words are written into the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeedPolicy {
    /// Never seed.
    #[default]
    Never,
    /// Seed only when the database file was just created.
    OnCreate,
    /// Clear and re-seed on every open.
    OnOpen,
}

impl SeedPolicy {
    #[must_use]
    pub const fn applies_to(self, kind: OpenKind) -> bool {
        match self {
            Self::Never => false,
            Self::OnCreate => matches!(kind, OpenKind::Created),
            Self::OnOpen => true,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::OnCreate => "on-create",
            Self::OnOpen => "on-open",
        }
    }
}

impl fmt::Display for SeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeedPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_key(s).as_str() {
            "never" | "none" | "off" => Ok(Self::Never),
            "on-create" | "create" | "once" => Ok(Self::OnCreate),
            "on-open" | "open" | "always" => Ok(Self::OnOpen),
            other => Err(StoreError::Config(format!("unknown seed policy: {other}"))),
        }
    }
}

/// Fully resolved settings for opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file; `None` means in-memory.
    pub db_path: Option<PathBuf>,
    pub seed_policy: SeedPolicy,
    pub seed_words: Vec<Word>,
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            seed_policy: SeedPolicy::Never,
            seed_words: Vec::new(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl StoreConfig {
    /// Resolve settings from a merged layer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] for malformed values, and propagates
    /// read/parse failures of a configured seed file.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let mut config = Self::default();

        if let Some(db) = layer.get(KEY_DB) {
            let db = db.trim();
            if !db.is_empty() && db != ":memory:" {
                config.db_path = Some(PathBuf::from(db));
            }
        }

        if let Some(policy) = layer.get(KEY_SEED_POLICY) {
            config.seed_policy = policy.parse()?;
        }

        if let Some(timeout) = layer.get(KEY_BUSY_TIMEOUT) {
            let millis = timeout.trim().parse::<u64>().map_err(|_| {
                StoreError::Config(format!("{KEY_BUSY_TIMEOUT} must be an integer, got {timeout:?}"))
            })?;
            config.busy_timeout = Duration::from_millis(millis);
        }

        let mut raw_words = layer.list(KEY_SEED_WORDS).to_vec();
        if let Some(path) = layer.get(KEY_SEED_FILE) {
            raw_words.extend(load_seed_file(Path::new(path))?);
        }
        config.seed_words = raw_words
            .into_iter()
            .map(|raw| {
                Word::new(raw.clone())
                    .map_err(|_| StoreError::Config(format!("invalid seed word: {raw:?}")))
            })
            .collect::<Result<_>>()?;

        Ok(config)
    }
}

/// Read a JSON array of strings.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON string array.
pub fn load_seed_file(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// One source of settings, with keys normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    values: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
        for (key, value) in &other.lists {
            self.lists.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = normalize_key(key);
        let value = value.into();
        if key == KEY_SEED_WORDS {
            self.lists.insert(key, split_list(&value));
        } else {
            self.values.insert(key, value);
        }
    }

    pub fn set_list(&mut self, key: &str, values: Vec<String>) {
        self.lists.insert(normalize_key(key), values);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    #[must_use]
    pub fn list(&self, key: &str) -> &[String] {
        self.lists
            .get(&normalize_key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// A relative `seed.file` is resolved against the config file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let mut layer = Self::from_yaml_str(&contents)?;

        if let Some(seed_file) = layer.get(KEY_SEED_FILE).map(PathBuf::from) {
            if seed_file.is_relative() {
                if let Some(parent) = path.parent() {
                    let resolved = parent.join(seed_file);
                    layer.set(KEY_SEED_FILE, resolved.to_string_lossy());
                }
            }
        }

        Ok(layer)
    }

    /// Build a layer from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        let mut layer = Self::default();
        flatten_yaml(&value, "", &mut layer);
        Ok(layer)
    }

    /// Build a layer from `WORDSTORE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build a layer from `(name, value)` pairs, keeping `WORDSTORE_*` ones.
    #[must_use]
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.set(stripped, value);
            }
        }
        layer
    }
}

/// Explicit overrides supplied by the host (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db: Option<PathBuf>,
    pub seed_policy: Option<SeedPolicy>,
    pub seed_words: Option<Vec<String>>,
    pub busy_timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            layer.set(KEY_DB, path.to_string_lossy());
        }
        if let Some(policy) = self.seed_policy {
            layer.set(KEY_SEED_POLICY, policy.as_str());
        }
        if let Some(words) = &self.seed_words {
            layer.set_list(KEY_SEED_WORDS, words.clone());
        }
        if let Some(timeout) = self.busy_timeout_ms {
            layer.set(KEY_BUSY_TIMEOUT, timeout.to_string());
        }

        layer
    }
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.set(KEY_SEED_POLICY, SeedPolicy::Never.as_str());
    layer.set(KEY_BUSY_TIMEOUT, DEFAULT_BUSY_TIMEOUT_MS.to_string());
    layer
}

/// Load configuration with the standard precedence order.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed, or a value is invalid.
pub fn load_config(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<StoreConfig> {
    let file_layer = match config_file {
        Some(path) => ConfigLayer::from_yaml(path)?,
        None => ConfigLayer::default(),
    };

    let merged = ConfigLayer::merge_layers(&[
        default_config_layer(),
        file_layer,
        ConfigLayer::from_env(),
        overrides.as_layer(),
    ]);
    StoreConfig::from_layer(&merged)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(['_', '.'], "-")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut ConfigLayer) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let items = values.iter().filter_map(yaml_scalar_to_string).collect();
            out.set_list(prefix, items);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.set(prefix, value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_in_memory_without_seed() {
        let config = StoreConfig::from_layer(&default_config_layer()).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.db_path.is_none());
    }

    #[test]
    fn yaml_nested_keys_are_flattened() {
        let layer = ConfigLayer::from_yaml_str(
            "db: words.db\nseed:\n  policy: on-create\n  words: [dolphin, crocodile, cobra]\nbusy_timeout_ms: 250\n",
        )
        .unwrap();
        let config = StoreConfig::from_layer(&layer).unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("words.db")));
        assert_eq!(config.seed_policy, SeedPolicy::OnCreate);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        let words: Vec<&str> = config.seed_words.iter().map(Word::as_str).collect();
        assert_eq!(words, vec!["dolphin", "crocodile", "cobra"]);
    }

    #[test]
    fn merge_precedence_order() {
        let file = ConfigLayer::from_yaml_str("db: file.db\nseed_policy: on-open\n").unwrap();
        let env_layer = ConfigLayer::from_vars(vars(&[
            ("WORDSTORE_DB", "env.db"),
            ("UNRELATED", "ignored"),
        ]));
        let overrides = ConfigOverrides {
            seed_policy: Some(SeedPolicy::Never),
            ..ConfigOverrides::default()
        };

        let merged = ConfigLayer::merge_layers(&[
            default_config_layer(),
            file,
            env_layer,
            overrides.as_layer(),
        ]);
        let config = StoreConfig::from_layer(&merged).unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("env.db")));
        assert_eq!(config.seed_policy, SeedPolicy::Never);
        assert!(merged.get("unrelated").is_none());
    }

    #[test]
    fn env_seed_words_are_comma_separated() {
        let layer = ConfigLayer::from_vars(vars(&[("WORDSTORE_SEED_WORDS", "hello, world ,,")]));
        assert_eq!(layer.list("seed.words"), ["hello", "world"]);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let mut layer = ConfigLayer::default();
        layer.set("seed-policy", "sometimes");
        assert!(matches!(
            StoreConfig::from_layer(&layer),
            Err(StoreError::Config(_))
        ));

        let mut layer = ConfigLayer::default();
        layer.set("busy_timeout_ms", "soon");
        assert!(matches!(
            StoreConfig::from_layer(&layer),
            Err(StoreError::Config(_))
        ));

        let mut layer = ConfigLayer::default();
        layer.set_list("seed-words", vec!["ok".into(), "  ".into()]);
        assert!(matches!(
            StoreConfig::from_layer(&layer),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn memory_marker_means_no_path() {
        let mut layer = ConfigLayer::default();
        layer.set("db", ":memory:");
        assert!(StoreConfig::from_layer(&layer).unwrap().db_path.is_none());
    }

    #[test]
    fn seed_file_is_resolved_next_to_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("seed.json"), r#"["zebra", "ant"]"#).unwrap();
        let config_path = dir.path().join(DEFAULT_CONFIG_FILENAME);
        fs::write(&config_path, "seed:\n  words: [yak]\n  file: seed.json\n").unwrap();

        let config = load_config(Some(&config_path), &ConfigOverrides::default()).unwrap();
        let words: Vec<&str> = config.seed_words.iter().map(Word::as_str).collect();
        assert_eq!(words, vec!["yak", "zebra", "ant"]);
    }

    #[test]
    fn missing_config_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let layer = ConfigLayer::from_yaml(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(layer, ConfigLayer::default());
    }

    #[test]
    fn seed_policy_applies_by_open_kind() {
        assert!(!SeedPolicy::Never.applies_to(OpenKind::Created));
        assert!(SeedPolicy::OnCreate.applies_to(OpenKind::Created));
        assert!(!SeedPolicy::OnCreate.applies_to(OpenKind::Existing));
        assert!(SeedPolicy::OnOpen.applies_to(OpenKind::Existing));
        assert_eq!("on_open".parse::<SeedPolicy>().unwrap(), SeedPolicy::OnOpen);
    }
}
