//! # Barde Configuration Module
//!
//! This module provides configuration management for Barde, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use bardeconfig::get_config;
//!
//! // Get the global configuration
//! let config = get_config();
//!
//! // Access configuration values
//! let rate = config.get_sample_rate();
//! let frame_ms = config.get_frame_duration_ms();
//!
//! // Update configuration values
//! config.set_bitrate(64_000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::Mutex,
    sync::Arc,
    time::Duration,
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("barde.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load Barde configuration"));
}

const ENV_CONFIG_DIR: &str = "BARDE_CONFIG";
const ENV_PREFIX: &str = "BARDE_CONFIG__";

// Default values for configuration
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_FRAME_DURATION_MS: u64 = 20;
const DEFAULT_BITRATE: u32 = 96_000;
const DEFAULT_CHANNEL_SIZE: usize = 16;
const DEFAULT_STALL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SEARCH_LIMIT: usize = 5;
const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:7070";
const DEFAULT_VOLUME: f64 = 0.5;
const DEFAULT_IDLE_EVICTION_SECS: u64 = 300;
const DEFAULT_CANCEL_GRACE_MS: u64 = 250;

/// Macro to generate getter/setter for integer values with default
macro_rules! impl_uint_config {
    ($getter:ident, $setter:ident, $ty:ty, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> $ty {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap() as $ty,
                Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap().max(0) as $ty,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: $ty) -> Result<()> {
            let n = Number::from(value as u64);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for float values with default
macro_rules! impl_f64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> f64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_f64().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: f64) -> Result<()> {
            let n = Number::from(value);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Configuration manager for Barde
///
/// This structure manages the engine configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// # Examples
///
/// ```no_run
/// use bardeconfig::get_config;
///
/// let config = get_config();
/// let bitrate = config.get_bitrate();
/// println!("Opus bitrate: {} bit/s", bitrate);
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

// Implémentation manuelle de Clone (Mutex n'est pas Clone)
impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(".barde").exists() {
            return ".barde".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".barde");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        ".barde".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        // Create if doesn't exist
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        // Verify it's a directory
        if !path.is_dir() {
            return Err(anyhow!("Configuration path is not a directory"));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `BARDE_CONFIG` environment variable
    /// 3. `.barde` in the current directory
    /// 4. `.barde` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for
    /// read/write permissions.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created or validated
    pub fn config_dir(directory: &str) -> String {
        let dir_path = Self::find_config_dir(directory);
        let path = Path::new(&dir_path);

        Self::validate_config_dir(path).expect("Cannot validate configuration directory");

        dir_path
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory containing the config.yaml file, or
    ///   empty to use the default search order
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory);
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        // Charger la configuration par défaut
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        // Essayer de charger le fichier de configuration
        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        // Merger avec la config par défaut
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        // Appliquer les overrides depuis les variables d'environnement
        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["audio", "bitrate"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["audio", "bitrate"]`)
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the YAML value or an error if the path
    /// doesn't exist
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        new_map.insert(new_key, Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Returns the configuration directory in use
    pub fn get_config_dir(&self) -> &str {
        &self.config_dir
    }

    // ============ Audio ============

    impl_uint_config!(
        get_sample_rate,
        set_sample_rate,
        u32,
        &["audio", "sample_rate"],
        DEFAULT_SAMPLE_RATE
    );

    impl_uint_config!(
        get_frame_duration_ms,
        set_frame_duration_ms,
        u64,
        &["audio", "frame_duration_ms"],
        DEFAULT_FRAME_DURATION_MS
    );

    impl_uint_config!(
        get_bitrate,
        set_bitrate,
        u32,
        &["audio", "bitrate"],
        DEFAULT_BITRATE
    );

    impl_uint_config!(
        get_channel_size,
        set_channel_size,
        usize,
        &["audio", "channel_size"],
        DEFAULT_CHANNEL_SIZE
    );

    impl_uint_config!(
        get_stall_timeout_secs,
        set_stall_timeout_secs,
        u64,
        &["audio", "stall_timeout_secs"],
        DEFAULT_STALL_TIMEOUT_SECS
    );

    /// Frame duration as a [`Duration`]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.get_frame_duration_ms())
    }

    /// Stall timeout as a [`Duration`]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.get_stall_timeout_secs())
    }

    // ============ Resolver ============

    impl_uint_config!(
        get_resolve_timeout_secs,
        set_resolve_timeout_secs,
        u64,
        &["resolver", "timeout_secs"],
        DEFAULT_RESOLVE_TIMEOUT_SECS
    );

    impl_uint_config!(
        get_search_limit,
        set_search_limit,
        usize,
        &["resolver", "search_limit"],
        DEFAULT_SEARCH_LIMIT
    );

    /// Base URL of the external catalog daemon
    pub fn get_catalog_url(&self) -> String {
        match self.get_value(&["resolver", "catalog_url"]) {
            Ok(Value::String(s)) if !s.is_empty() => s,
            _ => DEFAULT_CATALOG_URL.to_string(),
        }
    }

    pub fn set_catalog_url(&self, url: impl Into<String>) -> Result<()> {
        self.set_value(&["resolver", "catalog_url"], Value::String(url.into()))
    }

    /// Resolution timeout as a [`Duration`]
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.get_resolve_timeout_secs())
    }

    // ============ Session ============

    impl_f64_config!(
        get_default_volume,
        set_default_volume,
        &["session", "default_volume"],
        DEFAULT_VOLUME
    );

    impl_uint_config!(
        get_idle_eviction_secs,
        set_idle_eviction_secs,
        u64,
        &["session", "idle_eviction_secs"],
        DEFAULT_IDLE_EVICTION_SECS
    );

    impl_uint_config!(
        get_cancel_grace_ms,
        set_cancel_grace_ms,
        u64,
        &["session", "cancel_grace_ms"],
        DEFAULT_CANCEL_GRACE_MS
    );

    /// Idle eviction timeout as a [`Duration`]
    pub fn idle_eviction_timeout(&self) -> Duration {
        Duration::from_secs(self.get_idle_eviction_secs())
    }

    /// Cancellation grace period as a [`Duration`]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.get_cancel_grace_ms())
    }
}

/// Merges an external YAML tree over the default one
///
/// Mappings are merged recursively; any other value type is replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (default, external) => {
            *default = external.clone();
        }
    }
}

/// Returns the global configuration singleton
///
/// The configuration is loaded on first access using the default search
/// order (see [`Config::config_dir`]).
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}
