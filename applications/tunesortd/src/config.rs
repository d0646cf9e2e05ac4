/// Daemon configuration
use crate::error::{DaemonError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tunesort_router::{watcher::WatcherConfig, Destinations, ExtensionRules};

/// Config file read from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "tunesort.toml";

/// Prefix of environment overrides, e.g. `TUNESORT_PATHS__LIBRARY`
pub const ENV_PREFIX: &str = "TUNESORT";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub reaper: ReaperSettings,

    #[serde(default)]
    pub transcode: TranscodeSettings,

    #[serde(default)]
    pub routing: RoutingSettings,

    #[serde(default)]
    pub watcher: WatcherSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathSettings {
    #[serde(default)]
    pub watch_root: PathBuf,

    #[serde(default)]
    pub library: PathBuf,

    #[serde(default)]
    pub no_artist: PathBuf,

    #[serde(default)]
    pub transcoded: PathBuf,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaperSettings {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeSettings {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    #[serde(default = "default_target_extension")]
    pub target_extension: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingSettings {
    #[serde(default = "default_delete_extensions")]
    pub delete_extensions: Vec<String>,

    #[serde(default = "default_lossless_extensions")]
    pub lossless_extensions: Vec<String>,

    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherSettings {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl DaemonConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    /// Load with a caller-supplied environment source
    pub fn load_with(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(DaemonError::Config(format!(
                        "Config file not found: {:?}",
                        path
                    )));
                }
                settings = settings.add_source(config::File::from(path));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        // Override with environment variables (prefixed with TUNESORT_)
        settings = settings.add_source(env);

        let config = settings.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("paths.watch_root", &self.paths.watch_root),
            ("paths.library", &self.paths.library),
            ("paths.no_artist", &self.paths.no_artist),
            ("paths.transcoded", &self.paths.transcoded),
            ("paths.log_file", &self.paths.log_file),
        ];
        for (key, path) in required {
            if path.as_os_str().is_empty() {
                return Err(DaemonError::Config(format!(
                    "{} is required (set {}_{})",
                    key,
                    ENV_PREFIX,
                    key.replace('.', "__").to_uppercase()
                )));
            }
        }

        if self.reaper.idle_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "reaper.idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.reaper.sweep_interval_secs == 0 {
            return Err(DaemonError::Config(
                "reaper.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.watcher.channel_capacity == 0 {
            return Err(DaemonError::Config(
                "watcher.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.transcode.bitrate.trim().is_empty() {
            return Err(DaemonError::Config("transcode.bitrate is empty".to_string()));
        }
        if self.transcode.target_extension.trim_start_matches('.').is_empty() {
            return Err(DaemonError::Config(
                "transcode.target_extension is empty".to_string(),
            ));
        }

        let watch_root = &self.paths.watch_root;
        for (key, destination) in self.destination_paths() {
            if watch_root.starts_with(destination) {
                return Err(DaemonError::Config(format!(
                    "paths.watch_root {:?} must not be {} or lie inside it",
                    watch_root, key
                )));
            }
        }

        Ok(())
    }

    /// Non-fatal oddities worth logging at startup
    pub fn warnings(&self) -> Vec<String> {
        self.destination_paths()
            .iter()
            .filter(|(_, destination)| destination.starts_with(&self.paths.watch_root))
            .map(|(key, destination)| {
                format!(
                    "{} {:?} lies inside the watch root; events there are ignored",
                    key, destination
                )
            })
            .collect()
    }

    fn destination_paths(&self) -> [(&'static str, &PathBuf); 3] {
        [
            ("paths.library", &self.paths.library),
            ("paths.no_artist", &self.paths.no_artist),
            ("paths.transcoded", &self.paths.transcoded),
        ]
    }

    pub fn destinations(&self) -> Destinations {
        Destinations {
            watch_root: self.paths.watch_root.clone(),
            library: self.paths.library.clone(),
            no_artist: self.paths.no_artist.clone(),
            transcoded: self.paths.transcoded.clone(),
        }
    }

    pub fn extension_rules(&self) -> ExtensionRules {
        ExtensionRules {
            delete_extensions: self.routing.delete_extensions.clone(),
            lossless_extensions: self.routing.lossless_extensions.clone(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.reaper.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.reaper.sweep_interval_secs)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce_duration: Duration::from_millis(self.watcher.debounce_ms),
            channel_capacity: self.watcher.channel_capacity,
        }
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DaemonError::Config(e.to_string()))
    }
}

/// Environment source: `TUNESORT_<SECTION>__<KEY>`, extension lists comma separated
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("routing.delete_extensions")
        .with_list_parse_key("routing.lossless_extensions")
}

// Default values
fn default_log_file() -> PathBuf {
    PathBuf::from("tunesort.log")
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    10
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_bitrate() -> String {
    "320k".to_string()
}

fn default_target_extension() -> String {
    "mp3".to_string()
}

fn default_delete_extensions() -> Vec<String> {
    ExtensionRules::default().delete_extensions
}

fn default_lossless_extensions() -> Vec<String> {
    ExtensionRules::default().lossless_extensions
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            watch_root: PathBuf::new(),
            library: PathBuf::new(),
            no_artist: PathBuf::new(),
            transcoded: PathBuf::new(),
            log_file: default_log_file(),
        }
    }
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            bitrate: default_bitrate(),
            target_extension: default_target_extension(),
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            delete_extensions: default_delete_extensions(),
            lossless_extensions: default_lossless_extensions(),
            dry_run: false,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            paths: PathSettings::default(),
            reaper: ReaperSettings::default(),
            transcode: TranscodeSettings::default(),
            routing: RoutingSettings::default(),
            watcher: WatcherSettings::default(),
        }
    }
}
