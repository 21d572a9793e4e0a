use crate::infrastructure::bluetooth::protocol::HEARTBEAT_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How often the log file rolls over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Diagnostics output. Status lines for the user go to stdout regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, used when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub console: bool,
    /// Rolling log files are written here when set
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
    #[serde(default = "default_prefix")]
    pub file_prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
    /// Include source locations and thread ids
    #[serde(default)]
    pub verbose: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console: true,
            file_dir: None,
            file_prefix: default_prefix(),
            rotation: LogRotation::default(),
            verbose: false,
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_prefix() -> String {
    "bluetooth_remote".to_string()
}

const APP_DIR_NAME: &str = "BluetoothRemote";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Link Timing
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_cancel_join_timeout_ms")]
    pub cancel_join_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    // Peers
    #[serde(default)]
    pub known_peers: Vec<String>,
    #[serde(default)]
    pub last_peer: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            cancel_join_timeout_ms: default_cancel_join_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            known_peers: Vec::new(),
            last_peer: None,
        }
    }
}

/// Floors applied to configured link timings
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 100;
pub const MIN_CANCEL_JOIN_TIMEOUT_MS: u64 = 50;

impl Settings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(MIN_HEARTBEAT_INTERVAL_MS))
    }

    pub fn cancel_join_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_join_timeout_ms.max(MIN_CANCEL_JOIN_TIMEOUT_MS))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    HEARTBEAT_INTERVAL_MS
}
fn default_cancel_join_timeout_ms() -> u64 {
    2000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => {
                Self::warn_on_clamped(&settings);
                settings
            }
            Err(e) => {
                if settings_path.exists() {
                    eprintln!(
                        "Ignoring unreadable settings at {}: {}",
                        settings_path.display(),
                        e
                    );
                }
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push(APP_DIR_NAME);
        path.push("settings.json");
        Ok(path)
    }

    // Runs before logging is up, hence stderr
    fn warn_on_clamped(settings: &Settings) {
        if settings.heartbeat_interval_ms < MIN_HEARTBEAT_INTERVAL_MS {
            eprintln!(
                "heartbeat_interval_ms {} is too small, using {}",
                settings.heartbeat_interval_ms, MIN_HEARTBEAT_INTERVAL_MS
            );
        }
        if settings.cancel_join_timeout_ms < MIN_CANCEL_JOIN_TIMEOUT_MS {
            eprintln!(
                "cancel_join_timeout_ms {} is too small, using {}",
                settings.cancel_join_timeout_ms, MIN_CANCEL_JOIN_TIMEOUT_MS
            );
        }
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Remember a peer after a successful connect
    pub fn record_peer(&mut self, peer: &str) -> anyhow::Result<()> {
        if !self.settings.known_peers.iter().any(|p| p == peer) {
            self.settings.known_peers.push(peer.to_string());
        }
        self.settings.last_peer = Some(peer.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let service = SettingsService::with_path(dir.path().join("settings.json"));
        assert_eq!(service.get().heartbeat_interval_ms, 1000);
        assert!(service.get().last_peer.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "heartbeat_interval_ms": 250 }"#).unwrap();

        let service = SettingsService::with_path(path);
        assert_eq!(service.get().heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(service.get().cancel_join_timeout_ms, 2000);
        assert_eq!(service.get().log_settings.level, "warn");
    }

    #[test]
    fn test_zero_timings_are_clamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "heartbeat_interval_ms": 0, "cancel_join_timeout_ms": 0 }"#,
        )
        .unwrap();

        let settings = SettingsService::with_path(path).get().clone();
        assert_eq!(
            settings.heartbeat_interval(),
            Duration::from_millis(MIN_HEARTBEAT_INTERVAL_MS)
        );
        assert_eq!(
            settings.cancel_join_timeout(),
            Duration::from_millis(MIN_CANCEL_JOIN_TIMEOUT_MS)
        );
        // Raw values are kept so a save does not rewrite the user's file
        assert_eq!(settings.heartbeat_interval_ms, 0);
    }

    #[test]
    fn test_log_settings_from_json() {
        let log: LogSettings =
            serde_json::from_str(r#"{ "rotation": "hourly", "file_dir": "/var/log/remote" }"#)
                .unwrap();
        assert_eq!(log.rotation, LogRotation::Hourly);
        assert_eq!(log.file_dir, Some(PathBuf::from("/var/log/remote")));
        assert!(log.console);
        assert_eq!(log.level, "warn");

        assert!(serde_json::from_str::<LogSettings>(r#"{ "rotation": "weekly" }"#).is_err());
    }

    #[test]
    fn test_record_peer_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut service = SettingsService::with_path(path.clone());
        service.record_peer("/dev/rfcomm0").unwrap();
        service.record_peer("tcp://127.0.0.1:9000").unwrap();
        service.record_peer("/dev/rfcomm0").unwrap();

        let reloaded = SettingsService::with_path(path);
        assert_eq!(
            reloaded.get().known_peers,
            vec!["/dev/rfcomm0".to_string(), "tcp://127.0.0.1:9000".to_string()]
        );
        assert_eq!(reloaded.get().last_peer.as_deref(), Some("/dev/rfcomm0"));
    }
}
