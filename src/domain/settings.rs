use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Nordic UART Service
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Host -> Scroll Wheel writes
pub const UART_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
/// Scroll Wheel -> host notifications
pub const UART_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_false")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_false(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "scroll_wheel_host".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Discovery
    #[serde(default = "default_device_name")]
    pub device_name_filter: String,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_scan_attempts")]
    pub scan_attempts: u32,
    #[serde(default = "default_scan_retry_delay_ms")]
    pub scan_retry_delay_ms: u64,

    // Connection
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub notification_queue_capacity: usize,

    // BLE UUIDs
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: Uuid,
    #[serde(default = "default_rx_uuid")]
    pub ble_rx_char_uuid: Uuid,
    #[serde(default = "default_tx_uuid")]
    pub ble_tx_char_uuid: Uuid,

    // Input
    #[serde(default = "default_false")]
    pub emit_coarse_wheel: bool,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name_filter: default_device_name(),
            scan_timeout_ms: default_scan_timeout_ms(),
            scan_attempts: default_scan_attempts(),
            scan_retry_delay_ms: default_scan_retry_delay_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            notification_queue_capacity: default_queue_capacity(),
            ble_service_uuid: default_service_uuid(),
            ble_rx_char_uuid: default_rx_uuid(),
            ble_tx_char_uuid: default_tx_uuid(),
            emit_coarse_wheel: false,
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn scan_retry_delay(&self) -> Duration {
        Duration::from_millis(self.scan_retry_delay_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_device_name() -> String {
    "Scroll Wheel".to_string()
}
fn default_scan_timeout_ms() -> u64 {
    5000
}
fn default_scan_attempts() -> u32 {
    3
}
fn default_scan_retry_delay_ms() -> u64 {
    1000
}
fn default_connection_timeout_ms() -> u64 {
    10_000
}
fn default_write_timeout_ms() -> u64 {
    5000
}
fn default_queue_capacity() -> usize {
    64
}
fn default_service_uuid() -> Uuid {
    UART_SERVICE_UUID
}
fn default_rx_uuid() -> Uuid {
    UART_RX_CHAR_UUID
}
fn default_tx_uuid() -> Uuid {
    UART_TX_CHAR_UUID
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the per-user config directory, falling back to defaults
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}: {})",
                    settings_path.display(),
                    e
                );
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
        path.push("ScrollWheelHost");
        path.push("settings.json");
        Ok(path)
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

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware() {
        let s = Settings::default();
        assert_eq!(s.device_name_filter, "Scroll Wheel");
        assert_eq!(s.scan_attempts, 3);
        assert_eq!(s.connection_timeout(), Duration::from_secs(10));
        assert_eq!(
            s.ble_service_uuid.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(
            s.ble_tx_char_uuid.to_string(),
            "6e400003-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert!(!s.emit_coarse_wheel);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "device_name_filter": "ESP32_BLEuart", "ble_service_uuid": "6E400001-B5A3-F393-E0A9-E50E24DCCA9E" }"#,
        )
        .unwrap();

        let service = SettingsService::with_path(path);
        let s = service.get();
        assert_eq!(s.device_name_filter, "ESP32_BLEuart");
        assert_eq!(s.ble_service_uuid, UART_SERVICE_UUID);
        assert_eq!(s.scan_attempts, 3);
        assert_eq!(s.log_settings.level, "info");
    }

    #[test]
    fn test_missing_or_broken_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SettingsService::with_path(dir.path().join("nope.json"));
        assert_eq!(missing.get().scan_attempts, 3);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let service = SettingsService::with_path(broken);
        assert_eq!(service.get().device_name_filter, "Scroll Wheel");
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut service = SettingsService::with_path(path.clone());
        service.get_mut().scan_attempts = 7;
        service.save().unwrap();

        let reloaded = SettingsService::with_path(path);
        assert_eq!(reloaded.get().scan_attempts, 7);
    }
}
