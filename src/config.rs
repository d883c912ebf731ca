//! Bridge configuration.
//!
//! Defaults match the phone emulator app. Every field can be overridden
//! through a `DAYBRIDGE_*` environment variable.

use std::str::FromStr;
use std::time::Duration;

use crate::protocol::{MAX_FRAME_LEN, PHONE_EVENT_PORT};

pub const ENV_EMULATOR_MODE: &str = "DAYBRIDGE_EMULATOR_MODE";
pub const ENV_USB_ADDR: &str = "DAYBRIDGE_USB_ADDR";
pub const ENV_WIFI_ADDR: &str = "DAYBRIDGE_WIFI_ADDR";
pub const ENV_EMULATOR_PORT: &str = "DAYBRIDGE_EMULATOR_PORT";
pub const ENV_RECONNECT_INTERVAL_MS: &str = "DAYBRIDGE_RECONNECT_INTERVAL_MS";
pub const ENV_READ_TIMEOUT_MS: &str = "DAYBRIDGE_READ_TIMEOUT_MS";
pub const ENV_ADB_FORWARD: &str = "DAYBRIDGE_ADB_FORWARD";
pub const ENV_ADB_PATH: &str = "DAYBRIDGE_ADB_PATH";

/// How the emulator reaches the phone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmulatorMode {
    Off,
    /// Phone tethered over USB, reached through an `adb forward` tunnel.
    #[default]
    Usb,
    /// Phone acting as a WiFi hotspot.
    Wifi,
}

impl FromStr for EmulatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => Ok(EmulatorMode::Off),
            "usb" => Ok(EmulatorMode::Usb),
            "wifi" => Ok(EmulatorMode::Wifi),
            other => Err(format!("unknown emulator mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    pub mode: EmulatorMode,
    pub usb_addr: String,
    pub wifi_addr: String,
    pub port: u16,
    /// Minimum time between connection attempts.
    pub reconnect_interval: Duration,
    /// A connected socket with no data for this long is considered dead.
    pub read_timeout: Duration,
    /// Run `adb forward tcp:P tcp:P` before each USB connection attempt.
    pub adb_forward: bool,
    pub adb_path: String,
    pub max_frame_len: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            mode: EmulatorMode::Usb,
            usb_addr: "127.0.0.1".into(),
            wifi_addr: "192.168.43.1".into(),
            port: PHONE_EVENT_PORT,
            reconnect_interval: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(5000),
            adb_forward: true,
            adb_path: "adb".into(),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl EmulatorConfig {
    /// `host:port` for the configured mode, or `None` when the emulator is off.
    pub fn address(&self) -> Option<String> {
        match self.mode {
            EmulatorMode::Off => None,
            EmulatorMode::Usb => Some(format!("{}:{}", self.usb_addr, self.port)),
            EmulatorMode::Wifi => Some(format!("{}:{}", self.wifi_addr, self.port)),
        }
    }

    pub fn uses_adb_forward(&self) -> bool {
        self.mode == EmulatorMode::Usb && self.adb_forward
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    pub emulator: EmulatorConfig,
}

impl BridgeConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(lookup);
        let defaults = EmulatorConfig::default();

        let mode = match env.string(ENV_EMULATOR_MODE) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                log::warn!("{}; using usb (supported: off|usb|wifi)", e);
                EmulatorMode::Usb
            }),
            None => defaults.mode,
        };

        let emulator = EmulatorConfig {
            mode,
            usb_addr: env.string(ENV_USB_ADDR).unwrap_or(defaults.usb_addr),
            wifi_addr: env.string(ENV_WIFI_ADDR).unwrap_or(defaults.wifi_addr),
            port: env.parse(ENV_EMULATOR_PORT, defaults.port),
            reconnect_interval: Duration::from_millis(env.parse(
                ENV_RECONNECT_INTERVAL_MS,
                defaults.reconnect_interval.as_millis() as u64,
            )),
            read_timeout: Duration::from_millis(
                env.parse(ENV_READ_TIMEOUT_MS, defaults.read_timeout.as_millis() as u64),
            ),
            adb_forward: env.bool(ENV_ADB_FORWARD, defaults.adb_forward),
            adb_path: env.string(ENV_ADB_PATH).unwrap_or(defaults.adb_path),
            max_frame_len: defaults.max_frame_len,
        };

        log::debug!(
            "Emulator config: mode={:?} addr={:?} reconnect={:?} readTimeout={:?} adbForward={}",
            emulator.mode,
            emulator.address(),
            emulator.reconnect_interval,
            emulator.read_timeout,
            emulator.uses_adb_forward()
        );
        BridgeConfig { emulator }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str, default: bool) -> bool {
        self.string(name)
            .and_then(|v| match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    fn parse<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.string(name) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                log::warn!("Ignoring {}='{}': not a valid value", name, v);
                default
            }),
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> BridgeConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BridgeConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_target_usb_forward() {
        let cfg = config(&[]);
        assert_eq!(cfg.emulator.mode, EmulatorMode::Usb);
        assert_eq!(cfg.emulator.address().as_deref(), Some("127.0.0.1:7003"));
        assert!(cfg.emulator.uses_adb_forward());
        assert_eq!(cfg.emulator.reconnect_interval, Duration::from_secs(5));
    }

    #[test]
    fn wifi_mode_never_forwards() {
        let cfg = config(&[(ENV_EMULATOR_MODE, "WiFi"), (ENV_EMULATOR_PORT, "7100")]);
        assert_eq!(cfg.emulator.address().as_deref(), Some("192.168.43.1:7100"));
        assert!(!cfg.emulator.uses_adb_forward());
    }

    #[test]
    fn off_mode_has_no_address() {
        let cfg = config(&[(ENV_EMULATOR_MODE, "off")]);
        assert_eq!(cfg.emulator.address(), None);
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = config(&[
            (ENV_EMULATOR_MODE, "bluetooth"),
            (ENV_EMULATOR_PORT, "seventy"),
            (ENV_ADB_FORWARD, "maybe"),
            (ENV_READ_TIMEOUT_MS, " 250 "),
        ]);
        assert_eq!(cfg.emulator.mode, EmulatorMode::Usb);
        assert_eq!(cfg.emulator.port, 7003);
        assert!(cfg.emulator.adb_forward);
        assert_eq!(cfg.emulator.read_timeout, Duration::from_millis(250));
    }
}
