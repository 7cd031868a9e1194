use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A device counts as online when it was seen within this window.
pub const ONLINE_THRESHOLD: Duration = Duration::minutes(10);

// Enum to represent whether a device is currently reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: u16,
    #[serde(default)]
    pub service: String,
}

// A device discovered by the scan service. Identity is the MAC address.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Device {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub last_online: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
    pub mac: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub open_ports: Vec<PortInfo>,
}

impl Device {
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        now - self.last_online < ONLINE_THRESHOLD
    }

    pub fn status(&self, now: DateTime<Utc>) -> DeviceStatus {
        if self.is_online(now) {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        }
    }

    /// Name to show, falling back to the address when the device is unnamed.
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.hostname.is_empty() {
            &self.hostname
        } else if !self.ip.is_empty() {
            &self.ip
        } else {
            &self.mac
        }
    }

    pub fn glyph(&self) -> &'static str {
        device_glyph(&self.kind)
    }
}

static TYPE_GLYPHS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Unknown", "❓"),
        ("PC", "🖥"),
        ("Phone", "📱"),
        ("TV Adapter", "📺"),
        ("TV", "📺"),
        ("Music", "🔊"),
        ("Game console", "🎮"),
        ("Router", "🖧"),
        ("Tablet", "📱"),
        ("Printer", "🖶"),
        ("Security", "🔒"),
    ])
});

pub fn device_glyph(kind: &str) -> &'static str {
    TYPE_GLYPHS.get(kind).copied().unwrap_or("❓")
}

/// Newest first.
pub fn sort_devices(devices: &mut [Device]) {
    devices.sort_by(|a, b| b.last_online.cmp(&a.last_online));
}

/// Human label for when a device was last seen, relative to `now`.
pub fn last_seen_label<Tz>(last_online: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let seen = last_online.with_timezone(&now.timezone());
    let days_ago = (now.date_naive() - seen.date_naive()).num_days();
    match days_ago {
        0 => format!("today at {}", seen.format("%H:%M")),
        1 => format!("yesterday at {}", seen.format("%H:%M")),
        2..=6 => seen.format("%a %H:%M").to_string(),
        _ => seen.format("%d/%m/%Y").to_string(),
    }
}

/// The single device the backend is currently spoofing. An empty `mac`
/// means nothing is being spoofed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoofedDevice {
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub forward: bool,
}

impl SpoofedDevice {
    pub fn target(device: &Device, forward: bool) -> Self {
        Self {
            mac: device.mac.clone(),
            ip: device.ip.clone(),
            forward,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.mac.is_empty()
    }

    pub fn targets(&self, mac: &str) -> bool {
        self.is_active() && self.mac == mac
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPoint {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub time: DateTime<Utc>,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UptimePoint {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub time: DateTime<Utc>,
    pub uptime: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    pub network_subnet: String,
    /// Seconds between scans.
    pub scan_interval: u64,
    pub ports_to_scan: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Minutes.
    pub token_expiry_time: u64,
    pub gateway_ip: String,
    pub gateway_mac: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub scan_settings: ScanSettings,
    pub server_settings: ServerSettings,
}

/// One entry of the known-devices document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KnownDevice {
    pub name: String,
    pub mac: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
}

impl AuthToken {
    pub fn is_bearer(&self) -> bool {
        self.token_type.eq_ignore_ascii_case("bearer") && !self.access_token.is_empty()
    }
}

pub(crate) mod timestamp {
    use super::*;

    /// Accepts RFC 3339 or a bare ISO datetime, which is taken as UTC.
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid datetime: {raw}")))
    }
}
