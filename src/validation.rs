use crate::models::{KnownDevice, Settings};
use ipnetwork::IpNetwork;
use pnet_base::MacAddr;
use std::net::IpAddr;

/// Scan interval choices offered by the settings editor, in seconds.
pub const SCAN_INTERVAL_OPTIONS: [(&str, u64); 6] = [
    ("Minute", 60),
    ("2 Minutes", 120),
    ("5 Minutes", 300),
    ("10 Minutes", 600),
    ("30 Minutes", 1800),
    ("Hour", 3600),
];

pub const PORTS_TO_SCAN_OPTIONS: [u32; 4] = [50, 100, 200, 500];

/// Token lifetime choices, in minutes.
pub const TOKEN_EXPIRY_TIME_OPTIONS: [(&str, u64); 5] = [
    ("10 Minutes", 10),
    ("30 Minutes", 30),
    ("Hour", 60),
    ("Day", 1440),
    ("30 Days", 43200),
];

pub fn parse_subnet(raw: &str) -> Result<IpNetwork, String> {
    raw.trim()
        .parse::<IpNetwork>()
        .map_err(|e| format!("Network subnet '{raw}' is invalid: {e}"))
}

pub fn parse_mac(raw: &str) -> Result<MacAddr, String> {
    raw.trim()
        .parse::<MacAddr>()
        .map_err(|_| format!("MAC address '{raw}' is invalid"))
}

pub fn parse_ip(raw: &str) -> Result<IpAddr, String> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|_| format!("IP address '{raw}' is invalid"))
}

/// Problems that would make the backend reject `settings`.
pub fn settings_errors(settings: &Settings) -> Vec<String> {
    let mut errors = Vec::new();
    if let Err(e) = parse_subnet(&settings.scan_settings.network_subnet) {
        errors.push(e);
    }
    if let Err(e) = parse_ip(&settings.server_settings.gateway_ip) {
        errors.push(e);
    }
    if let Err(e) = parse_mac(&settings.server_settings.gateway_mac) {
        errors.push(e);
    }
    if settings.scan_settings.scan_interval == 0 {
        errors.push("Scan interval must be positive".to_string());
    }
    errors
}

/// Checks the known-devices document: an array of `{name, mac, type}` objects
/// with no other fields. Errors are reported as `line N: message`.
pub fn parse_known_devices(document: &str) -> Result<Vec<KnownDevice>, Vec<String>> {
    let devices: Vec<KnownDevice> = serde_json::from_str(document).map_err(|e| {
        vec![format!("line {}: {}", e.line(), strip_position(&e.to_string()))]
    })?;

    let errors: Vec<String> = devices
        .iter()
        .enumerate()
        .filter_map(|(index, device)| {
            parse_mac(&device.mac)
                .err()
                .map(|e| format!("entry {}: {}", index + 1, e))
        })
        .collect();

    if errors.is_empty() {
        Ok(devices)
    } else {
        Err(errors)
    }
}

fn strip_position(message: &str) -> &str {
    match message.rfind(" at line ") {
        Some(index) => &message[..index],
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScanSettings, ServerSettings};

    #[test]
    fn well_formed_document_is_accepted() {
        let doc = r#"[
            {"name": "Router", "mac": "aa:bb:cc:dd:ee:ff", "type": "Router"},
            {"name": "Console", "mac": "11:22:33:44:55:66", "type": "Game console"}
        ]"#;
        let devices = parse_known_devices(doc).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].kind, "Game console");
    }

    #[test]
    fn missing_and_extra_fields_are_rejected() {
        let missing = r#"[
            {"name": "Router", "mac": "aa:bb:cc:dd:ee:ff"}
        ]"#;
        let errors = parse_known_devices(missing).unwrap_err();
        assert!(errors[0].starts_with("line "), "{errors:?}");
        assert!(errors[0].contains("type"), "{errors:?}");

        let extra = r#"[{"name": "R", "mac": "aa:bb:cc:dd:ee:ff", "type": "Router", "ip": "1.2.3.4"}]"#;
        let errors = parse_known_devices(extra).unwrap_err();
        assert!(errors[0].contains("ip"), "{errors:?}");
    }

    #[test]
    fn bad_mac_is_reported_per_entry() {
        let doc = r#"[
            {"name": "A", "mac": "aa:bb:cc:dd:ee:ff", "type": "PC"},
            {"name": "B", "mac": "not-a-mac", "type": "PC"}
        ]"#;
        let errors = parse_known_devices(doc).unwrap_err();
        assert_eq!(errors, vec!["entry 2: MAC address 'not-a-mac' is invalid".to_string()]);
    }

    #[test]
    fn settings_are_checked_field_by_field() {
        let mut settings = Settings {
            scan_settings: ScanSettings {
                network_subnet: "192.168.1.0/24".into(),
                scan_interval: 300,
                ports_to_scan: 100,
            },
            server_settings: ServerSettings {
                token_expiry_time: 60,
                gateway_ip: "192.168.1.1".into(),
                gateway_mac: "aa:bb:cc:dd:ee:ff".into(),
            },
        };
        assert!(settings_errors(&settings).is_empty());

        settings.scan_settings.network_subnet = "192.168.1.0/40".into();
        settings.server_settings.gateway_mac = "zz".into();
        assert_eq!(settings_errors(&settings).len(), 2);
    }
}
