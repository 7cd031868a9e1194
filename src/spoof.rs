use crate::api::ApiClient;
use crate::error::ApiError;
use crate::models::{Device, SpoofedDevice};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// The two spoof modes offered on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoofAction {
    /// Cut the device off the network.
    Block,
    /// Route the device's traffic through the scanner host.
    Redirect,
}

impl SpoofAction {
    pub fn forward(self) -> bool {
        matches!(self, SpoofAction::Redirect)
    }

    pub fn label(self) -> &'static str {
        match self {
            SpoofAction::Block => "✖ Block",
            SpoofAction::Redirect => "🔍 Redirect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionState {
    pub active: bool,
    pub disabled: bool,
}

/// Button state for `action` on `device`. Only one device can be spoofed at
/// a time, so actions on every other device are disabled while one is.
pub fn action_state(device: &Device, current: &SpoofedDevice, action: SpoofAction) -> ActionState {
    let is_target = current.targets(&device.mac);
    ActionState {
        active: is_target && current.forward == action.forward(),
        disabled: !is_target && current.is_active(),
    }
}

/// The spoof state to request when `action` is toggled on `device`: pressing
/// either action on the current target stops spoofing.
pub fn toggled(device: &Device, current: &SpoofedDevice, action: SpoofAction) -> SpoofedDevice {
    if current.targets(&device.mac) {
        SpoofedDevice::default()
    } else {
        SpoofedDevice::target(device, action.forward())
    }
}

/// Sends `next` to the backend and mirrors it locally once accepted.
pub async fn apply(
    api: &ApiClient,
    current: &Arc<Mutex<SpoofedDevice>>,
    next: SpoofedDevice,
) -> Result<(), ApiError> {
    match api.spoof(&next).await {
        Ok(()) => {
            if next.is_active() {
                info!(mac = %next.mac, ip = %next.ip, forward = next.forward, "Spoofing started");
            } else {
                info!("Spoofing stopped");
            }
            match current.lock() {
                Ok(mut guard) => *guard = next,
                Err(poisoned) => *poisoned.into_inner() = next,
            }
            Ok(())
        }
        Err(e) => {
            error!(mac = %next.mac, "Spoofing has failed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn device(mac: &str) -> Device {
        Device {
            last_online: Utc::now(),
            name: "TV".into(),
            kind: "TV".into(),
            ip: "192.168.1.30".into(),
            hostname: String::new(),
            mac: mac.into(),
            vendor: String::new(),
            open_ports: Vec::new(),
        }
    }

    #[test]
    fn idle_state_allows_both_actions() {
        let tv = device("aa");
        let idle = SpoofedDevice::default();
        for action in [SpoofAction::Block, SpoofAction::Redirect] {
            assert_eq!(
                action_state(&tv, &idle, action),
                ActionState { active: false, disabled: false }
            );
        }
        assert_eq!(toggled(&tv, &idle, SpoofAction::Redirect), SpoofedDevice::target(&tv, true));
    }

    #[test]
    fn other_devices_are_locked_while_one_is_spoofed() {
        let tv = device("aa");
        let phone = device("bb");
        let current = SpoofedDevice::target(&tv, false);

        assert!(action_state(&tv, &current, SpoofAction::Block).active);
        assert!(!action_state(&tv, &current, SpoofAction::Redirect).active);
        assert!(action_state(&phone, &current, SpoofAction::Block).disabled);
    }

    #[test]
    fn toggling_the_target_stops_spoofing() {
        let tv = device("aa");
        let current = SpoofedDevice::target(&tv, true);
        assert_eq!(toggled(&tv, &current, SpoofAction::Block), SpoofedDevice::default());
    }

    #[tokio::test]
    async fn local_state_only_changes_after_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/spoof/start");
                then.status(500).json_body(serde_json::json!({"detail": "arp failed"}));
            })
            .await;
        let api = ApiClient::new(&server.base_url(), Duration::from_secs(5), None).unwrap();
        let current = Arc::new(Mutex::new(SpoofedDevice::default()));

        let next = SpoofedDevice::target(&device("aa"), false);
        let err = apply(&api, &current, next).await.unwrap_err();
        assert_eq!(err.user_message(), "arp failed");
        assert!(!current.lock().unwrap().is_active());
    }
}
