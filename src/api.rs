use crate::error::ApiError;
use crate::models::{
    sort_devices, timestamp, AuthToken, Device, HistoryPoint, Settings, SpoofedDevice, UptimePoint,
};
use crate::period::TimePeriod;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Typed client for the monitoring backend.
///
/// Cloning is cheap and clones share the bearer token, so a login performed
/// through one clone is seen by every poller.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    origin: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(origin: &str, timeout: Duration, token: Option<String>) -> Result<Self, ApiError> {
        let mut origin = Url::parse(origin).map_err(|e| ApiError::Url(format!("{origin}: {e}")))?;
        if !origin.path().ends_with('/') {
            let path = format!("{}/", origin.path());
            origin.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            origin,
            token: Arc::new(RwLock::new(token)),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.origin
            .join(path)
            .map_err(|e| ApiError::Url(format!("{path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.authorize(self.http.get(self.url(path)?)))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.authorize(self.http.post(self.url(path)?)))
    }

    fn put(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.authorize(self.http.put(self.url(path)?)))
    }

    /// Sends the request; anything but 200 becomes [`ApiError::Status`].
    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let err = ApiError::from_response_body(status, &body);
            warn!(%status, "API request rejected: {}", err);
            return Err(err);
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthToken, ApiError> {
        let request = self
            .http
            .post(self.url("api/auth/login")?)
            .form(&[("username", email), ("password", password)]);
        let token: AuthToken = self.json(request).await?;
        accept_token(token)
    }

    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthToken, ApiError> {
        let request = self.http.post(self.url("api/auth/register")?).form(&[
            ("full_name", full_name),
            ("email", email),
            ("password", password),
        ]);
        let token: AuthToken = self.json(request).await?;
        accept_token(token)
    }

    /// Whether the backend still accepts the current token.
    pub async fn check_token(&self) -> Result<bool, ApiError> {
        if self.token().is_none() {
            return Ok(false);
        }
        let response = self.get("api/auth/check_token")?.send().await?;
        Ok(response.status() == StatusCode::OK)
    }

    /// All devices ever seen, newest first.
    pub async fn devices(&self) -> Result<Vec<Device>, ApiError> {
        let mut devices: Vec<Device> = self.json(self.get("api/device/all")?).await?;
        sort_devices(&mut devices);
        debug!(count = devices.len(), "Fetched devices");
        Ok(devices)
    }

    pub async fn known_devices_count(&self) -> Result<u64, ApiError> {
        self.json(self.get("api/device/known/count")?).await
    }

    /// The known-devices document as editable JSON text.
    pub async fn known_devices_config(&self) -> Result<String, ApiError> {
        let value: serde_json::Value = self.json(self.get("api/device/known/config")?).await?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    pub async fn update_known_devices_config(&self, document: &str) -> Result<(), ApiError> {
        let request = self
            .put("api/device/known/config")?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(document.to_string());
        self.send(request).await?;
        info!("Uploaded known devices");
        Ok(())
    }

    pub async fn history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimePeriod,
    ) -> Result<Vec<HistoryPoint>, ApiError> {
        let request = self
            .get("api/device/history")?
            .query(&window_query(start, end, interval));
        self.json(request).await
    }

    pub async fn uptime_history(
        &self,
        mac: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimePeriod,
    ) -> Result<Vec<UptimePoint>, ApiError> {
        let request = self
            .get("api/device/uptime")?
            .query(&[("mac", mac)])
            .query(&window_query(start, end, interval));
        self.json(request).await
    }

    pub async fn spoofed_device(&self) -> Result<SpoofedDevice, ApiError> {
        self.json(self.get("api/spoof/device")?).await
    }

    /// Starts spoofing `target`, or stops spoofing when its MAC is empty.
    pub async fn spoof(&self, target: &SpoofedDevice) -> Result<(), ApiError> {
        let request = if target.is_active() {
            self.post("api/spoof/start")?.query(&[
                ("ip", target.ip.as_str()),
                ("mac", target.mac.as_str()),
                ("forward", if target.forward { "true" } else { "false" }),
            ])
        } else {
            self.post("api/spoof/stop")?
        };
        self.send(request).await?;
        Ok(())
    }

    pub async fn settings(&self) -> Result<Settings, ApiError> {
        self.json(self.get("api/settings")?).await
    }

    pub async fn update_settings(&self, settings: &Settings) -> Result<(), ApiError> {
        self.send(self.put("api/settings")?.json(settings)).await?;
        info!("Saved server settings");
        Ok(())
    }

    pub async fn last_scan(&self) -> Result<DateTime<Utc>, ApiError> {
        let raw: String = self.json(self.get("api/scan/last")?).await?;
        timestamp::parse(&raw).ok_or_else(|| {
            ApiError::Decode(serde::de::Error::custom(format!("invalid scan time: {raw}")))
        })
    }

    pub async fn scan_interval(&self) -> Result<Duration, ApiError> {
        let seconds: u64 = self.json(self.get("api/scan/interval")?).await?;
        Ok(Duration::from_secs(seconds))
    }

    pub async fn restart_scan_service(&self) -> Result<(), ApiError> {
        self.send(self.post("api/scan/restart")?).await?;
        Ok(())
    }

    pub async fn restart_server_service(&self) -> Result<(), ApiError> {
        self.send(self.post("api/server/restart")?).await?;
        Ok(())
    }
}

fn accept_token(token: AuthToken) -> Result<AuthToken, ApiError> {
    if token.is_bearer() {
        Ok(token)
    } else {
        Err(ApiError::InvalidToken(format!(
            "unexpected token type '{}'",
            token.token_type
        )))
    }
}

fn window_query(start: DateTime<Utc>, end: DateTime<Utc>, interval: TimePeriod) -> [(&'static str, String); 3] {
    [
        ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("interval", interval.seconds().to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, token: Option<&str>) -> ApiClient {
        ApiClient::new(&server.base_url(), Duration::from_secs(5), token.map(str::to_string)).unwrap()
    }

    #[tokio::test]
    async fn devices_carry_bearer_token_and_come_back_sorted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/device/all")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!([
                    {"last_online": "2024-03-10T10:00:00Z", "name": "Old", "type": "PC", "mac": "aa"},
                    {"last_online": "2024-03-10T12:00:00Z", "name": "New", "type": "Phone", "mac": "bb",
                     "open_ports": [{"port": 80, "service": "http"}]}
                ]));
            })
            .await;

        let devices = client(&server, Some("secret")).devices().await.unwrap();
        mock.assert_async().await;
        assert_eq!(devices[0].name, "New");
        assert_eq!(devices[0].open_ports[0].port, 80);
        assert_eq!(devices[1].name, "Old");
    }

    #[tokio::test]
    async fn no_token_means_no_authorization_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/spoof/device").header_missing("authorization");
                then.status(200).json_body(json!({"mac": "", "ip": "", "forward": false}));
            })
            .await;

        let spoofed = client(&server, None).spoofed_device().await.unwrap();
        mock.assert_async().await;
        assert!(!spoofed.is_active());
    }

    #[tokio::test]
    async fn spoof_routes_to_start_or_stop() {
        let server = MockServer::start_async().await;
        let start = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/spoof/start")
                    .query_param("ip", "192.168.1.20")
                    .query_param("mac", "aa:bb:cc:dd:ee:ff")
                    .query_param("forward", "true");
                then.status(200);
            })
            .await;
        let stop = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/spoof/stop");
                then.status(200);
            })
            .await;

        let api = client(&server, Some("t"));
        let target = SpoofedDevice {
            mac: "aa:bb:cc:dd:ee:ff".into(),
            ip: "192.168.1.20".into(),
            forward: true,
        };
        api.spoof(&target).await.unwrap();
        api.spoof(&SpoofedDevice::default()).await.unwrap();
        start.assert_async().await;
        stop.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_login_surfaces_detail() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/login");
                then.status(400)
                    .json_body(json!({"detail": "Incorrect username or password"}));
            })
            .await;

        let err = client(&server, None).login("a@b.c", "nope").await.unwrap_err();
        assert_eq!(err.user_message(), "Incorrect username or password");
    }

    #[tokio::test]
    async fn login_requires_bearer_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/login");
                then.status(200)
                    .json_body(json!({"access_token": "abc", "token_type": "mac"}));
            })
            .await;

        let err = client(&server, None).login("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn history_sends_window_and_bucket() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/device/history")
                    .query_param("start", "2024-03-10T00:00:00Z")
                    .query_param("end", "2024-03-11T00:00:00Z")
                    .query_param("interval", "3600");
                then.status(200).json_body(json!([
                    {"time": "2024-03-10T00:00:00", "average": 4.5},
                    {"time": "2024-03-10T01:00:00", "average": null}
                ]));
            })
            .await;

        let start = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        let points = client(&server, Some("t"))
            .history(start, end, TimePeriod::Hour)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].average, Some(4.5));
        assert_eq!(points[1].average, None);
    }

    #[tokio::test]
    async fn check_token_maps_status_to_bool() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/auth/check_token");
                then.status(401).json_body(json!({"detail": "Could not validate credentials"}));
            })
            .await;

        assert!(!client(&server, Some("expired")).check_token().await.unwrap());
        assert!(!client(&server, None).check_token().await.unwrap());
    }

    #[tokio::test]
    async fn origin_with_path_prefix_is_kept() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/monitor/api/scan/interval");
                then.status(200).json_body(json!(300));
            })
            .await;

        let api = ApiClient::new(&server.url("/monitor"), Duration::from_secs(5), None).unwrap();
        assert_eq!(api.scan_interval().await.unwrap(), Duration::from_secs(300));
        mock.assert_async().await;
    }

    #[test]
    fn bad_origin_is_rejected() {
        assert!(matches!(
            ApiClient::new("not a url", Duration::from_secs(1), None),
            Err(ApiError::Url(_))
        ));
    }
}
