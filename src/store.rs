use crate::api::ApiClient;
use crate::error::ApiError;
use crate::models::{AuthToken, Device, HistoryPoint, Settings, SpoofedDevice, UptimePoint};
use crate::period::{PeriodWindow, TimePeriod};
use crate::poll::{poll_every, run_after, PollHandle, PollSlot};
use crate::session::{token_expiration_delta, Session, SessionStore};
use crate::spoof::{self, SpoofAction};
use crate::toast::Toasts;
use chrono::{DateTime, Local, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Number of requests in flight. Guards decrement on drop, so an aborted
/// fetch still clears the indicator.
#[derive(Debug, Clone, Default)]
pub struct Loading(Arc<AtomicUsize>);

pub struct LoadingGuard(Arc<AtomicUsize>);

impl Loading {
    pub fn begin(&self) -> LoadingGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        LoadingGuard(Arc::clone(&self.0))
    }

    pub fn is_loading(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The reply to a one-shot request, collected by the panel that issued it.
/// Errors are already converted to display text.
#[derive(Debug)]
pub struct Pending<T> {
    slot: Arc<Mutex<Option<Result<T, String>>>>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Pending<T> {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    fn put(&self, result: Result<T, ApiError>) {
        *lock(&self.slot) = Some(result.map_err(|e| e.user_message()));
    }

    #[cfg(test)]
    pub(crate) fn resolved(result: Result<T, String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(result))),
        }
    }

    /// The reply, once. `None` while the request is still running.
    pub fn take(&self) -> Option<Result<T, String>> {
        lock(&self.slot).take()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScanTiming {
    pub last_scan: Option<DateTime<Utc>>,
    pub interval: Option<Duration>,
}

/// Data shared between the UI thread and the fetch tasks. Last fetched
/// value wins.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub devices: Arc<Mutex<Vec<Device>>>,
    pub spoofed: Arc<Mutex<SpoofedDevice>>,
    pub known_count: Arc<Mutex<Option<u64>>>,
    pub scan: Arc<Mutex<ScanTiming>>,
    pub history: Arc<Mutex<Vec<HistoryPoint>>>,
    /// Uptime series keyed by device MAC.
    pub uptime: Arc<DashMap<String, Vec<UptimePoint>>>,
    pub loading: Loading,
    pub toasts: Toasts,
    signed_out: Arc<AtomicBool>,
}

impl DashboardState {
    fn report(&self, what: &str, err: &ApiError) {
        if err.is_unauthorized() {
            warn!("{} rejected, session is no longer valid", what);
            self.signed_out.store(true, Ordering::Release);
            return;
        }
        error!("{} failed: {}", what, err);
        self.toasts.error(format!("{what} failed: {}", err.user_message()));
    }

    fn clear(&self) {
        lock(&self.devices).clear();
        *lock(&self.spoofed) = SpoofedDevice::default();
        *lock(&self.known_count) = None;
        *lock(&self.scan) = ScanTiming::default();
        lock(&self.history).clear();
        self.uptime.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
struct WindowKey {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: TimePeriod,
    sync: u64,
}

impl WindowKey {
    fn new(window: &PeriodWindow<Local>, sync: u64) -> Self {
        Self {
            start: window.start.with_timezone(&Utc),
            end: window.end.with_timezone(&Utc),
            interval: window.interval,
            sync,
        }
    }
}

/// Runs `job` every `every`, or once right away when background refresh is
/// disabled.
fn schedule<F, Fut>(every: Option<Duration>, mut job: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    match every {
        Some(period) => poll_every(period, job),
        None => run_after(Duration::ZERO, move || job()),
    }
}

/// Owns the session and every background task of the dashboard.
pub struct DashboardStore {
    api: ApiClient,
    sessions: SessionStore,
    session: Session,
    pub state: DashboardState,
    devices_poll: PollSlot<u64>,
    scan_poll: PollSlot<u64>,
    history_poll: PollSlot<WindowKey>,
    uptime_poll: PollSlot<(String, WindowKey)>,
    expiry: PollSlot<String>,
    /// One-shot requests still in flight; aborted on sign-out.
    requests: Mutex<Vec<PollHandle>>,
}

impl DashboardStore {
    pub fn new(api: ApiClient, sessions: SessionStore, session: Session) -> Self {
        api.set_token(session.access_token().map(str::to_string));
        Self {
            api,
            sessions,
            session,
            state: DashboardState::default(),
            devices_poll: PollSlot::new(),
            scan_poll: PollSlot::new(),
            history_poll: PollSlot::new(),
            uptime_poll: PollSlot::new(),
            expiry: PollSlot::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.access_token().is_some()
    }

    /// Keeps the dashboard pollers and the sign-out timer running for the
    /// current session. Called every frame; only restarts what changed.
    pub fn sync(&mut self) {
        let Some(token) = self.session.access_token().map(str::to_string) else {
            return;
        };
        let every = self.session.sync_interval();
        let sync = self.session.sync_data_interval;

        let api = self.api.clone();
        let state = self.state.clone();
        self.devices_poll.ensure(sync, move || {
            schedule(every, move || refresh_devices(api.clone(), state.clone()))
        });

        let api = self.api.clone();
        let state = self.state.clone();
        self.scan_poll.ensure(sync, move || {
            schedule(every, move || refresh_scan(api.clone(), state.clone()))
        });

        let signed_out = Arc::clone(&self.state.signed_out);
        self.expiry.ensure(token.clone(), move || {
            let delay = token_expiration_delta(&token, Utc::now()).unwrap_or_else(|e| {
                warn!("Cannot read token expiry: {}", e);
                Duration::ZERO
            });
            debug!(seconds = delay.as_secs(), "Scheduled automatic sign-out");
            run_after(delay, move || async move {
                info!("Token expired, signing out");
                signed_out.store(true, Ordering::Release);
            })
        });
    }

    /// Keeps the history series in step with `window`.
    pub fn watch_history(&mut self, window: &PeriodWindow<Local>) {
        let key = WindowKey::new(window, self.session.sync_data_interval);
        let every = self.session.sync_interval();
        let api = self.api.clone();
        let state = self.state.clone();
        self.history_poll.ensure(key.clone(), move || {
            schedule(every, move || {
                let api = api.clone();
                let state = state.clone();
                let key = key.clone();
                async move {
                    let _busy = state.loading.begin();
                    match api.history(key.start, key.end, key.interval).await {
                        Ok(points) => *lock(&state.history) = points,
                        Err(e) => state.report("Loading history", &e),
                    }
                }
            })
        });
    }

    /// Fetches the uptime series of `mac` whenever the window changes.
    pub fn watch_uptime(&mut self, mac: &str, window: &PeriodWindow<Local>) {
        let key = WindowKey::new(window, 0);
        let api = self.api.clone();
        let state = self.state.clone();
        let mac = mac.to_string();
        self.uptime_poll.ensure((mac.clone(), key.clone()), move || {
            run_after(Duration::ZERO, move || async move {
                let _busy = state.loading.begin();
                match api.uptime_history(&mac, key.start, key.end, key.interval).await {
                    Ok(points) => {
                        state.uptime.insert(mac, points);
                    }
                    Err(e) => state.report("Loading uptime", &e),
                }
            })
        });
    }

    pub fn stop_uptime(&mut self) {
        self.uptime_poll.stop();
    }

    /// Whether the token expired or was rejected since the last call.
    pub fn take_signed_out(&self) -> bool {
        self.state.signed_out.swap(false, Ordering::AcqRel)
    }

    pub fn sign_in(&mut self, token: AuthToken) {
        self.api.set_token(Some(token.access_token.clone()));
        self.state.signed_out.store(false, Ordering::Release);
        self.session.user = Some(token);
        self.persist();
        info!("Signed in");
    }

    /// Stops every task and forgets the token and the fetched data.
    pub fn sign_out(&mut self) {
        self.devices_poll.stop();
        self.scan_poll.stop();
        self.history_poll.stop();
        self.uptime_poll.stop();
        self.expiry.stop();
        for mut request in lock(&self.requests).drain(..) {
            request.stop();
        }
        self.api.set_token(None);
        self.session.user = None;
        self.state.clear();
        self.persist();
        info!("Signed out");
    }

    /// Seconds between refreshes; 0 disables background refresh. Pollers pick
    /// the new value up on the next [`sync`](Self::sync).
    pub fn set_sync_interval(&mut self, seconds: u64) {
        if self.session.sync_data_interval != seconds {
            self.session.sync_data_interval = seconds;
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.sessions.save(&self.session) {
            error!("Failed to save session: {}", e);
            self.state.toasts.error("Could not save the session");
        }
    }

    /// Runs `job` now, keeping its handle so sign-out can cancel it.
    fn spawn_tracked<Fut>(&self, job: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = run_after(Duration::ZERO, move || job);
        let mut requests = lock(&self.requests);
        requests.retain(PollHandle::is_running);
        requests.push(handle);
    }

    fn request<T, Fut>(&self, what: &'static str, request: Fut) -> Pending<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let pending = Pending::new();
        let reply = pending.clone();
        let state = self.state.clone();
        self.spawn_tracked(async move {
            let _busy = state.loading.begin();
            let result = request.await;
            if let Err(e) = &result {
                if e.is_unauthorized() {
                    state.signed_out.store(true, Ordering::Release);
                }
                warn!("{} failed: {}", what, e);
            }
            reply.put(result);
        });
        pending
    }

    pub fn login(&self, email: &str, password: &str) -> Pending<AuthToken> {
        let api = self.api.clone();
        let (email, password) = (email.to_string(), password.to_string());
        self.request("Login", async move { api.login(&email, &password).await })
    }

    pub fn register(&self, full_name: &str, email: &str, password: &str) -> Pending<AuthToken> {
        let api = self.api.clone();
        let full_name = full_name.to_string();
        let (email, password) = (email.to_string(), password.to_string());
        self.request("Sign up", async move {
            api.register(&full_name, &email, &password).await
        })
    }

    pub fn check_token(&self) -> Pending<bool> {
        let api = self.api.clone();
        self.request("Token check", async move { api.check_token().await })
    }

    /// Toggles `action` on `device`, starting or stopping spoofing.
    pub fn toggle_spoof(&self, device: &Device, action: SpoofAction) {
        let next = spoof::toggled(device, &lock(&self.state.spoofed), action);
        let api = self.api.clone();
        let state = self.state.clone();
        self.spawn_tracked(async move {
            let _busy = state.loading.begin();
            if let Err(e) = spoof::apply(&api, &state.spoofed, next).await {
                if e.is_unauthorized() {
                    state.signed_out.store(true, Ordering::Release);
                }
                state.toasts.error("Spoofing has failed");
            }
        });
    }

    pub fn load_settings(&self) -> Pending<Settings> {
        let api = self.api.clone();
        self.request("Loading settings", async move { api.settings().await })
    }

    pub fn save_settings(&self, settings: Settings) -> Pending<()> {
        let api = self.api.clone();
        let state = self.state.clone();
        self.request("Saving settings", async move {
            api.update_settings(&settings).await?;
            state.toasts.success("Settings saved");
            Ok(())
        })
    }

    pub fn restart_scan_service(&self) -> Pending<()> {
        let api = self.api.clone();
        let state = self.state.clone();
        self.request("Restarting scan service", async move {
            api.restart_scan_service().await?;
            state.toasts.info("Scan service restarting");
            Ok(())
        })
    }

    pub fn restart_server_service(&self) -> Pending<()> {
        let api = self.api.clone();
        let state = self.state.clone();
        self.request("Restarting server service", async move {
            api.restart_server_service().await?;
            state.toasts.info("Server restarting");
            Ok(())
        })
    }

    pub fn load_known_devices(&self) -> Pending<String> {
        let api = self.api.clone();
        self.request("Loading known devices", async move {
            api.known_devices_config().await
        })
    }

    /// Uploads the known-devices document and refreshes the known count.
    pub fn save_known_devices(&self, document: String) -> Pending<()> {
        let api = self.api.clone();
        let state = self.state.clone();
        self.request("Saving known devices", async move {
            api.update_known_devices_config(&document).await?;
            state.toasts.success("Known devices saved");
            match api.known_devices_count().await {
                Ok(count) => *lock(&state.known_count) = Some(count),
                Err(e) => state.report("Loading known devices count", &e),
            }
            Ok(())
        })
    }
}

async fn refresh_devices(api: ApiClient, state: DashboardState) {
    let _busy = state.loading.begin();
    match api.devices().await {
        Ok(devices) => *lock(&state.devices) = devices,
        Err(e) => return state.report("Loading devices", &e),
    }
    match api.spoofed_device().await {
        Ok(spoofed) => *lock(&state.spoofed) = spoofed,
        Err(e) => return state.report("Loading spoofed device", &e),
    }
    match api.known_devices_count().await {
        Ok(count) => *lock(&state.known_count) = Some(count),
        Err(e) => state.report("Loading known devices count", &e),
    }
}

async fn refresh_scan(api: ApiClient, state: DashboardState) {
    let interval = match api.scan_interval().await {
        Ok(interval) => interval,
        Err(e) => return state.report("Loading scan interval", &e),
    };
    match api.last_scan().await {
        Ok(last_scan) => {
            *lock(&state.scan) = ScanTiming {
                last_scan: Some(last_scan),
                interval: Some(interval),
            }
        }
        Err(e) => state.report("Loading last scan", &e),
    }
}

/// The IP and MAC of this machine's default gateway.
pub fn detect_gateway() -> Result<(String, String), String> {
    let gateway = default_net::get_default_gateway()
        .map_err(|e| format!("Failed to get default gateway: {e}"))?;
    Ok((gateway.ip_addr.to_string(), gateway.mac_addr.address()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::{SelectablePeriod, Series};
    use chrono::{TimeZone, Weekday};
    use httpmock::prelude::*;
    use serde_json::json;

    fn store(server: &MockServer, dir: &tempfile::TempDir, session: Session) -> DashboardStore {
        let api = ApiClient::new(&server.base_url(), Duration::from_secs(5), None).unwrap();
        let sessions = SessionStore::new(dir.path().join("session.json"));
        DashboardStore::new(api, sessions, session)
    }

    fn signed_in(token: &str) -> Session {
        Session {
            user: Some(AuthToken {
                access_token: token.to_string(),
                token_type: "bearer".to_string(),
            }),
            sync_data_interval: 0,
        }
    }

    async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
        for _ in 0..200 {
            if let Some(value) = probe() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for background task");
    }

    #[tokio::test]
    async fn sign_in_persists_and_sign_out_forgets() {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&server, &dir, Session::default());
        assert!(!store.is_authenticated());

        store.sign_in(AuthToken {
            access_token: "abc".into(),
            token_type: "bearer".into(),
        });
        assert!(store.is_authenticated());
        assert_eq!(store.api.token().as_deref(), Some("abc"));
        let saved = SessionStore::new(dir.path().join("session.json")).load();
        assert_eq!(saved.access_token(), Some("abc"));

        store.sign_out();
        assert!(store.api.token().is_none());
        let saved = SessionStore::new(dir.path().join("session.json")).load();
        assert!(saved.user.is_none());
    }

    #[tokio::test]
    async fn sync_fetches_devices_with_the_stored_token() {
        let server = MockServer::start_async().await;
        let devices = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/device/all")
                    .header("authorization", "Bearer abc");
                then.status(200).json_body(json!([{
                    "last_online": "2024-03-10T12:00:00",
                    "name": "Laptop",
                    "type": "PC",
                    "ip": "192.168.1.20",
                    "hostname": "laptop.lan",
                    "mac": "aa:bb:cc:dd:ee:01",
                    "vendor": "Acme",
                    "open_ports": []
                }]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/spoof/device");
                then.status(200).json_body(json!({"mac": "", "ip": "", "forward": false}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/device/known/count");
                then.status(200).json_body(json!(4));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&server, &dir, signed_in("abc"));

        store.sync();
        let count = wait_for(|| *lock(&store.state.known_count)).await;
        assert_eq!(count, 4);
        assert_eq!(lock(&store.state.devices)[0].name, "Laptop");
        devices.assert_async().await;
        store.sign_out();
    }

    #[tokio::test]
    async fn rejected_token_requests_sign_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/settings");
                then.status(401).json_body(json!({"detail": "Could not validate credentials"}));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let store = store(&server, &dir, signed_in("abc"));

        let pending = store.load_settings();
        let reply = wait_for(|| pending.take()).await;
        assert_eq!(reply.unwrap_err(), "Could not validate credentials");
        assert!(store.take_signed_out());
        assert!(!store.take_signed_out());
    }

    #[tokio::test]
    async fn sign_out_cancels_a_spoof_request_in_flight() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/spoof/start");
                then.status(200)
                    .delay(Duration::from_millis(300))
                    .json_body(json!(null));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&server, &dir, signed_in("abc"));
        let target = Device {
            last_online: Utc::now(),
            name: "Console".into(),
            kind: "Game console".into(),
            ip: "10.0.0.9".into(),
            hostname: String::new(),
            mac: "aa:bb".into(),
            vendor: String::new(),
            open_ports: Vec::new(),
        };

        store.toggle_spoof(&target, SpoofAction::Block);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.state.loading.is_loading());
        store.sign_out();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*lock(&store.state.spoofed), SpoofedDevice::default());
        assert!(!store.state.loading.is_loading());
        assert!(!store.take_signed_out());
    }

    #[tokio::test]
    async fn uptime_is_stored_per_device() {
        let server = MockServer::start_async().await;
        let uptime = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/device/uptime")
                    .query_param("mac", "aa:bb:cc:dd:ee:01")
                    .query_param("interval", "3600");
                then.status(200)
                    .json_body(json!([{"time": "2024-03-10T00:00:00Z", "uptime": 3600}]));
            })
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&server, &dir, signed_in("abc"));
        let now = Local.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap();
        let window = PeriodWindow::starting_now(Series::Uptime, SelectablePeriod::Day, &now, Weekday::Sun);

        store.watch_uptime("aa:bb:cc:dd:ee:01", &window);
        store.watch_uptime("aa:bb:cc:dd:ee:01", &window);
        let points = wait_for(|| {
            store
                .state
                .uptime
                .get("aa:bb:cc:dd:ee:01")
                .map(|entry| entry.value().clone())
        })
        .await;
        assert_eq!(points[0].uptime, 3600);
        uptime.assert_calls_async(1).await;
    }
}
