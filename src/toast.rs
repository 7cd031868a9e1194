use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const TOAST_LIFETIME: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    expires_at: Instant,
}

/// Transient notifications shown in the corner of the dashboard.
#[derive(Debug, Clone, Default)]
pub struct Toasts {
    inner: Arc<Mutex<Vec<Toast>>>,
}

impl Toasts {
    pub fn push(&self, level: ToastLevel, message: impl Into<String>) {
        self.push_at(level, message, Instant::now());
    }

    fn push_at(&self, level: ToastLevel, message: impl Into<String>, now: Instant) {
        let toast = Toast {
            level,
            message: message.into(),
            expires_at: now + TOAST_LIFETIME,
        };
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(ToastLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(ToastLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(ToastLevel::Error, message);
    }

    /// Drops expired toasts and returns the rest, oldest first.
    pub fn visible(&self, now: Instant) -> Vec<Toast> {
        let mut toasts = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        toasts.retain(|toast| toast.expires_at > now);
        toasts.clone()
    }
}
