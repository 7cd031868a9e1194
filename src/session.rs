use crate::config::{config_dir, ConfigError};
use crate::error::ApiError;
use crate::models::AuthToken;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const SESSION_FILE: &str = "session.json";

/// How often dashboard data is re-fetched, chosen in the settings editor.
pub const SYNC_DATA_INTERVAL_OPTIONS: [(&str, u64); 6] = [
    ("10 Seconds", 10),
    ("30 Seconds", 30),
    ("Minute", 60),
    ("5 Minutes", 300),
    ("10 Minutes", 600),
    ("Never", 0),
];

fn default_sync_interval() -> u64 {
    60
}

/// Client-side state that survives restarts: the bearer token and the sync
/// interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub user: Option<AuthToken>,
    /// Seconds; 0 disables background refresh.
    #[serde(default = "default_sync_interval")]
    pub sync_data_interval: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            sync_data_interval: default_sync_interval(),
        }
    }
}

impl Session {
    pub fn access_token(&self) -> Option<&str> {
        self.user
            .as_ref()
            .filter(|user| !user.access_token.is_empty())
            .map(|user| user.access_token.as_str())
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_data_interval > 0).then(|| Duration::from_secs(self.sync_data_interval))
    }
}

/// Reads and writes the session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_config_dir() -> Option<Self> {
        config_dir().map(|dir| Self::new(dir.join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file yields an empty session.
    pub fn load(&self) -> Session {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return Session::default(),
        };
        match serde_json::from_str(&text) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %self.path.display(), "Discarding corrupt session file: {}", e);
                Session::default()
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, text).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "Saved session");
        Ok(())
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Reads the `exp` claim of a JWT without verifying its signature; the
/// backend is the authority on validity.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, ApiError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| ApiError::InvalidToken(e.to_string()))?;
    Utc.timestamp_opt(data.claims.exp, 0)
        .single()
        .ok_or_else(|| ApiError::InvalidToken(format!("exp out of range: {}", data.claims.exp)))
}

/// Time left before `token` expires; zero when already expired.
pub fn token_expiration_delta(token: &str, now: DateTime<Utc>) -> Result<Duration, ApiError> {
    let expiry = token_expiry(token)?;
    Ok((expiry - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    fn token_expiring_at(exp: i64) -> String {
        let claims = TestClaims {
            sub: "user@example.com".into(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"server-secret")).unwrap()
    }

    #[test]
    fn expiry_is_read_without_the_secret() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let token = token_expiring_at(now.timestamp() + 90);
        assert_eq!(token_expiration_delta(&token, now).unwrap(), Duration::from_secs(90));

        let stale = token_expiring_at(now.timestamp() - 5);
        assert_eq!(token_expiration_delta(&stale, now).unwrap(), Duration::ZERO);
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(matches!(token_expiry("not-a-jwt"), Err(ApiError::InvalidToken(_))));
    }

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join(SESSION_FILE));
        assert_eq!(store.load(), Session::default());

        let session = Session {
            user: Some(AuthToken {
                access_token: "abc".into(),
                token_type: "bearer".into(),
            }),
            sync_data_interval: 0,
        };
        store.save(&session).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.access_token(), Some("abc"));
        assert_eq!(loaded.sync_interval(), None);
    }

    #[test]
    fn corrupt_session_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(SessionStore::new(path).load(), Session::default());
    }
}
