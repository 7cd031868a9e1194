use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Invalid origin: {0}")]
    Url(String),
}

impl ApiError {
    /// Builds the error for a non-200 response from its raw body.
    ///
    /// The backend answers with `{"detail": "..."}` or, for rejected input,
    /// `{"detail": [{"msg": "...", "loc": ["body", "field"]}]}`.
    pub fn from_response_body(status: StatusCode, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { detail: Some(detail) }) => describe_detail(&detail),
            _ if body.trim().is_empty() => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
            _ => body.trim().to_string(),
        };
        ApiError::Status { status, message }
    }

    /// Text suitable for showing next to the control that triggered the request.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::InvalidToken(_) => "Unexpected error".to_string(),
            ApiError::Transport(_) | ApiError::Decode(_) | ApiError::Url(_) => {
                "Unexpected error".to_string()
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

#[derive(Deserialize)]
struct ValidationIssue {
    msg: String,
    #[serde(default)]
    loc: Vec<Value>,
}

fn describe_detail(detail: &Value) -> String {
    match detail {
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let first = items
                .first()
                .and_then(|item| ValidationIssue::deserialize(item).ok());
            match first {
                Some(issue) => match issue.loc.get(1) {
                    Some(Value::String(field)) => format!("{}: {}", issue.msg, field),
                    Some(other) => format!("{}: {}", issue.msg, other),
                    None => issue.msg,
                },
                None => "Invalid request".to_string(),
            }
        }
        other => other.to_string(),
    }
}
