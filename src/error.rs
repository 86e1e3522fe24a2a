use hyper::StatusCode;
use thiserror::Error;

/// Type alias for Result with LabelerError
pub type Result<T> = std::result::Result<T, LabelerError>;

/// Error reasons the Gmail API uses to signal quota exhaustion
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Error types for the receipt labeling pipeline
#[derive(Error, Debug)]
pub enum LabelerError {
    /// Credentials missing, expired or rejected
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Remote quota exhausted - back off and retry the identical request
    #[error("Rate limit exceeded: {reason}")]
    RateLimited { reason: String },

    /// Remote service answered with a non-success status
    #[error("Remote request failed (HTTP {status}): {body}")]
    RemoteRequest { status: u16, body: String },

    /// Connection-level failure (reset, timeout, DNS, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Remote payload could not be interpreted
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Every mutation chunk failed
    #[error("Failed to apply labels to any of {requested} threads")]
    NoProgress { requested: usize },

    /// Generic failures kept recurring past the retry ceiling
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<LabelerError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller supplied an unusable argument (bad date, empty label name, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any other client library failure
    #[error("Gmail API error: {0}")]
    Api(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LabelerError {
    /// True for the distinguished quota signal
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LabelerError::RateLimited { .. })
    }

    /// Check if the error is transient and worth retrying against the ceiling
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LabelerError::RateLimited { .. }
                | LabelerError::RemoteRequest { .. }
                | LabelerError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Classify a Google JSON error body (`{"error": {"code", "status", "errors": [{"reason"}]}}`)
fn from_error_body(body: &serde_json::Value) -> LabelerError {
    let error = &body["error"];
    let status = error["code"].as_u64().unwrap_or(400) as u16;
    let reason = error["errors"]
        .as_array()
        .and_then(|errors| errors.first())
        .and_then(|first| first["reason"].as_str())
        .unwrap_or_default();
    let api_status = error["status"].as_str().unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        || RATE_LIMIT_REASONS.contains(&reason)
        || api_status == "RESOURCE_EXHAUSTED"
    {
        let reason = if reason.is_empty() {
            "rateLimitExceeded".to_string()
        } else {
            reason.to_string()
        };
        return LabelerError::RateLimited { reason };
    }

    if status == StatusCode::UNAUTHORIZED.as_u16() {
        let message = error["message"].as_str().unwrap_or("invalid credentials");
        return LabelerError::AuthError(message.to_string());
    }

    LabelerError::RemoteRequest {
        status,
        body: body.to_string(),
    }
}

fn from_status(status: StatusCode) -> LabelerError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LabelerError::RateLimited {
            reason: "HTTP 429".to_string(),
        },
        StatusCode::UNAUTHORIZED => LabelerError::AuthError("HTTP 401".to_string()),
        other => LabelerError::RemoteRequest {
            status: other.as_u16(),
            body: other.canonical_reason().unwrap_or("Unknown").to_string(),
        },
    }
}

impl From<google_gmail1::Error> for LabelerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // google-gmail1 surfaces any non-success response with a JSON body here
            google_gmail1::Error::BadRequest(ref body) => from_error_body(body),
            google_gmail1::Error::Failure(ref response) => from_status(response.status()),
            google_gmail1::Error::MissingToken(ref err) => {
                LabelerError::AuthError(format!("No token available: {}", err))
            }
            google_gmail1::Error::HttpError(ref err) => {
                LabelerError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => LabelerError::NetworkError(err.to_string()),
            _ => LabelerError::Api(error.to_string()),
        }
    }
}
