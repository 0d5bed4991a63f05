// Error taxonomy for the MEMD API client
//
// Every remote call and every payload check surfaces one of these variants.
// Callers decide which ones are benign (a 404 on policy termination, a missing
// member during get-or-create) and which abort the operation.

use reqwest::header::HeaderMap;
use thiserror::Error;

/// Errors raised by the MEMD client library
#[derive(Debug, Error)]
pub enum ApiError {
    /// The token endpoint rejected the password grant
    #[error("token request failed with HTTP {status}: {body}")]
    Auth { status: u16, body: String },

    /// Any other non-2xx response
    #[error("{url} {status} {reason}")]
    Http {
        url: String,
        status: u16,
        reason: String,
        headers: Vec<(String, String)>,
        body: String,
    },

    /// A 404 response; several flows treat this as a signal rather than a failure
    #[error("{url} 404 Not Found")]
    NotFound { url: String, body: String },

    /// The request did not complete within the configured timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection or protocol level failure before a response was received
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The member payload does not conform to the member schema
    #[error("member payload failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Policy deactivation kept finding active policies after every reload
    #[error("too many attempts to deactivate policies for {external_id} ({attempts})")]
    TooManyAttempts { external_id: String, attempts: usize },

    /// A 2xx response whose body could not be interpreted
    #[error("unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

impl ApiError {
    /// Build an error from a non-2xx response that has already been read
    pub(crate) fn from_status(
        url: &str,
        status: reqwest::StatusCode,
        headers: &HeaderMap,
        body: String,
    ) -> Self {
        if status == reqwest::StatusCode::NOT_FOUND {
            return ApiError::NotFound {
                url: url.to_string(),
                body,
            };
        }

        ApiError::Http {
            url: url.to_string(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers: headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).to_string(),
                    )
                })
                .collect(),
            body,
        }
    }

    /// Map a reqwest failure that happened before any status was available
    pub(crate) fn from_transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
            }
        } else {
            ApiError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status, .. } | ApiError::Http { status, .. } => Some(*status),
            ApiError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Whether the request may succeed if simply sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout { .. } => true,
            ApiError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    /// Multi-line description including response headers and body
    pub fn detailed_message(&self) -> String {
        match self {
            ApiError::Http {
                url,
                status,
                reason,
                headers,
                body,
            } => {
                let mut message = format!("{} {} {}\nHeaders:\n", url, status, reason);
                for (name, value) in headers {
                    message.push_str(&format!("  {}: {}\n", name, value));
                }
                message.push_str(&format!("Body:\n{}", body));
                message
            }
            ApiError::NotFound { url, body } => format!("{} 404 Not Found\nBody:\n{}", url, body),
            other => other.to_string(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
