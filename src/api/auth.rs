// Bearer token acquisition for the MEMD API
//
// Tokens come from a password grant against `{base}/v2/token`. A token is
// valid while `now < last_refreshed + expires_in` and is fetched lazily on
// first use and again whenever it has expired.

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ApiError, ApiResult};
use crate::config::ApiConfig;
use crate::utils::duration_serde;

/// A bearer token issued by the token endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Token value sent in the `Authorization` header
    pub access_token: String,
    /// Token type reported by the server, normally `bearer`
    pub token_type: String,
    /// Lifetime from the moment of refresh
    #[serde(with = "duration_serde")]
    pub expires_in: Duration,
    /// When this token was obtained
    pub last_refreshed: DateTime<Utc>,
}

impl AccessToken {
    /// Check whether the token has expired at the given instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.last_refreshed + self.expires_in
    }

    /// Check whether the token has expired now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Wire shape of a successful token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: i64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Owns the current bearer token and refreshes it when needed
#[derive(Debug)]
pub struct TokenManager {
    token_url: String,
    username: String,
    password: String,
    client_id: String,
    client_secret: String,
    token: Option<AccessToken>,
}

impl TokenManager {
    /// Create a token manager for the configured API
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            token_url: format!("{}/v2/token", config.base_url.trim_end_matches('/')),
            username: config.username.clone(),
            password: config.password.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: None,
        }
    }

    /// Whether a fresh token must be requested before the next call
    pub fn needs_refresh(&self) -> bool {
        self.token.as_ref().map_or(true, |token| token.is_expired())
    }

    /// The current token, if one has been obtained
    pub fn current(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    /// Return a valid token, requesting a new one if missing or expired
    pub fn get_token(&mut self, http: &Client) -> ApiResult<&AccessToken> {
        if self.needs_refresh() {
            let token = self.request_token(http)?;
            self.token = Some(token);
        }

        self.token.as_ref().ok_or_else(|| ApiError::InvalidResponse {
            url: self.token_url.clone(),
            message: "no token available after refresh".to_string(),
        })
    }

    fn request_token(&self, http: &Client) -> ApiResult<AccessToken> {
        debug!("Retrieving Bearer Token");

        let form = [
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .map_err(|e| ApiError::from_transport(&self.token_url, e))?;

        let status = response.status();
        debug!(
            "{} {} {}",
            self.token_url,
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ApiError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let data: TokenResponse = response.json().map_err(|e| ApiError::InvalidResponse {
            url: self.token_url.clone(),
            message: e.to_string(),
        })?;

        debug!("Refreshed token, expires in {}", data.expires_in);
        Ok(AccessToken {
            access_token: data.access_token,
            token_type: data.token_type,
            expires_in: Duration::seconds(data.expires_in),
            last_refreshed: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config_for(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            timeout_seconds: Some(5),
        }
    }

    fn token(expires_in: Duration, last_refreshed: DateTime<Utc>) -> AccessToken {
        AccessToken {
            access_token: "abc".to_string(),
            token_type: "bearer".to_string(),
            expires_in,
            last_refreshed,
        }
    }

    #[test]
    fn test_token_expiry_boundary() {
        let refreshed = Utc::now();
        let token = token(Duration::seconds(60), refreshed);

        assert!(!token.is_expired_at(refreshed));
        assert!(!token.is_expired_at(refreshed + Duration::seconds(59)));
        assert!(token.is_expired_at(refreshed + Duration::seconds(60)));
    }

    #[test]
    fn test_zero_lifetime_is_immediately_expired() {
        let token = token(Duration::zero(), Utc::now());
        assert!(token.is_expired());
        assert_eq!(token.authorization(), "Bearer abc");
    }

    #[test]
    fn test_password_grant_is_cached() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/token")
                .body_contains("grant_type=password")
                .body_contains("username=user")
                .body_contains("client_secret=secret");
            then.status(200).json_body(json!({
                "access_token": "tok-1",
                "token_type": "bearer",
                "expires_in": 3600
            }));
        });

        let http = Client::new();
        let mut manager = TokenManager::new(&config_for(&server.base_url()));
        assert!(manager.needs_refresh());

        let value = manager.get_token(&http).unwrap().access_token.clone();
        assert_eq!(value, "tok-1");
        manager.get_token(&http).unwrap();

        mock.assert_hits(1);
        assert!(!manager.needs_refresh());
    }

    #[test]
    fn test_trailing_slash_base_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v2/token");
            then.status(200).json_body(json!({
                "access_token": "tok-2",
                "token_type": "bearer",
                "expires_in": 60
            }));
        });

        let http = Client::new();
        let mut manager = TokenManager::new(&config_for(&format!("{}/", server.base_url())));
        assert_eq!(manager.get_token(&http).unwrap().access_token, "tok-2");
        mock.assert_hits(1);
    }

    #[test]
    fn test_token_failure_is_auth_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v2/token");
            then.status(401).body("invalid_grant");
        });

        let http = Client::new();
        let mut manager = TokenManager::new(&config_for(&server.base_url()));
        match manager.get_token(&http) {
            Err(ApiError::Auth { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("expected auth error, got {:?}", other),
        }
        assert!(manager.current().is_none());
    }
}
