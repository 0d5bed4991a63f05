// HTTP transport for the MEMD API
//
// Every call is blocking and sequential. The bearer token is injected on each
// request, refreshed first when it has expired. Non-2xx responses become typed
// errors carrying status, headers and body; the caller decides what to do.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::auth::{AccessToken, TokenManager};
use super::error::{ApiError, ApiResult};
use crate::config::ApiConfig;
use crate::member::PrimaryMember;
use crate::schema;
use crate::utils::dates;

const USER_AGENT: &str = concat!("memd-client/", env!("CARGO_PKG_VERSION"));

/// Authenticated client for the MEMD partner API
#[derive(Debug)]
pub struct MemdClient {
    base_url: String,
    http: Client,
    tokens: TokenManager,
}

impl MemdClient {
    /// Create a client for the configured API
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::from_transport(&config.base_url, e))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            tokens: TokenManager::new(config),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current valid access token, refreshing it if necessary
    pub fn access_token(&mut self) -> ApiResult<AccessToken> {
        self.tokens.get_token(&self.http).cloned()
    }

    /// `{base}/v1/partnermember/{id}`
    pub fn member_url(&self, external_id: &str) -> String {
        format!("{}/v1/partnermember/{}", self.base_url, external_id)
    }

    /// `{base}/v1/partnermember/{id}/policy/`
    pub fn policy_url(&self, external_id: &str) -> String {
        format!("{}/v1/partnermember/{}/policy/", self.base_url, external_id)
    }

    /// `{base}/v1/member/{id}/policy/{plancode}`
    pub fn termination_url(&self, external_id: &str, plancode: &str) -> String {
        format!("{}/v1/member/{}/policy/{}", self.base_url, external_id, plancode)
    }

    pub fn get_json(&mut self, url: &str) -> ApiResult<Value> {
        self.send::<Value>(Method::GET, url, None)
    }

    pub fn post_json<T: Serialize + ?Sized>(&mut self, url: &str, payload: &T) -> ApiResult<Value> {
        self.send(Method::POST, url, Some(payload))
    }

    pub fn put_json<T: Serialize + ?Sized>(&mut self, url: &str, payload: &T) -> ApiResult<Value> {
        self.send(Method::PUT, url, Some(payload))
    }

    fn send<T: Serialize + ?Sized>(
        &mut self,
        method: Method,
        url: &str,
        payload: Option<&T>,
    ) -> ApiResult<Value> {
        let authorization = self.tokens.get_token(&self.http)?.authorization();

        let mut request: RequestBuilder = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization);
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .map_err(|e| ApiError::from_transport(url, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .map_err(|e| ApiError::from_transport(url, e))?;

        if !status.is_success() {
            let err = ApiError::from_status(url, status, &headers, body);
            if err.is_not_found() {
                debug!("{} {} 404 Not Found", method, url);
            } else {
                error!("{}", err.detailed_message());
            }
            return Err(err);
        }

        debug!(
            "{} {} {} {}",
            method,
            url,
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Validate a member payload against the member schema
    pub fn validate_member(&self, payload: &Value) -> ApiResult<()> {
        schema::validate_member(payload)
    }

    /// Fetch a member by external id
    pub fn get_primary_member(&mut self, external_id: &str) -> ApiResult<PrimaryMember<'_>> {
        let url = self.member_url(external_id);
        let data = self.get_json(&url)?;
        PrimaryMember::from_value(self, data, &url)
    }

    /// Validate and create a new member
    pub fn create_primary_member(&mut self, payload: &Value) -> ApiResult<PrimaryMember<'_>> {
        schema::validate_member(payload)?;
        let url = format!("{}/v1/partnermember", self.base_url);
        let data = self.post_json(&url, payload)?;
        PrimaryMember::from_value(self, data, &url)
    }

    /// Fetch the member named by the payload, creating it when it does not exist
    ///
    /// With `ensure_plancode`, the payload's plan code is then reconciled
    /// against the member's active policies, starting at the payload's
    /// benefit start date.
    pub fn get_or_create_primary_member(
        &mut self,
        payload: &Value,
        ensure_plancode: bool,
        dry_run: bool,
    ) -> ApiResult<PrimaryMember<'_>> {
        schema::validate_member(payload)?;
        let fields = payload.as_object().cloned().unwrap_or_default();
        let external_id = required_str(&fields, "externalID")?;
        let plancode = required_str(&fields, "plancode")?;
        let benefitstart_raw = required_str(&fields, "benefitstart")?;
        let benefitstart = dates::parse_benefit_date(&benefitstart_raw).ok_or_else(|| {
            ApiError::Validation(vec![format!(
                "benefitstart {:?} is not an ISO date",
                benefitstart_raw
            )])
        })?;

        let url = self.member_url(&external_id);
        let existing = match self.get_json(&url) {
            Ok(data) => Some(data),
            Err(err @ (ApiError::NotFound { .. } | ApiError::Http { .. })) => {
                debug!("{}", err);
                info!(
                    "Primary member with ID {} not found, creating new member.",
                    external_id
                );
                None
            }
            Err(err) => return Err(err),
        };

        let mut member = match existing {
            Some(data) => {
                info!("Primary member {} found.", external_id);
                PrimaryMember::from_value(self, data, &url)?
            }
            None => self.create_primary_member(payload)?,
        };

        if ensure_plancode {
            info!("Ensuring plancode {} benefitstart: {}", plancode, benefitstart);
            member.ensure_plancode(&plancode, Some(benefitstart), dry_run)?;
        }

        Ok(member)
    }
}

fn required_str(fields: &Map<String, Value>, key: &str) -> ApiResult<String> {
    match fields.get(key).and_then(Value::as_str) {
        Some(value) => Ok(value.to_string()),
        None => {
            warn!("Member payload has no string {}", key);
            Err(ApiError::Validation(vec![format!("{} is required", key)]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer) -> MemdClient {
        server.mock(|when, then| {
            when.method(POST).path("/v2/token");
            then.status(200).json_body(json!({
                "access_token": "tok",
                "token_type": "bearer",
                "expires_in": 3600
            }));
        });
        let config = ApiConfig {
            base_url: format!("{}/", server.base_url()),
            username: "user".to_string(),
            password: "pass".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            timeout_seconds: Some(5),
        };
        MemdClient::new(&config).unwrap()
    }

    #[test]
    fn test_urls() {
        let server = MockServer::start();
        let client = client_for(&server);
        let base = server.base_url();

        assert_eq!(client.base_url(), base);
        assert_eq!(client.member_url("m1"), format!("{}/v1/partnermember/m1", base));
        assert_eq!(client.policy_url("m1"), format!("{}/v1/partnermember/m1/policy/", base));
        assert_eq!(
            client.termination_url("m1", "PLAN"),
            format!("{}/v1/member/m1/policy/PLAN", base)
        );
    }

    #[test]
    fn test_bearer_header_is_sent() {
        let server = MockServer::start();
        let mut client = client_for(&server);
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/partnermember/m1")
                .header("authorization", "Bearer tok")
                .header("accept", "application/json");
            then.status(200).json_body(json!({"externalID": "m1"}));
        });

        let url = client.member_url("m1");
        let data = client.get_json(&url).unwrap();
        assert_eq!(data["externalID"], "m1");
        mock.assert();
    }

    #[test]
    fn test_put_sends_json_body() {
        let server = MockServer::start();
        let mut client = client_for(&server);
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/v1/partnermember/m1")
                .json_body(json!({"email": "a@b.c"}));
            then.status(200).json_body(json!({"ok": true}));
        });

        let url = client.member_url("m1");
        let data = client.put_json(&url, &json!({"email": "a@b.c"})).unwrap();
        assert_eq!(data, json!({"ok": true}));
        mock.assert();
    }

    #[test]
    fn test_empty_success_body_is_null() {
        let server = MockServer::start();
        let mut client = client_for(&server);
        server.mock(|when, then| {
            when.method(POST).path("/v1/member/m1/policy/P");
            then.status(204);
        });

        let url = client.termination_url("m1", "P");
        let data = client.post_json(&url, &json!({"termdate": "x"})).unwrap();
        assert_eq!(data, Value::Null);
    }

    #[test]
    fn test_non_success_statuses() {
        let server = MockServer::start();
        let mut client = client_for(&server);
        server.mock(|when, then| {
            when.method(GET).path("/v1/partnermember/missing");
            then.status(404).body("nope");
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/partnermember/broken");
            then.status(500)
                .header("x-request-id", "r-1")
                .body("boom");
        });

        let url = client.member_url("missing");
        assert!(client.get_json(&url).unwrap_err().is_not_found());

        let url = client.member_url("broken");
        match client.get_json(&url).unwrap_err() {
            ApiError::Http {
                status,
                body,
                headers,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
                assert!(headers.iter().any(|(k, v)| k == "x-request-id" && v == "r-1"));
            }
            other => panic!("expected http error, got {:?}", other),
        }
    }

    #[test]
    fn test_unreachable_server_is_retryable() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            timeout_seconds: Some(2),
        };
        let mut client = MemdClient::new(&config).unwrap();
        let err = client.access_token().unwrap_err();
        assert!(err.is_retryable());
    }
}
