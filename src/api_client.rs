//! Spotify Web API client with transparent token refresh.
//!
//! Every call goes out with the current bearer token. A 401 marks the
//! token stale, refreshes it through the [`CredentialStore`], and retries
//! the request exactly once; a second 401 means the refreshed token is
//! still not accepted and the call gives up with an auth error instead of
//! looping.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::auth::{AuthError, Credential, CredentialStore};
use crate::util;

/// Spotify Web API root. Tests swap in a local stub.
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed")]
    Transport(#[source] Box<ureq::Error>),
    #[error("could not decode api response")]
    Decode(#[from] serde_json::Error),
}

/// A successful (2xx) response, body already drained.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
    credentials: CredentialStore,
}

impl ApiClient {
    pub fn new(credentials: CredentialStore) -> Self {
        Self::with_base_url(credentials, API_BASE_URL)
    }

    pub fn with_base_url(credentials: CredentialStore, base_url: impl Into<String>) -> Self {
        Self {
            agent: util::http_agent(),
            base_url: base_url.into(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    /// Issue a request against the API with the 401-heal discipline
    /// described at the module level.
    pub fn call(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.current_token()?;
        let response = self.dispatch(method, endpoint, &token, body)?;
        if response.status != 401 {
            return Self::into_result(response);
        }

        debug!(
            "{} {} answered 401, refreshing access token",
            method.as_str(),
            endpoint
        );
        self.credentials.mark_stale();
        let refreshed = self.credentials.refresh()?;
        let retried = self.dispatch(method, endpoint, &refreshed.access_token, body)?;
        if retried.status == 401 {
            warn!(
                "{} {} still unauthorized after a refresh",
                method.as_str(),
                endpoint
            );
            return Err(ApiError::Auth(AuthError::StillUnauthorized));
        }
        Self::into_result(retried)
    }

    /// Switch playback to the given context. Bare IDs are treated as
    /// playlist IDs and expanded to full URIs; anything with a `:` is
    /// passed through untouched (albums, artists, shows).
    pub fn play_context(&mut self, context: &str) -> Result<(), ApiError> {
        let uri = if context.contains(':') {
            context.to_string()
        } else {
            format!("spotify:playlist:{context}")
        };
        let body = serde_json::json!({ "context_uri": uri });
        self.call(Method::Put, "/me/player/play", Some(&body))?;
        Ok(())
    }

    /// The authorized user's profile; used as a startup credential check.
    pub fn me(&mut self) -> Result<UserProfile, ApiError> {
        let response = self.call(Method::Get, "/me", None)?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// A missing, stale, or expired access token is refreshed upfront
    /// instead of burning a request that is guaranteed to 401.
    fn current_token(&mut self) -> Result<String, ApiError> {
        let expired = self
            .credentials
            .credential()
            .is_some_and(Credential::is_expired);
        if !expired && self.credentials.is_usable() {
            if let Some(token) = self.credentials.access_token() {
                return Ok(token.to_string());
            }
        }
        Ok(self.credentials.refresh()?.access_token)
    }

    fn dispatch(
        &self,
        method: Method,
        endpoint: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let bearer = format!("Bearer {token}");
        let result = match method {
            Method::Get => self.agent.get(&url).header("Authorization", &bearer).call(),
            Method::Put => {
                let request = self.agent.put(&url).header("Authorization", &bearer);
                match body {
                    Some(value) => request.send_json(value),
                    None => request.send_empty(),
                }
            }
            Method::Post => {
                let request = self.agent.post(&url).header("Authorization", &bearer);
                match body {
                    Some(value) => request.send_json(value),
                    None => request.send_empty(),
                }
            }
        };
        let mut response = result.map_err(|e| ApiError::Transport(Box::new(e)))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(Box::new(e)))?;
        Ok(ApiResponse { status, body })
    }

    fn into_result(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if (200..300).contains(&response.status) {
            Ok(response)
        } else {
            Err(ApiError::Status {
                status: response.status,
                body: response.body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use crate::testing::{json_response, StubServer};

    struct NullStore;

    impl TokenStore for NullStore {
        fn save(&self, _: &Credential) -> anyhow::Result<()> {
            Ok(())
        }

        fn load(&self) -> anyhow::Result<Option<Credential>> {
            Ok(None)
        }
    }

    const PROFILE: &str = r#"{"id": "user-1", "display_name": "Test User"}"#;
    const GRANT: &str = r#"{"access_token": "fresh-token", "token_type": "Bearer"}"#;

    fn client_against(server: &StubServer, credential: Credential) -> ApiClient {
        let mut store = CredentialStore::with_token_url(
            "client-id",
            "client-secret",
            Box::new(NullStore),
            format!("{}/api/token", server.base_url()),
        );
        store.initialize(credential);
        ApiClient::with_base_url(store, server.base_url())
    }

    fn live_credential(access_token: &str) -> Credential {
        Credential {
            access_token: access_token.into(),
            refresh_token: "refresh-1".into(),
            expires_at: None,
        }
    }

    /// Body of a captured request, parsed as JSON. The client owns its
    /// wire formatting, so assertions compare values, not text.
    fn request_json_body(raw: &str) -> serde_json::Value {
        let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_me_parses_profile() {
        let server = StubServer::start(vec![json_response(200, PROFILE)]);
        let mut client = client_against(&server, live_credential("valid-token"));

        let profile = client.me().unwrap();
        assert_eq!(profile.id, "user-1");
        assert_eq!(profile.display_name.as_deref(), Some("Test User"));

        let requests = server.finish();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("GET /me "));
        assert!(requests[0].contains("Bearer valid-token"));
    }

    #[test]
    fn test_401_refreshes_and_retries_once() {
        let server = StubServer::start(vec![
            json_response(401, r#"{"error": {"status": 401}}"#),
            json_response(200, GRANT),
            json_response(200, PROFILE),
        ]);
        let mut client = client_against(&server, live_credential("stale-token"));

        let profile = client.me().unwrap();
        assert_eq!(profile.id, "user-1");
        assert!(client.credentials().is_usable());

        let requests = server.finish();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].contains("Bearer stale-token"));
        assert!(requests[1].starts_with("POST /api/token "));
        assert!(requests[1].contains("grant_type=refresh_token"));
        assert!(requests[2].contains("Bearer fresh-token"));
    }

    #[test]
    fn test_second_401_after_refresh_gives_up() {
        let server = StubServer::start(vec![
            json_response(401, "{}"),
            json_response(200, GRANT),
            json_response(401, "{}"),
        ]);
        let mut client = client_against(&server, live_credential("stale-token"));

        let err = client.me().unwrap_err();
        assert!(matches!(
            err,
            ApiError::Auth(AuthError::StillUnauthorized)
        ));
        // exactly one retry, never a loop
        assert_eq!(server.finish().len(), 3);
    }

    #[test]
    fn test_refresh_failure_surfaces_as_auth_error() {
        let server = StubServer::start(vec![
            json_response(401, "{}"),
            json_response(400, r#"{"error": "invalid_grant"}"#),
        ]);
        let mut client = client_against(&server, live_credential("stale-token"));

        let err = client.me().unwrap_err();
        assert!(matches!(
            err,
            ApiError::Auth(AuthError::Rejected { status: 400, .. })
        ));
        assert!(!client.credentials().is_usable());
        assert_eq!(server.finish().len(), 2);
    }

    #[test]
    fn test_non_auth_status_does_not_retry() {
        let server = StubServer::start(vec![json_response(
            403,
            r#"{"error": {"status": 403, "message": "Player command failed"}}"#,
        )]);
        let mut client = client_against(&server, live_credential("valid-token"));

        let err = client.me().unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("Player command failed"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
        assert_eq!(server.finish().len(), 1);
    }

    #[test]
    fn test_play_context_passes_full_uris_through() {
        let server = StubServer::start(vec![json_response(204, "")]);
        let mut client = client_against(&server, live_credential("valid-token"));

        client.play_context("spotify:album:4aawyAB9vmqN3uQ7FjRGTy").unwrap();

        let requests = server.finish();
        assert!(requests[0].starts_with("PUT /me/player/play "));
        let body = request_json_body(&requests[0]);
        assert_eq!(body["context_uri"], "spotify:album:4aawyAB9vmqN3uQ7FjRGTy");
    }

    #[test]
    fn test_play_context_expands_bare_playlist_ids() {
        let server = StubServer::start(vec![json_response(204, "")]);
        let mut client = client_against(&server, live_credential("valid-token"));

        client.play_context("37i9dQZF1DX5trt9i14X7j").unwrap();

        let requests = server.finish();
        let body = request_json_body(&requests[0]);
        assert_eq!(body["context_uri"], "spotify:playlist:37i9dQZF1DX5trt9i14X7j");
    }

    #[test]
    fn test_expired_token_refreshes_before_calling() {
        let server = StubServer::start(vec![
            json_response(200, GRANT),
            json_response(200, PROFILE),
        ]);
        let mut expired = live_credential("dusty-token");
        expired.expires_at = Some(util::now_unix().saturating_sub(60));
        let mut client = client_against(&server, expired);

        client.me().unwrap();

        let requests = server.finish();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("POST /api/token "));
        assert!(requests[1].contains("Bearer fresh-token"));
    }

    #[test]
    fn test_seeded_store_refreshes_on_first_call() {
        // refresh-token-only credential, e.g. seeded from the environment
        let server = StubServer::start(vec![
            json_response(200, GRANT),
            json_response(200, PROFILE),
        ]);
        let mut client = client_against(&server, Credential::from_refresh_token("refresh-1"));

        let profile = client.me().unwrap();
        assert_eq!(profile.id, "user-1");
        assert_eq!(server.finish().len(), 2);
    }
}
