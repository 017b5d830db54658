//! Token lifecycle against the Spotify accounts service.
//!
//! Holds the access/refresh token pair, exchanges the refresh token for a
//! new access token when asked, and persists rotations through an injected
//! [`TokenStore`]. The initial authorization (user consent) happens out of
//! band; this module only keeps an already-granted credential alive.

use anyhow::{Context, Result};
use base64::prelude::*;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::util;

/// Spotify's token endpoint. Tests point the store at a local stub instead.
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// An access/refresh token pair as granted by the accounts service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds when the access token lapses, if the grant said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    /// Seed a credential from a refresh token alone; the first refresh
    /// fills in the access token.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| util::now_unix() >= at)
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no refresh token on hand; complete the authorization flow first")]
    MissingRefreshToken,
    #[error("token endpoint rejected the refresh (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("token endpoint unreachable")]
    Transport(#[source] Box<ureq::Error>),
    #[error("token response was not understood")]
    Malformed(#[source] Box<ureq::Error>),
    #[error("still unauthorized after refreshing the access token")]
    StillUnauthorized,
}

/// Where credentials live between runs. Injected so tests can keep them in
/// memory and the daemon can keep them in a file.
pub trait TokenStore {
    fn save(&self, credential: &Credential) -> Result<()>;
    fn load(&self) -> Result<Option<Credential>>;
}

/// JSON file persistence, the daemon's default.
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for TokenFile {
    fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(credential)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let credential = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed credential file {}", self.path.display()))?;
        Ok(Some(credential))
    }
}

/// Deserialized shape of a token grant. Spotify rotates the refresh token
/// only sometimes, so that field is optional.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Owns the current credential and knows how to renew it.
pub struct CredentialStore {
    agent: ureq::Agent,
    token_url: String,
    client_id: String,
    client_secret: String,
    store: Box<dyn TokenStore + Send>,
    credential: Option<Credential>,
    stale: bool,
}

impl CredentialStore {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        store: Box<dyn TokenStore + Send>,
    ) -> Self {
        Self::with_token_url(client_id, client_secret, store, TOKEN_URL)
    }

    pub fn with_token_url(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        store: Box<dyn TokenStore + Send>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            agent: util::http_agent(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            store,
            credential: None,
            stale: false,
        }
    }

    /// Pull a previously persisted credential. `false` means none exists.
    pub fn load_persisted(&mut self) -> Result<bool> {
        match self.store.load()? {
            Some(credential) => {
                debug!("loaded stored credential");
                self.credential = Some(credential);
                self.stale = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Adopt a credential obtained out of band and persist it.
    pub fn initialize(&mut self, credential: Credential) {
        if let Err(e) = self.store.save(&credential) {
            warn!("could not persist credential: {e:#}");
        }
        self.credential = Some(credential);
        self.stale = false;
    }

    /// Whether the current access token is worth sending.
    pub fn is_usable(&self) -> bool {
        !self.stale
            && self
                .credential
                .as_ref()
                .is_some_and(|c| !c.access_token.is_empty())
    }

    /// Flag the current access token as rejected. Cleared by a successful
    /// [`CredentialStore::refresh`].
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credential
            .as_ref()
            .map(|c| c.access_token.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Exchange the refresh token for a fresh access token.
    ///
    /// On success the new pair replaces the old one and is persisted once.
    /// A grant without a rotated refresh token keeps the previous one. Any
    /// failure leaves the store unusable and persists nothing, so a broken
    /// grant can never clobber the last good credential on disk.
    pub fn refresh(&mut self) -> Result<Credential, AuthError> {
        self.stale = true;
        let refresh_token = match &self.credential {
            Some(c) if !c.refresh_token.is_empty() => c.refresh_token.clone(),
            _ => return Err(AuthError::MissingRefreshToken),
        };

        debug!("refreshing access token via {}", self.token_url);
        let basic = BASE64_STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let mut response = self
            .agent
            .post(&self.token_url)
            .header("Authorization", &format!("Basic {basic}"))
            .send_form([
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .map_err(|e| AuthError::Transport(Box::new(e)))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            warn!("token refresh rejected with status {status}");
            return Err(AuthError::Rejected { status, body });
        }

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| AuthError::Malformed(Box::new(e)))?;

        let credential = Credential {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or(refresh_token),
            expires_at: token.expires_in.map(|secs| util::now_unix() + secs),
        };
        if let Err(e) = self.store.save(&credential) {
            warn!("refreshed credential not persisted: {e:#}");
        }
        info!("access token refreshed");
        self.credential = Some(credential.clone());
        self.stale = false;
        Ok(credential)
    }
}
