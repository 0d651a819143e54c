//! Startup credential verification.
//!
//! A [`Session`] is resolved once per process. Until it is
//! [`SessionState::Verified`], nothing else should talk to the backend.

use std::fmt::{Display, Formatter};

use log::{debug, info, warn};
use url::Url;

use crate::api::{AuthApi, TokenResponse};
use crate::error::{Error, Result};

pub mod store;

pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

pub const TOKEN_QUERY_PARAM: &str = "token";

pub const MSG_TOKEN_FAILED: &str = "Token verification failed";
pub const MSG_INVALID_TOKEN: &str = "Invalid access token";
pub const MSG_SESSION_EXPIRED: &str = "Session expired. Please login again.";
pub const MSG_NO_TOKEN: &str = "No token provided";

const TRUSTED_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum SessionState {
    #[default]
    Verifying,
    Verified,
    Rejected {
        message: String,
    },
}

impl SessionState {
    #[inline]
    pub fn is_verified(&self) -> bool {
        matches!(self, SessionState::Verified)
    }

    fn rejected(err: Option<&Error>, fallback: &str) -> Self {
        let message = err
            .and_then(Error::server_message)
            .unwrap_or(fallback)
            .to_string();
        SessionState::Rejected { message }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Verifying => write!(f, "verifying"),
            SessionState::Verified => write!(f, "verified"),
            SessionState::Rejected { message } => write!(f, "{message}"),
        }
    }
}

/// Where the client was launched from: an optional URL that may carry a
/// one-time token, and whether the launch context is trusted.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LaunchContext {
    url: Option<Url>,
    trusted: bool,
}

impl LaunchContext {
    pub fn new(url: Option<Url>, trusted: bool) -> Self {
        Self { url, trusted }
    }

    /// Parses `url`. Launches from a local development host are trusted.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let trusted = url
            .host_str()
            .map(|h| TRUSTED_HOSTS.contains(&h))
            .unwrap_or(false);
        Ok(Self {
            url: Some(url),
            trusted,
        })
    }

    #[must_use]
    pub fn trusted(mut self, trusted: bool) -> Self {
        self.trusted |= trusted;
        self
    }

    #[inline]
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    #[inline]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn token(&self) -> Option<String> {
        self.url.as_ref().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == TOKEN_QUERY_PARAM)
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
        })
    }

    /// Removes the token from the launch URL, leaving other query parameters.
    pub fn strip_token(&mut self) {
        let Some(url) = self.url.as_mut() else {
            return;
        };
        let kept = url
            .query_pairs()
            .filter(|(k, _)| k != TOKEN_QUERY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect::<Vec<_>>();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Resolves the session. Only the first call talks to `auth`; later
    /// calls return the state already reached.
    pub fn resolve(
        &mut self,
        auth: &dyn AuthApi,
        store: &mut dyn CredentialStore,
        launch: &mut LaunchContext,
    ) -> &SessionState {
        if self.state == SessionState::Verifying {
            self.state = verify(auth, store, launch);
            match &self.state {
                SessionState::Rejected { message } => warn!("session rejected: {message}"),
                state => info!("session {state}"),
            }
        }
        &self.state
    }
}

fn verify(
    auth: &dyn AuthApi,
    store: &mut dyn CredentialStore,
    launch: &mut LaunchContext,
) -> SessionState {
    if launch.is_trusted() {
        debug!("trusted launch; skipping token verification");
        return SessionState::Verified;
    }

    if let Some(token) = launch.token() {
        return match exchange(auth.verify_token(&token), store) {
            Ok(()) => {
                launch.strip_token();
                SessionState::Verified
            }
            Err(e) => SessionState::rejected(Some(&e), MSG_TOKEN_FAILED),
        };
    }

    let stored = match store.load() {
        Ok(stored) => stored,
        Err(e) => {
            warn!("could not read stored credential: {e}");
            None
        }
    };
    let Some(credential) = stored else {
        return SessionState::rejected(None, MSG_NO_TOKEN);
    };

    match auth.verify_token(&credential) {
        Ok(_) => SessionState::Verified,
        Err(e) if e.is_unauthorized() => {
            debug!("stored credential expired; refreshing");
            match exchange(auth.refresh(), store) {
                Ok(()) => SessionState::Verified,
                Err(e) => {
                    debug!("refresh failed: {e}");
                    SessionState::rejected(None, MSG_SESSION_EXPIRED)
                }
            }
        }
        Err(e) => SessionState::rejected(Some(&e), MSG_INVALID_TOKEN),
    }
}

/// Persists the credential returned by a successful exchange.
fn exchange(res: Result<TokenResponse>, store: &mut dyn CredentialStore) -> Result<()> {
    let token = res?
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MalformedResponse("missing access_token".to_string()))?;
    store.store(&token)
}
