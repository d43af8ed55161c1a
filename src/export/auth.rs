//! Authorization code flow with a one-shot local callback listener.
//!
//! The user opens the authorize URL in a browser; the browser is redirected
//! to `redirect_uri`, which must point at this machine. The listener picks the
//! code out of that request and the code is traded for an access token.

use std::{
    net::SocketAddr,
    sync::{Mutex, mpsc},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use reqwest::Url;
use rouille::{Request, Response};
use serde::Deserialize;
use thiserror::Error;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Read access to the library and to private and collaborative playlists
pub const SCOPES: &str = "user-library-read playlist-read-private playlist-read-collaborative";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATE_LEN: usize = 16;

const CALLBACK_PAGE: &str = "<!doctype html><html><body>\
<p>playlist-dl is authorized. You can close this tab.</p></body></html>";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid redirect URI {uri}: {reason}")]
    RedirectUri { uri: String, reason: String },

    #[error("cannot listen for the authorization callback on {addr}: {reason}")]
    Listen { addr: String, reason: String },

    #[error("authorization was not completed within {0:?}")]
    Timeout(Duration),

    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("authorization callback carried an unexpected state")]
    StateMismatch,

    #[error("authorization callback carried no code")]
    MissingCode,

    #[error("token request failed: {0}")]
    Token(String),
}

/// Bearer token for API calls. Not printed by `Debug`.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct OAuthFlow {
    client_id: String,
    client_secret: String,
    authorize: Url,
    redirect: Url,
    timeout: Duration,
}

impl OAuthFlow {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let invalid = |reason: String| AuthError::RedirectUri {
            uri: redirect_uri.to_string(),
            reason,
        };
        let redirect = Url::parse(redirect_uri).map_err(|e| invalid(e.to_string()))?;
        if redirect.scheme() != "http" || redirect.host_str().is_none() {
            return Err(invalid(
                "the callback listener needs an http:// address with a host".to_string(),
            ));
        }
        let authorize = Url::parse(AUTHORIZE_URL).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            client_id,
            client_secret,
            authorize,
            redirect,
            timeout,
        })
    }

    pub fn authorize_url(&self, state: &str) -> Url {
        let mut url = self.authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.redirect.as_str())
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        url
    }

    /// `host:port` of the redirect URI
    fn listen_addr(&self) -> String {
        let host = self.redirect.host_str().unwrap_or("127.0.0.1");
        let port = self.redirect.port_or_known_default().unwrap_or(80);
        format!("{host}:{port}")
    }

    /// Waits for the user to approve access, then fetches the access token.
    /// `on_url` receives the authorize URL once the listener is up.
    pub fn authorize(&self, on_url: impl FnOnce(&Url)) -> Result<AccessToken, AuthError> {
        let state = new_state();
        let url = self.authorize_url(&state);
        let code = wait_for_callback(
            &self.listen_addr(),
            self.redirect.path(),
            &state,
            self.timeout,
            |addr| {
                debug!("listening for the authorization callback on {addr}");
                on_url(&url);
            },
        )?;
        info!("authorization granted, requesting access token");
        self.exchange(&code)
    }

    fn exchange(&self, code: &str) -> Result<AccessToken, AuthError> {
        let response = reqwest::blocking::Client::new()
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect.as_str()),
            ])
            .send()
            .map_err(|e| AuthError::Token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AuthError::Token(format!("{status}: {}", body.trim())));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Token(format!("unexpected token response: {e}")))?;
        Ok(AccessToken::new(token.access_token))
    }
}

/// Query parameters of the redirect request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl Callback {
    fn into_code(self, expected_state: &str) -> Result<String, AuthError> {
        if let Some(error) = self.error {
            return Err(AuthError::Denied(error));
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateMismatch);
        }
        self.code
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingCode)
    }
}

/// Serves `path` on `addr` until the first redirect arrives or `timeout`
/// passes, and returns the authorization code it carried. Other paths get a
/// 404. `on_ready` runs once the socket is bound.
pub fn wait_for_callback(
    addr: &str,
    path: &str,
    expected_state: &str,
    timeout: Duration,
    on_ready: impl FnOnce(SocketAddr),
) -> Result<String, AuthError> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let path = path.to_string();

    let server = rouille::Server::new(addr, move |request: &Request| {
        debug!("{} {}", request.method(), request.url());
        if request.url() != path {
            return Response::empty_404();
        }
        let callback = Callback {
            code: request.get_param("code"),
            state: request.get_param("state"),
            error: request.get_param("error"),
        };
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(callback);
        }
        Response::html(CALLBACK_PAGE)
    })
    .map_err(|e| AuthError::Listen {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;

    on_ready(server.server_addr());

    let deadline = Instant::now() + timeout;
    loop {
        server.poll_timeout(POLL_INTERVAL);
        if let Ok(callback) = rx.try_recv() {
            return callback.into_code(expected_state);
        }
        if Instant::now() >= deadline {
            return Err(AuthError::Timeout(timeout));
        }
    }
}

/// Unguessable per-run value echoed back by the redirect
fn new_state() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seed = format!("{}:{nanos}", std::process::id());
    blake3::hash(seed.as_bytes()).to_hex().as_str()[..STATE_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(redirect: &str) -> Result<OAuthFlow, AuthError> {
        OAuthFlow::new(
            "client".into(),
            "secret".into(),
            redirect,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_authorize_url_carries_request() -> anyhow::Result<()> {
        let flow = flow("http://127.0.0.1:8888/callback")?;

        let url = flow.authorize_url("xyz");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(url.as_str().starts_with(AUTHORIZE_URL));
        assert!(pairs.contains(&("client_id".into(), "client".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://127.0.0.1:8888/callback".into()
        )));
        assert!(pairs.contains(&("scope".into(), SCOPES.into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
        assert_eq!(flow.listen_addr(), "127.0.0.1:8888");

        Ok(())
    }

    #[test]
    fn test_redirect_uri_must_be_local_http() {
        assert!(matches!(
            flow("https://example.com/callback"),
            Err(AuthError::RedirectUri { .. })
        ));
        assert!(matches!(flow("not a url"), Err(AuthError::RedirectUri { .. })));
        assert!(flow("http://localhost:8888/callback").is_ok());
    }

    #[test]
    fn test_callback_checks_state_and_error() {
        let ok = Callback {
            code: Some("abc".into()),
            state: Some("s1".into()),
            error: None,
        };
        assert_eq!(ok.clone().into_code("s1").unwrap(), "abc");
        assert!(matches!(ok.into_code("other"), Err(AuthError::StateMismatch)));

        let denied = Callback {
            error: Some("access_denied".into()),
            state: Some("s1".into()),
            ..Default::default()
        };
        assert!(matches!(denied.into_code("s1"), Err(AuthError::Denied(e)) if e == "access_denied"));

        let empty = Callback {
            code: Some(String::new()),
            state: Some("s1".into()),
            error: None,
        };
        assert!(matches!(empty.into_code("s1"), Err(AuthError::MissingCode)));
    }

    #[test]
    fn test_listener_returns_code_from_redirect() -> anyhow::Result<()> {
        let code = wait_for_callback(
            "127.0.0.1:0",
            "/callback",
            "s1",
            Duration::from_secs(20),
            |addr| {
                std::thread::spawn(move || {
                    // unrelated paths do not end the wait
                    let _ = reqwest::blocking::get(format!("http://{addr}/favicon.ico"));
                    let _ = reqwest::blocking::get(format!(
                        "http://{addr}/callback?code=abc&state=s1"
                    ));
                });
            },
        )?;

        assert_eq!(code, "abc");
        Ok(())
    }

    #[test]
    fn test_listener_times_out() {
        let result = wait_for_callback(
            "127.0.0.1:0",
            "/callback",
            "s1",
            Duration::from_millis(200),
            |_| {},
        );

        assert!(matches!(result, Err(AuthError::Timeout(_))));
    }

    #[test]
    fn test_state_is_hex() {
        let state = new_state();
        assert_eq!(state.len(), STATE_LEN);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_is_not_printed() {
        let token = AccessToken::new("BQD-very-secret");
        assert_eq!(format!("{token:?}"), "AccessToken(..)");
        assert_eq!(token.secret(), "BQD-very-secret");
    }
}
