//! Types for the browser authorization flow

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::callback_server::DEFAULT_CALLBACK_TIMEOUT;

/// Configuration for one authorization attempt
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Authorization endpoint URL. May already carry query parameters; the
    /// flow appends its own with `&` in that case.
    pub auth_url: String,

    /// OAuth client identifier
    pub client_id: String,

    /// Requested scopes, space-joined into the `scope` parameter
    pub scopes: Vec<String>,

    /// Hard deadline for the redirect to arrive
    pub timeout: Duration,
}

impl AuthRequest {
    pub fn new(auth_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            scopes: Vec::new(),
            timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The single HTTP request captured by the loopback listener, reduced to its
/// decoded query parameters. Lives only for the duration of one attempt.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    params: HashMap<String, String>,
    raw_query: String,
}

impl CallbackRequest {
    /// Parse a raw query string into decoded key/value pairs.
    ///
    /// Pairs that fail percent-decoding are dropped rather than failing the
    /// whole callback; a key without `=` maps to the empty string.
    pub fn parse_query(query: &str) -> Self {
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = urlencoding::decode(key).ok()?.into_owned();
                let value = urlencoding::decode(value).ok()?.into_owned();
                Some((key, value))
            })
            .collect();

        Self {
            params,
            raw_query: query.to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn code(&self) -> Option<&str> {
        self.get("code")
    }

    pub fn error(&self) -> Option<&str> {
        self.get("error")
    }

    pub fn error_description(&self) -> Option<&str> {
        self.get("error_description")
    }

    /// The query string exactly as the browser sent it, undecoded
    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

/// Terminal result of one authorization attempt.
///
/// Hard failures (socket, crypto, protocol) are `Err(AuthError)` instead;
/// cancellation and timeout are normal outcomes the caller must branch on.
#[derive(Debug)]
pub enum AuthOutcome {
    /// The provider redirected back with an authorization code
    Authorized(AuthorizedGrant),

    /// The user never completed the flow before the deadline, or the attempt
    /// was cancelled explicitly
    Cancelled,
}

/// An authorization code paired with the verifier that proves possession.
///
/// Consumed by value by `TokenExchanger::exchange_code` so the verifier is
/// used at most once per attempt.
pub struct AuthorizedGrant {
    /// Authorization code returned by the provider
    pub code: String,

    /// PKCE code verifier generated for this attempt
    pub code_verifier: String,

    /// The exact redirect URI the code was issued against
    pub redirect_uri: String,

    /// Full decoded callback parameters (e.g. `state`)
    pub callback: CallbackRequest,
}

// The verifier stays out of Debug output; it is a secret until exchanged.
impl fmt::Debug for AuthorizedGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedGrant")
            .field("code", &self.code)
            .field("code_verifier", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("callback", &self.callback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_basic() {
        let cb = CallbackRequest::parse_query("code=abc&state=xyz");

        assert_eq!(cb.code(), Some("abc"));
        assert_eq!(cb.get("state"), Some("xyz"));
        assert_eq!(cb.error(), None);
        assert_eq!(cb.raw_query(), "code=abc&state=xyz");
    }

    #[test]
    fn test_parse_query_url_decodes_values() {
        let cb = CallbackRequest::parse_query("error=access_denied&error_description=User%20said%20no");

        assert_eq!(cb.error(), Some("access_denied"));
        assert_eq!(cb.error_description(), Some("User said no"));
        // raw query stays undecoded
        assert!(cb.raw_query().contains("%20"));
    }

    #[test]
    fn test_parse_query_key_without_value() {
        let cb = CallbackRequest::parse_query("code=abc&flag");

        assert_eq!(cb.get("flag"), Some(""));
    }

    #[test]
    fn test_parse_query_empty() {
        let cb = CallbackRequest::parse_query("");

        assert!(cb.params().is_empty());
    }

    #[test]
    fn test_authorized_grant_debug_redacts_verifier() {
        let grant = AuthorizedGrant {
            code: "abc".to_string(),
            code_verifier: "super-secret-verifier".to_string(),
            redirect_uri: "http://127.0.0.1:9999/callback".to_string(),
            callback: CallbackRequest::default(),
        };

        let debug = format!("{:?}", grant);
        assert!(!debug.contains("super-secret-verifier"));
        assert!(debug.contains("<redacted>"));
    }
}
