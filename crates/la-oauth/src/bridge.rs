//! Authorization flow orchestrator
//!
//! Ties PKCE generation, the loopback listener, and the browser launcher into
//! a single one-shot asynchronous operation. Each call to
//! [`AuthBridge::authenticate`] is one attempt; the bridge carries no state
//! from one attempt to the next, and never retries on any failure.

use std::time::Duration;

use la_types::{AuthError, AuthResult};
use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::callback_server::{CallbackListener, CallbackOutcome, CancelHandle};
use crate::pkce::generate_pkce_challenge;
use crate::types::{AuthOutcome, AuthRequest, AuthorizedGrant};

/// Lifecycle of one authorization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Idle,
    AwaitingRedirect,
    Succeeded,
    Cancelled,
    Failed,
}

/// Snapshot of the attempt currently (or last) driven by the bridge
#[derive(Debug, Clone, Copy)]
pub struct Attempt {
    pub id: Uuid,
    pub phase: AttemptPhase,
}

/// Orchestrates the loopback authorization code flow.
///
/// Generic over the browser launcher so tests can drive the flow without a
/// real browser; production code uses [`AuthBridge::new`] and the system
/// handler.
pub struct AuthBridge<B: BrowserLauncher = SystemBrowser> {
    browser: B,

    /// Observable phase of the in-flight attempt, for logging/UI polling
    attempt: Mutex<Option<Attempt>>,

    /// Cancel handle for the most recent attempt's listener, keyed by the
    /// attempt it belongs to so a finishing attempt never drops a newer one's
    /// handle
    cancel: Mutex<Option<(Uuid, CancelHandle)>>,
}

impl AuthBridge<SystemBrowser> {
    pub fn new() -> Self {
        Self::with_browser(SystemBrowser)
    }
}

impl Default for AuthBridge<SystemBrowser> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BrowserLauncher> AuthBridge<B> {
    pub fn with_browser(browser: B) -> Self {
        Self {
            browser,
            attempt: Mutex::new(None),
            cancel: Mutex::new(None),
        }
    }

    /// Phase of the current or most recent attempt
    pub fn current_attempt(&self) -> Option<Attempt> {
        *self.attempt.lock()
    }

    /// Cancel the most recent in-flight attempt, if any. The listener socket
    /// closes early and `authenticate` resolves to
    /// [`AuthOutcome::Cancelled`].
    ///
    /// When attempts overlap on one bridge, only the newest is cancellable
    /// here; a superseded attempt keeps running to its own deadline.
    pub fn cancel(&self) {
        if let Some((_, handle)) = self.cancel.lock().take() {
            handle.cancel();
        }
    }

    /// Drop the stored cancel handle, but only if it still belongs to the
    /// finishing attempt.
    fn clear_cancel(&self, id: Uuid) {
        let mut slot = self.cancel.lock();
        if slot.as_ref().is_some_and(|(owner, _)| *owner == id) {
            slot.take();
        }
    }

    /// Run one authorization attempt end to end.
    ///
    /// Generates a PKCE pair, binds the loopback listener, opens the browser
    /// on the fully-formed authorization URL, and awaits the redirect. An
    /// `error` callback parameter resolves as `Err(AuthError::Protocol)`
    /// carrying the provider's message; timeout and explicit cancel resolve
    /// as `Ok(AuthOutcome::Cancelled)`.
    pub async fn authenticate(&self, request: &AuthRequest) -> AuthResult<AuthOutcome> {
        let attempt_id = Uuid::new_v4();
        self.set_phase(attempt_id, AttemptPhase::Idle);
        info!("Starting authorization attempt {}", attempt_id);

        let result = self.run_attempt(attempt_id, request).await;

        // The attempt is over; its cancel handle must not outlive it.
        self.clear_cancel(attempt_id);

        let phase = match &result {
            Ok(AuthOutcome::Authorized(_)) => AttemptPhase::Succeeded,
            Ok(AuthOutcome::Cancelled) => AttemptPhase::Cancelled,
            Err(_) => AttemptPhase::Failed,
        };
        self.set_phase(attempt_id, phase);

        match &result {
            Ok(AuthOutcome::Authorized(_)) => {
                info!("Attempt {} received authorization code", attempt_id)
            }
            Ok(AuthOutcome::Cancelled) => {
                info!("Attempt {} cancelled or timed out", attempt_id)
            }
            Err(e) => error!("Attempt {} failed: {}", attempt_id, e),
        }

        result
    }

    async fn run_attempt(
        &self,
        attempt_id: Uuid,
        request: &AuthRequest,
    ) -> AuthResult<AuthOutcome> {
        let pkce = generate_pkce_challenge()?;

        let mut listener = CallbackListener::bind(request.timeout).await?;
        *self.cancel.lock() = listener.cancel_handle().map(|handle| (attempt_id, handle));

        let redirect_uri = format!("http://127.0.0.1:{}/callback", listener.port());
        let auth_url = build_authorization_url(request, &redirect_uri, &pkce.code_challenge);

        self.browser.open(&auth_url)?;
        self.set_phase(attempt_id, AttemptPhase::AwaitingRedirect);

        match listener.wait().await? {
            CallbackOutcome::Received(callback) => {
                if let Some(error) = callback.error() {
                    let detail = match callback.error_description() {
                        Some(description) => format!("{}: {}", error, description),
                        None => error.to_string(),
                    };
                    warn!("Provider returned error for attempt {}: {}", attempt_id, detail);
                    return Err(AuthError::Protocol(format!(
                        "authorization server returned {}",
                        detail
                    )));
                }

                let code = callback
                    .code()
                    .ok_or_else(|| {
                        AuthError::Protocol(
                            "callback carried neither code nor error".to_string(),
                        )
                    })?
                    .to_string();

                Ok(AuthOutcome::Authorized(AuthorizedGrant {
                    code,
                    code_verifier: pkce.code_verifier,
                    redirect_uri,
                    callback,
                }))
            }
            CallbackOutcome::TimedOut | CallbackOutcome::Cancelled => {
                Ok(AuthOutcome::Cancelled)
            }
        }
    }

    /// Capture the raw redirect and hand it back as a custom-scheme URL.
    ///
    /// Thin variant of [`authenticate`](Self::authenticate) for callers that
    /// do their own parameter handling: only `redirect_uri` is appended to
    /// `auth_url`, and the captured query string is reassembled as
    /// `{scheme}://callback?{query}`. Returns `None` on timeout or cancel;
    /// socket and protocol failures are errors, never coerced to `None`.
    pub async fn capture_redirect(
        &self,
        auth_url: &str,
        callback_scheme: &str,
        timeout: Duration,
    ) -> AuthResult<Option<String>> {
        let capture_id = Uuid::new_v4();
        let mut listener = CallbackListener::bind(timeout).await?;
        *self.cancel.lock() = listener.cancel_handle().map(|handle| (capture_id, handle));

        let redirect_uri = format!("http://127.0.0.1:{}/callback", listener.port());
        let separator = if auth_url.contains('?') { '&' } else { '?' };
        let full_url = format!(
            "{}{}redirect_uri={}",
            auth_url,
            separator,
            urlencoding::encode(&redirect_uri)
        );

        if let Err(e) = self.browser.open(&full_url) {
            self.clear_cancel(capture_id);
            return Err(e);
        }

        // The handle is cleared before any early return, so a failed wait
        // cannot leave a stale handle behind.
        let waited = listener.wait().await;
        self.clear_cancel(capture_id);

        match waited? {
            CallbackOutcome::Received(callback) => Ok(Some(format!(
                "{}://callback?{}",
                callback_scheme,
                callback.raw_query()
            ))),
            CallbackOutcome::TimedOut | CallbackOutcome::Cancelled => Ok(None),
        }
    }

    fn set_phase(&self, id: Uuid, phase: AttemptPhase) {
        *self.attempt.lock() = Some(Attempt { id, phase });
    }
}

/// Append the flow's parameters to the authorization endpoint URL, handling
/// templates that already carry a query string.
fn build_authorization_url(request: &AuthRequest, redirect_uri: &str, code_challenge: &str) -> String {
    let separator = if request.auth_url.contains('?') { '&' } else { '?' };

    let mut url = format!(
        "{}{}redirect_uri={}&code_challenge={}&code_challenge_method=S256&response_type=code&client_id={}",
        request.auth_url,
        separator,
        urlencoding::encode(redirect_uri),
        urlencoding::encode(code_challenge),
        urlencoding::encode(&request.client_id),
    );

    if !request.scopes.is_empty() {
        let scopes = request.scopes.join(" ");
        url.push_str(&format!("&scope={}", urlencoding::encode(&scopes)));
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request() -> AuthRequest {
        AuthRequest::new("https://example.com/authorize", "test_client")
            .with_scopes(vec!["read".to_string(), "write".to_string()])
    }

    #[test]
    fn test_build_authorization_url() {
        let url = build_authorization_url(
            &test_request(),
            "http://127.0.0.1:8080/callback",
            "test_challenge",
        );

        assert!(url.starts_with("https://example.com/authorize?"));
        assert!(url.contains("client_id=test_client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("code_challenge=test_challenge"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2Fcallback"));
        assert!(url.contains("scope=read%20write"));
    }

    #[test]
    fn test_build_authorization_url_template_with_query() {
        let mut request = test_request();
        request.auth_url = "https://example.com/authorize?audience=api".to_string();

        let url = build_authorization_url(&request, "http://127.0.0.1:8080/callback", "c");

        // Parameters append with & when the template already has a query
        assert!(url.contains("audience=api&redirect_uri="));
    }

    #[test]
    fn test_build_authorization_url_no_scopes() {
        let mut request = test_request();
        request.scopes.clear();

        let url = build_authorization_url(&request, "http://127.0.0.1:8080/callback", "c");

        assert!(!url.contains("scope="));
    }

    #[test]
    fn test_bridge_starts_with_no_attempt() {
        let bridge = AuthBridge::new();
        assert!(bridge.current_attempt().is_none());
    }
}
