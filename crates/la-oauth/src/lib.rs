//! OAuth 2.0 loopback-redirect browser flow with PKCE
//!
//! Obtains a third-party identity credential through the authorization code
//! flow for native applications: a PKCE pair is generated, the system browser
//! is opened on the provider's authorization URL, the redirect is captured by
//! a one-shot HTTP listener on the loopback interface, and the authorization
//! code is exchanged for tokens over a server-to-server POST.
//!
//! # Features
//! - OAuth 2.0 Authorization Code Flow with PKCE (S256)
//! - One-shot loopback callback listener on an ephemeral port
//! - Hard flow timeout and explicit cancellation
//! - Token exchange and refresh with full diagnostic payloads on failure
//! - Pluggable browser launcher for testing
//!
//! # Usage Example
//! ```no_run
//! use la_oauth::{AuthBridge, AuthOutcome, AuthRequest, TokenExchanger};
//!
//! # async fn run() -> la_types::AuthResult<()> {
//! let bridge = AuthBridge::new();
//! let request = AuthRequest::new("https://example.com/authorize", "my-client-id")
//!     .with_scopes(vec!["openid".to_string(), "profile".to_string()]);
//!
//! match bridge.authenticate(&request).await? {
//!     AuthOutcome::Authorized(grant) => {
//!         let exchanger = TokenExchanger::new();
//!         let tokens = exchanger
//!             .exchange_code("https://example.com/token", grant, "my-client-id")
//!             .await?;
//!         // tokens.access_token, tokens.id_token, ...
//!     }
//!     AuthOutcome::Cancelled => {
//!         // user closed the browser tab or the flow timed out
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod browser;
pub mod callback_server;
pub mod pkce;
pub mod token_exchange;
pub mod types;

// Re-export public API
pub use bridge::{Attempt, AttemptPhase, AuthBridge};
pub use browser::{BrowserLauncher, SystemBrowser};
pub use callback_server::{
    CallbackListener, CallbackOutcome, CancelHandle, DEFAULT_CALLBACK_TIMEOUT,
};
pub use la_types::{AuthError, AuthResult};
pub use pkce::{
    generate_code_verifier, generate_pkce_challenge, sha256_base64url, PkceChallenge,
};
pub use token_exchange::{TokenExchanger, TokenSet};
pub use types::{AuthOutcome, AuthRequest, AuthorizedGrant, CallbackRequest};
