//! Error types and conversions
//!
//! Every variant carries enough detail to be logged or shown verbatim.
//! Cancellation and timeout are deliberately absent: they are normal
//! outcomes of an authorization attempt, not errors, and are modeled as
//! `AuthOutcome::Cancelled` by the flow layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Secure random generation failed: {0}")]
    RandomGeneration(String),

    #[error("Hash computation failed: {0}")]
    Hash(String),

    #[error("Failed to bind loopback listener: {0}")]
    SocketBind(#[source] std::io::Error),

    #[error("Failed to accept callback connection: {0}")]
    SocketAccept(#[source] std::io::Error),

    #[error("Callback protocol error: {0}")]
    Protocol(String),

    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Token exchange failed with status {status}: {body}")]
    Exchange { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for String {
    fn from(err: AuthError) -> String {
        err.to_string()
    }
}
