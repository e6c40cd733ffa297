//! Shared error types for LoopAuth

pub mod errors;

pub use errors::{AuthError, AuthResult};
