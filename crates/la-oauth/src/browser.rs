//! System browser launching

use la_types::{AuthError, AuthResult};
use tracing::debug;

/// Hands an authorization URL to a browser.
///
/// Fire-and-forget: a launcher knows whether the handler was invoked, never
/// whether the browser session succeeds. Tests substitute a fake that
/// connects to the loopback listener directly.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// Opens URLs with the OS default handler
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        debug!("Opening system browser for authorization");
        open::that(url).map_err(|e| AuthError::BrowserLaunch(e.to_string()))
    }
}
