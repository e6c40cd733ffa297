//! One-shot loopback HTTP listener for the browser redirect
//!
//! Binds an ephemeral port on `127.0.0.1`, accepts exactly one connection,
//! parses the request line of a minimal `GET /callback?...` request, writes a
//! fixed confirmation page, and delivers the decoded query parameters through
//! a oneshot channel. One listener serves exactly one authorization attempt.

use std::time::Duration;

use la_types::{AuthError, AuthResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::types::CallbackRequest;

/// Default bound on how long the listener waits for the redirect
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Cap on the bytes read from the callback connection. The request line of a
/// real redirect is a few hundred bytes; anything larger is rejected.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Confirmation page sent to the browser before the socket is torn down,
/// whether or not the request parsed.
const CONFIRMATION_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/html\r\n\
Connection: close\r\n\r\n\
<html><body><p>Authentication complete. You may close this tab.</p>\
<script>window.close()</script></body></html>";

/// How the listener resolved
#[derive(Debug)]
pub enum CallbackOutcome {
    /// The redirect arrived and parsed
    Received(CallbackRequest),

    /// No connection arrived before the deadline
    TimedOut,

    /// The attempt was cancelled before a connection arrived
    Cancelled,
}

/// Closes the listening socket early and resolves the attempt as cancelled
pub struct CancelHandle(oneshot::Sender<()>);

impl CancelHandle {
    pub fn cancel(self) {
        // Receiver gone means the listener already resolved; nothing to do.
        let _ = self.0.send(());
    }
}

/// A bound loopback listener for one authorization attempt.
///
/// The accept-and-parse sequence runs on a spawned task so the caller's task
/// is never blocked; the oneshot result channel is the only cross-task
/// interaction point and resolves exactly once. Dropping the listener without
/// calling [`wait`](Self::wait) releases the socket.
pub struct CallbackListener {
    port: u16,
    result_rx: oneshot::Receiver<AuthResult<CallbackOutcome>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:0` and start listening in the background.
    ///
    /// The OS-assigned port is available immediately via [`port`](Self::port)
    /// so the redirect URI can be built before the browser is opened.
    pub async fn bind(timeout: Duration) -> AuthResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(AuthError::SocketBind)?;
        let port = listener
            .local_addr()
            .map_err(AuthError::SocketBind)?
            .port();

        debug!("Callback listener bound on 127.0.0.1:{}", port);

        let (result_tx, result_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(run_listener(listener, timeout, result_tx, cancel_rx));

        Ok(Self {
            port,
            result_rx,
            cancel_tx: Some(cancel_tx),
        })
    }

    /// The ephemeral port the listener is bound to
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Take the cancel handle for this attempt. Returns `None` if already
    /// taken.
    pub fn cancel_handle(&mut self) -> Option<CancelHandle> {
        self.cancel_tx.take().map(CancelHandle)
    }

    /// Resolve once: the parsed callback, a timeout/cancel, or a hard error.
    pub async fn wait(self) -> AuthResult<CallbackOutcome> {
        match self.result_rx.await {
            Ok(outcome) => outcome,
            // The listener task never drops the sender without resolving; a
            // closed channel means the runtime tore the task down.
            Err(_) => Err(AuthError::Protocol(
                "callback listener task ended without resolving".to_string(),
            )),
        }
    }
}

/// Background accept-and-parse sequence. Resolves the result channel exactly
/// once; the listening socket is dropped before resolution so the port is
/// already released when the caller observes the outcome.
async fn run_listener(
    listener: TcpListener,
    timeout: Duration,
    mut result_tx: oneshot::Sender<AuthResult<CallbackOutcome>>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    // Only the first connection is ever parsed. The select below runs one
    // accept; once a result is chosen the listener drops and the OS refuses
    // any later connection, so a replayed callback has no parse path.
    let accept_and_parse = async {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Callback connection from {}", peer);
                handle_connection(stream).await
            }
            Err(e) => Err(AuthError::SocketAccept(e)),
        }
    };

    // The deadline covers the whole accept-and-read sequence, so a
    // connection that never sends data cannot stall the attempt.
    let outcome = tokio::select! {
        resolved = tokio::time::timeout(timeout, accept_and_parse) => match resolved {
            Ok(outcome) => outcome,
            Err(_) => {
                info!("Callback listener timed out after {:?}", timeout);
                Ok(CallbackOutcome::TimedOut)
            }
        },
        _ = wait_for_cancel(&mut cancel_rx) => {
            info!("Callback listener cancelled");
            Ok(CallbackOutcome::Cancelled)
        }
        _ = result_tx.closed() => {
            debug!("Callback listener abandoned by caller");
            return;
        }
    };

    drop(listener);
    let _ = result_tx.send(outcome);
}

/// Resolve only on an explicit cancel message. A dropped [`CancelHandle`]
/// closes the channel without cancelling; the listener keeps waiting for its
/// timeout, so a superseded or discarded handle cannot tear down a live
/// attempt.
async fn wait_for_cancel(cancel_rx: &mut oneshot::Receiver<()>) {
    if cancel_rx.await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Read the request with a hard byte cap, answer with the confirmation page,
/// and parse the request line.
///
/// The response is written and flushed before the socket is torn down,
/// independent of whether parsing succeeded.
async fn handle_connection(mut stream: TcpStream) -> AuthResult<CallbackOutcome> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let parsed = loop {
        match stream.read(&mut chunk).await {
            Ok(0) => {
                break Err(AuthError::Protocol(
                    "connection closed before a full request line arrived".to_string(),
                ))
            }
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(line_end) = find_line_end(&buf) {
                    break parse_request_line(&buf[..line_end]);
                }
                if buf.len() > MAX_REQUEST_BYTES {
                    break Err(AuthError::Protocol(format!(
                        "callback request exceeded {} byte limit",
                        MAX_REQUEST_BYTES
                    )));
                }
            }
            Err(e) => break Err(AuthError::Io(e)),
        }
    };

    if let Err(e) = &parsed {
        warn!("Callback request rejected: {}", e);
    }

    let _ = stream.write_all(CONFIRMATION_RESPONSE.as_bytes()).await;
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;

    parsed.map(CallbackOutcome::Received)
}

/// Offset of the first line terminator, if a full line has arrived
fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n').map(|pos| {
        if pos > 0 && buf[pos - 1] == b'\r' {
            pos - 1
        } else {
            pos
        }
    })
}

/// Parse `GET /callback?<query> HTTP/1.1` into decoded parameters.
///
/// Headers and body are ignored by design. A request whose query carries
/// neither `code` nor `error` is not a callback the flow can act on.
fn parse_request_line(line: &[u8]) -> AuthResult<CallbackRequest> {
    let line = std::str::from_utf8(line)
        .map_err(|_| AuthError::Protocol("request line is not valid UTF-8".to_string()))?;

    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| AuthError::Protocol("empty request line".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| AuthError::Protocol("request line missing target".to_string()))?;
    let version = parts.next();

    if method != "GET" {
        return Err(AuthError::Protocol(format!(
            "unexpected request method: {}",
            method
        )));
    }
    if !version.is_some_and(|v| v.starts_with("HTTP/")) {
        return Err(AuthError::Protocol(format!(
            "malformed request line: {}",
            line
        )));
    }

    let query = target
        .split_once('?')
        .map(|(_, query)| query)
        .ok_or_else(|| {
            AuthError::Protocol("callback request carried no query string".to_string())
        })?;

    let request = CallbackRequest::parse_query(query);
    if request.code().is_none() && request.error().is_none() {
        return Err(AuthError::Protocol(
            "callback query carried neither code nor error".to_string(),
        ));
    }

    Ok(request)
}
