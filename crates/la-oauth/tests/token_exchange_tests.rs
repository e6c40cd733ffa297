//! Integration tests for the token exchange client
//!
//! Uses a canned-response loopback server as the token endpoint so the
//! status/body error contract can be asserted byte for byte.

use la_oauth::{AuthError, AuthorizedGrant, CallbackRequest, TokenExchanger};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one canned HTTP response on an ephemeral port
async fn spawn_token_endpoint(status_line: &'static str, body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 8192];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });

    port
}

fn test_grant() -> AuthorizedGrant {
    AuthorizedGrant {
        code: "abc".to_string(),
        code_verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
        redirect_uri: "http://127.0.0.1:9999/callback".to_string(),
        callback: CallbackRequest::default(),
    }
}

#[tokio::test]
async fn test_exchange_parses_token_set() {
    let body = r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,"refresh_token":"rt","id_token":"idt"}"#;
    let port = spawn_token_endpoint("200 OK", body).await;

    let exchanger = TokenExchanger::new();
    let tokens = exchanger
        .exchange_code(
            &format!("http://127.0.0.1:{}/token", port),
            test_grant(),
            "test_client",
        )
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "at");
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, Some(3600));
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
    assert_eq!(tokens.id_token.as_deref(), Some("idt"));
}

#[tokio::test]
async fn test_exchange_error_carries_raw_body() {
    let body = r#"{"error":"invalid_grant"}"#;
    let port = spawn_token_endpoint("400 Bad Request", body).await;

    let exchanger = TokenExchanger::new();
    let err = exchanger
        .exchange_code(
            &format!("http://127.0.0.1:{}/token", port),
            test_grant(),
            "test_client",
        )
        .await
        .unwrap_err();

    match err {
        AuthError::Exchange { status, body: got } => {
            assert_eq!(status, 400);
            // The raw response body, verbatim
            assert_eq!(got, body);
        }
        other => panic!("expected Exchange error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exchange_rejects_malformed_success_body() {
    let body = "this is not json";
    let port = spawn_token_endpoint("200 OK", body).await;

    let exchanger = TokenExchanger::new();
    let err = exchanger
        .exchange_code(
            &format!("http://127.0.0.1:{}/token", port),
            test_grant(),
            "test_client",
        )
        .await
        .unwrap_err();

    match err {
        AuthError::Exchange { status, body: got } => {
            assert_eq!(status, 200);
            assert_eq!(got, body);
        }
        other => panic!("expected Exchange error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exchange_unreachable_endpoint_is_transport_error() {
    // Bind then drop so the port is very likely unbound
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let exchanger = TokenExchanger::new();
    let err = exchanger
        .exchange_code(
            &format!("http://127.0.0.1:{}/token", port),
            test_grant(),
            "test_client",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Transport(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_refresh_token_round_trip() {
    let body = r#"{"access_token":"at2","token_type":"Bearer","expires_in":3600}"#;
    let port = spawn_token_endpoint("200 OK", body).await;

    let exchanger = TokenExchanger::new();
    let tokens = exchanger
        .refresh_token(
            &format!("http://127.0.0.1:{}/token", port),
            "rt",
            "test_client",
        )
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "at2");
}
