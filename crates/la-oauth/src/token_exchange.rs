//! Token exchange and refresh against the provider's token endpoint

use la_types::{AuthError, AuthResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::types::AuthorizedGrant;

/// Token set returned by the provider's token endpoint.
///
/// Immutable once received; ownership passes to the caller, who decides any
/// persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token
    pub access_token: String,

    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: String,

    /// Expires in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Refresh token (optional)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// OpenID Connect identity token (optional)
    #[serde(default)]
    pub id_token: Option<String>,

    /// Granted scope (optional)
    #[serde(default)]
    pub scope: Option<String>,
}

/// Performs the server-to-server half of the authorization code flow
pub struct TokenExchanger {
    client: Client,
}

impl Default for TokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenExchanger {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Consumes the grant: the code verifier is sent exactly once. A non-2xx
    /// response, or a 2xx response whose body is not valid token JSON, yields
    /// [`AuthError::Exchange`] carrying the status and the raw body verbatim.
    pub async fn exchange_code(
        &self,
        token_url: &str,
        grant: AuthorizedGrant,
        client_id: &str,
    ) -> AuthResult<TokenSet> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("grant_type", "authorization_code"),
            ("code", grant.code.as_str()),
            ("redirect_uri", grant.redirect_uri.as_str()),
            ("client_id", client_id),
            ("code_verifier", grant.code_verifier.as_str()),
        ];

        self.post_token_request(token_url, &params).await
    }

    /// Obtain a fresh token set from a refresh token.
    ///
    /// Same error contract as [`exchange_code`](Self::exchange_code). When
    /// and whether to refresh is the caller's policy.
    pub async fn refresh_token(
        &self,
        token_url: &str,
        refresh_token: &str,
        client_id: &str,
    ) -> AuthResult<TokenSet> {
        info!("Refreshing access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];

        self.post_token_request(token_url, &params).await
    }

    async fn post_token_request(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
    ) -> AuthResult<TokenSet> {
        let response = self
            .client
            .post(token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(format!("token request failed to send: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(format!("failed to read token response: {}", e)))?;

        if !status.is_success() {
            error!("Token request failed with status {}: {}", status, body);
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<TokenSet>(&body) {
            Ok(tokens) => Ok(tokens),
            Err(e) => {
                error!("Token endpoint returned unparsable body: {}", e);
                Err(AuthError::Exchange {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_set_deserializes_full_response() {
        let body = r#"{
            "access_token": "at",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "id_token": "idt",
            "scope": "openid profile"
        }"#;

        let tokens: TokenSet = serde_json::from_str(body).unwrap();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, Some(3600));
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(tokens.id_token.as_deref(), Some("idt"));
        assert_eq!(tokens.scope.as_deref(), Some("openid profile"));
    }

    #[test]
    fn test_token_set_optional_fields_default() {
        let tokens: TokenSet = serde_json::from_str(r#"{"access_token": "at"}"#).unwrap();

        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.token_type, "");
        assert!(tokens.expires_in.is_none());
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.id_token.is_none());
    }

    #[test]
    fn test_token_set_rejects_missing_access_token() {
        assert!(serde_json::from_str::<TokenSet>(r#"{"token_type": "Bearer"}"#).is_err());
    }
}
