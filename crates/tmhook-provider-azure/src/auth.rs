// Bearer tokens for the ARM API.
//
// Either a pre-issued token passed in from the environment, or a service
// principal using the OAuth2 client-credentials grant. Issued tokens are
// kept until shortly before they expire.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tmhook_core::{Error, Result};
use tokio::sync::Mutex;

pub(crate) const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub(crate) const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens are refreshed this long before their reported expiry
const REFRESH_MARGIN_SECS: i64 = 300;

/// Where tokens come from
#[derive(Clone)]
pub enum Credential {
    /// A token issued elsewhere, used as-is
    Static(String),
    /// Service principal (client-credentials grant)
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Static(_) => f.debug_tuple("Static").field(&"<REDACTED>").finish(),
            Credential::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<REDACTED>")
                .finish(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    /// `expires_in` arrives as a number or a numeric string
    fn expires_in_secs(&self) -> i64 {
        match &self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(3600),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(3600),
            _ => 3600,
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

pub(crate) struct TokenSource {
    credential: Credential,
    authority: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credential: Credential, authority: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            credential,
            authority: authority.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least the refresh margin
    pub async fn token(&self) -> Result<String> {
        let (tenant_id, client_id, client_secret) = match &self.credential {
            Credential::Static(token) => return Ok(token.clone()),
            Credential::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => (tenant_id, client_id, client_secret),
        };

        // Held across the request so concurrent callers share one refresh
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        tracing::debug!(tenant_id = %tenant_id, client_id = %client_id, "Requesting ARM access token");

        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, tenant_id);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", ARM_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| Error::http(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 | 403 => Error::auth(format!(
                    "token request rejected ({}): {}",
                    status,
                    oauth_error_description(&body)
                )),
                429 => Error::rate_limited(format!("token endpoint throttled ({})", status)),
                _ => Error::provider("azure", format!("token request failed: {}", status)),
            });
        }

        let issued: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::provider("azure", format!("invalid token response: {}", e)))?;

        if issued.access_token.is_empty() {
            return Err(Error::auth("token endpoint returned an empty token"));
        }

        let expires_at = Utc::now() + Duration::seconds(issued.expires_in_secs());
        tracing::info!(expires_at = %expires_at, "Obtained ARM access token");

        let value = issued.access_token.clone();
        *cached = Some(CachedToken {
            value: issued.access_token,
            expires_at,
        });
        Ok(value)
    }
}

/// `error_description` of an OAuth2 error body, or the raw body
fn oauth_error_description(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error_description"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_secrets() {
        let credential = Credential::ClientSecret {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: "hunter2".to_string(),
        };
        let debug = format!("{:?}", credential);
        assert!(debug.contains("tenant"));
        assert!(!debug.contains("hunter2"));

        let debug = format!("{:?}", Credential::Static("eyJ0eXAi".to_string()));
        assert!(!debug.contains("eyJ0eXAi"));
    }

    #[test]
    fn test_expires_in_number_or_string() {
        let numeric: TokenResponse =
            serde_json::from_str(r#"{"access_token":"t","expires_in":3599}"#).unwrap();
        assert_eq!(numeric.expires_in_secs(), 3599);

        let text: TokenResponse =
            serde_json::from_str(r#"{"access_token":"t","expires_in":"120"}"#).unwrap();
        assert_eq!(text.expires_in_secs(), 120);

        let missing: TokenResponse = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert_eq!(missing.expires_in_secs(), 3600);
    }

    #[test]
    fn test_cached_token_freshness() {
        let now = Utc::now();
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: now + Duration::seconds(REFRESH_MARGIN_SECS + 60),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(120)));
    }

    #[tokio::test]
    async fn test_static_token_is_returned_without_requests() {
        let source = TokenSource::new(
            Credential::Static("static-token".to_string()),
            "http://127.0.0.1:9",
            reqwest::Client::new(),
        );
        assert_eq!(source.token().await.unwrap(), "static-token");
    }

    #[test]
    fn test_oauth_error_description() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#;
        assert_eq!(
            oauth_error_description(body),
            "AADSTS7000215: Invalid client secret"
        );
        assert_eq!(oauth_error_description("plain"), "plain");
    }
}
