//! Google Cloud request authorization.
//!
//! API keys and access tokens are attached as-is. Service-account keys go
//! through the OAuth 2.0 JWT bearer grant: an RS256-signed assertion is
//! posted to the key's `token_uri` and the returned access token is cached
//! until shortly before it expires.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use voice_relay_core::types::{CloudCredential, ServiceAccountKey};

use crate::ensure_success;

/// Scope covering Speech-to-Text and Text-to-Speech.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion.
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Shared by every provider that talks to Google Cloud.
pub struct GoogleAuth {
    credential: CloudCredential,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME.as_secs()
}

impl GoogleAuth {
    pub fn new(credential: CloudCredential, client: reqwest::Client) -> Self {
        Self {
            credential,
            client,
            cached: Mutex::new(None),
        }
    }

    /// Attach the credential to `request`, exchanging a service-account key
    /// for an access token when needed.
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        Ok(match &self.credential {
            CloudCredential::ApiKey(key) => request.header("x-goog-api-key", key),
            CloudCredential::BearerToken(token) => request.bearer_auth(token),
            CloudCredential::ServiceAccount(key) => request.bearer_auth(self.access_token(key).await?),
        })
    }

    async fn access_token(&self, key: &ServiceAccountKey) -> anyhow::Result<String> {
        // Held across the exchange so concurrent requests share one refresh.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let token = self.exchange(key).await?;
        info!(
            client_email = %key.client_email,
            expires_in = token.expires_in,
            "Obtained service-account access token"
        );
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    async fn exchange(&self, key: &ServiceAccountKey) -> anyhow::Result<TokenResponse> {
        let assertion = sign_assertion(key, SystemTime::now())?;
        debug!(token_uri = %key.token_uri, "Exchanging service-account assertion");

        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let resp = ensure_success(resp, "OAuth token").await?;
        Ok(resp.json().await?)
    }
}

/// Build the RS256-signed JWT for the bearer grant.
fn sign_assertion(key: &ServiceAccountKey, now: SystemTime) -> anyhow::Result<String> {
    let iat = now.duration_since(UNIX_EPOCH)?.as_secs();
    let claims = Claims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME.as_secs(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("service-account private_key is not a valid RSA PEM key")?;
    Ok(jsonwebtoken::encode(&header, &claims, &signing_key)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(private_key: &str) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "relay@shop-vr.iam.gserviceaccount.com".into(),
            private_key: private_key.into(),
            private_key_id: Some("kid-1".into()),
            token_uri: "https://oauth2.googleapis.com/token".into(),
        }
    }

    #[test]
    fn test_sign_assertion_rejects_bad_pem() {
        let err = sign_assertion(&key("not a pem"), SystemTime::now()).unwrap_err();
        assert!(err.to_string().contains("RSA PEM"));
    }

    #[test]
    fn test_cached_token_freshness() {
        let fresh = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(fresh.is_fresh());

        let stale = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!stale.is_fresh());
    }

    #[tokio::test]
    async fn test_static_credentials_skip_exchange() {
        let client = reqwest::Client::new();
        let auth = GoogleAuth::new(CloudCredential::ApiKey("k".into()), client.clone());
        let req = auth
            .authorize(client.get("http://localhost/"))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.headers()["x-goog-api-key"], "k");

        let auth = GoogleAuth::new(CloudCredential::BearerToken("ya29.t".into()), client.clone());
        let req = auth
            .authorize(client.get("http://localhost/"))
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer ya29.t");
    }
}
