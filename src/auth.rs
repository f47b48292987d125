//! Bearer-credential verification against the external identity gateway.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::OwnerId;
use crate::error::{Error, Result};

/// Response header carrying the verified identity.
const USER_HEADER: &str = "User";

/// Exchanges a bearer credential for a verified owner identity.
///
/// Fail-closed: implementations must only return an owner id after a
/// successful round trip to the gateway. A caller-supplied identity is
/// never trusted on its own.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Verify a bearer credential. Any failure mode — network fault,
    /// non-success response, missing identity — is `Unauthenticated`.
    async fn verify(&self, bearer_token: &str) -> Result<OwnerId>;
}

/// Production verifier performing one HTTP round trip per call to the
/// gateway's `/verify` route.
pub struct GatewayVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl GatewayVerifier {
    /// Build a verifier against the gateway base URL, with the shared
    /// boundary-call timeout applied to every round trip.
    pub fn new(gateway_base: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self {
            client,
            verify_url: format!("{}/verify", gateway_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AuthVerifier for GatewayVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<OwnerId> {
        if bearer_token.is_empty() {
            return Err(Error::Unauthenticated);
        }

        let response = self
            .client
            .get(&self.verify_url)
            .header("Authorization", format!("Bearer {bearer_token}"))
            .send()
            .await
            .map_err(|e| {
                debug!(error = %e, "auth gateway unreachable");
                Error::Unauthenticated
            })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "auth gateway rejected credential");
            return Err(Error::Unauthenticated);
        }

        let owner = response
            .headers()
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(Error::Unauthenticated)?;

        Ok(OwnerId::new(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_bearer_is_rejected_without_io() {
        // Unroutable base URL: the guard must fire before any request.
        let verifier = GatewayVerifier::new("http://0.0.0.0:1", Duration::from_millis(50)).unwrap();
        assert!(matches!(
            verifier.verify("").await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn unreachable_gateway_fails_closed() {
        let verifier = GatewayVerifier::new("http://127.0.0.1:1", Duration::from_millis(50)).unwrap();
        assert!(matches!(
            verifier.verify("some-token").await,
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn verify_url_normalizes_trailing_slash() {
        let verifier =
            GatewayVerifier::new("http://auth-gateway/", Duration::from_secs(1)).unwrap();
        assert_eq!(verifier.verify_url, "http://auth-gateway/verify");
    }
}
