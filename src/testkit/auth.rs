//! Static bearer → owner verifier for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::auth::AuthVerifier;
use crate::domain::OwnerId;
use crate::error::{Error, Result};

/// Verifier backed by a fixed token table. Unknown tokens fail closed,
/// matching the production gateway contract.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: Mutex<HashMap<String, String>>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bearer token as resolving to the given owner.
    pub fn allow(&self, bearer_token: &str, owner_id: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(bearer_token.to_string(), owner_id.to_string());
    }
}

#[async_trait]
impl AuthVerifier for StaticVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<OwnerId> {
        self.tokens
            .lock()
            .unwrap()
            .get(bearer_token)
            .map(|owner| OwnerId::new(owner.clone()))
            .ok_or(Error::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_token_fails_closed() {
        let verifier = StaticVerifier::new();
        verifier.allow("good", "auth0|u1");

        assert_eq!(verifier.verify("good").await.unwrap().as_str(), "auth0|u1");
        assert!(matches!(
            verifier.verify("bad").await,
            Err(Error::Unauthenticated)
        ));
    }
}
