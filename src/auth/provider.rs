use std::collections::HashMap;

use async_trait::async_trait;

use crate::{AppError, AppResult, GetField};

const TOKEN_REJECTED: &str = "BEARER Token not found";

/// External identity verification: a bearer token either maps to a uid or
/// the request is unauthenticated. Nothing else about the provider leaks in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> AppResult<String>;
}

/// Talks to the configured verify endpoint; any non-2xx or unreadable
/// answer is treated as a rejected token, never as a server fault.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    verify_url: String,
}

impl HttpIdentityProvider {
    pub fn new(verify_url: String) -> HttpIdentityProvider {
        HttpIdentityProvider {
            http: reqwest::Client::new(),
            verify_url,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify(&self, token: &str) -> AppResult<String> {
        let response = self
            .http
            .post(&self.verify_url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|_| AppError::Unauthenticated(TOKEN_REJECTED.to_owned()))?;

        if !response.status().is_success() {
            return Err(AppError::Unauthenticated(TOKEN_REJECTED.to_owned()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| AppError::Unauthenticated(TOKEN_REJECTED.to_owned()))?;
        body.get_str_field("uid")
            .map_err(|_| AppError::Unauthenticated(TOKEN_REJECTED.to_owned()))
    }
}

/// Fixed token table for local runs and tests.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, String>,
}

impl StaticIdentityProvider {
    pub fn with_token(mut self, token: &str, uid: &str) -> StaticIdentityProvider {
        self.tokens.insert(token.to_owned(), uid.to_owned());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> AppResult<String> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated(TOKEN_REJECTED.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_resolves_known_token() {
        let provider = StaticIdentityProvider::default().with_token("tok-a", "uid-a");
        assert_eq!(provider.verify("tok-a").await.unwrap(), "uid-a");
    }

    #[tokio::test]
    async fn static_provider_rejects_unknown_token() {
        let provider = StaticIdentityProvider::default();
        assert!(matches!(
            provider.verify("nope").await,
            Err(AppError::Unauthenticated(_))
        ));
    }
}
