//! HTTP-backed implementation of `scheduler_core::ports::TokenService`.
//!
//! Resolves an opaque bearer token against the control plane's token-info
//! endpoint. Every call is a fresh HTTP round trip — this service never
//! caches, by the same contract the trait documents.

use chrono::{DateTime, Utc};
use scheduler_core::error::SchedulerError;
use scheduler_core::ports::{TokenInfo, TokenService};
use scheduler_core::role::Role;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TokenServiceConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl TokenServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    token_name: String,
    role: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HttpTokenService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenService {
    pub fn new(config: TokenServiceConfig) -> Result<Self, SchedulerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SchedulerError::Internal(format!("build token-service client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }
}

#[async_trait::async_trait]
impl TokenService for HttpTokenService {
    async fn resolve(&self, token: &str) -> Result<TokenInfo, SchedulerError> {
        let url = format!("{}/tokens/{}", self.base_url.trim_end_matches('/'), token);

        let response = self.http.get(&url).send().await.map_err(|e| {
            SchedulerError::BackendUnavailable(format!("token-info service unreachable: {e}"))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(SchedulerError::Unauthenticated);
        }
        if !response.status().is_success() {
            return Err(SchedulerError::BackendUnavailable(format!(
                "token-info service returned {}",
                response.status()
            )));
        }

        let body: TokenInfoResponse = response
            .json()
            .await
            .map_err(|e| SchedulerError::Internal(format!("decode token-info response: {e}")))?;

        if body.expires_at <= Utc::now() {
            return Err(SchedulerError::Unauthenticated);
        }

        Ok(TokenInfo {
            token_name: body.token_name,
            role: Role::parse(&body.role),
            expires_at: body.expires_at,
        })
    }
}

/// Fixed-table token service used for `--dev` mode and tests.
pub mod dev {
    use super::*;
    use std::collections::HashMap;

    #[derive(Clone, Default)]
    pub struct StaticTokenService {
        tokens: HashMap<String, TokenInfo>,
    }

    impl StaticTokenService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_token(mut self, token: impl Into<String>, info: TokenInfo) -> Self {
            self.tokens.insert(token.into(), info);
            self
        }
    }

    #[async_trait::async_trait]
    impl TokenService for StaticTokenService {
        async fn resolve(&self, token: &str) -> Result<TokenInfo, SchedulerError> {
            let info = self
                .tokens
                .get(token)
                .cloned()
                .ok_or(SchedulerError::Unauthenticated)?;
            if info.expires_at <= Utc::now() {
                return Err(SchedulerError::Unauthenticated);
            }
            Ok(info)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn unknown_token_is_unauthenticated() {
            let svc = StaticTokenService::new();
            let err = svc.resolve("nope").await.unwrap_err();
            assert!(matches!(err, SchedulerError::Unauthenticated));
        }

        #[tokio::test]
        async fn known_token_resolves() {
            let svc = StaticTokenService::new().with_token(
                "tok-1",
                TokenInfo {
                    token_name: "tok-1".to_string(),
                    role: Role::Developer,
                    expires_at: Utc::now() + chrono::Duration::hours(1),
                },
            );
            let info = svc.resolve("tok-1").await.unwrap();
            assert_eq!(info.role, Role::Developer);
        }

        #[tokio::test]
        async fn expired_token_is_unauthenticated() {
            let svc = StaticTokenService::new().with_token(
                "tok-1",
                TokenInfo {
                    token_name: "tok-1".to_string(),
                    role: Role::Developer,
                    expires_at: Utc::now() - chrono::Duration::seconds(1),
                },
            );
            let err = svc.resolve("tok-1").await.unwrap_err();
            assert!(matches!(err, SchedulerError::Unauthenticated));
        }
    }
}
