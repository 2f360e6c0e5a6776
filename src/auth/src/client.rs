// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run a complete chat call: sign, exchange, and invoke.
//!
//! A [Client] holds the service account key and the downstream settings. Each
//! call to [Client::ask] walks through the [Stage]s in order and stops at the
//! first failure.
//!
//! # Example
//! ```no_run
//! # use chat_auth::client::Builder;
//! # use chat_auth::credentials::ServiceAccountCredential;
//! # use chat_auth::invoker::DownstreamRequest;
//! # async fn sample() -> anyhow::Result<()> {
//! let credential = ServiceAccountCredential::from_file("service-account.json").await?;
//! let client = Builder::new(credential, "https://analysis.example.com/chat")
//!     .with_token_cache(true)
//!     .build()?;
//! let answer = client.ask(&DownstreamRequest::new("How many visitors today?")).await?;
//! println!("{answer}");
//! # Ok(()) }
//! ```
//!
//! [Stage]: crate::errors::Stage

use crate::assertion::{AssertionClaims, RsaSigner};
use crate::build_errors::Error as BuilderError;
use crate::config::{Config, validate_url};
use crate::constants::{CLOCK_SKEW_FUDGE, DEFAULT_TIMEOUT, OAUTH2_TOKEN_SERVER_URL};
use crate::credentials::ServiceAccountCredential;
use crate::errors::Stage;
use crate::exchange::TokenExchangeClient;
use crate::invoker::{DownstreamInvoker, DownstreamRequest};
use crate::token::IdentityToken;
use crate::token_cache::{TokenCache, TokenProvider};
use crate::{BuildResult, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

// Signs a fresh assertion and exchanges it on every call.
#[derive(Debug)]
struct ServiceAccountTokenProvider {
    client_email: String,
    signer: RsaSigner,
    token_endpoint: String,
    exchange: TokenExchangeClient,
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn token(&self, target_audience: &str) -> Result<IdentityToken> {
        tracing::debug!(stage = %Stage::BuildingAssertion, "entering stage");
        let now = OffsetDateTime::now_utc() - CLOCK_SKEW_FUDGE;
        let claims =
            AssertionClaims::new(&self.client_email, &self.token_endpoint, target_audience, now);
        let assertion = self.signer.sign_claims(&claims)?;

        tracing::debug!(stage = %Stage::ExchangingToken, "entering stage");
        let token = self
            .exchange
            .exchange(assertion, &self.token_endpoint)
            .await?;
        Ok(token)
    }
}

/// Calls the protected analysis endpoint on behalf of a service account.
///
/// Clients are cheap to clone; clones share the signing key, the HTTP
/// connection pool, and the token cache (if enabled).
#[derive(Clone, Debug)]
pub struct Client {
    tokens: Arc<dyn TokenProvider>,
    invoker: DownstreamInvoker,
    target_url: String,
    target_audience: String,
}

impl Client {
    /// Creates a client from a loaded [Config].
    pub fn from_config(config: Config) -> BuildResult<Client> {
        let mut builder = Builder::new(config.credential, config.target_url)
            .with_token_cache(config.token_cache)
            .with_timeout(config.timeout);
        if let Some(audience) = config.target_audience {
            builder = builder.with_target_audience(audience);
        }
        if let Some(url) = config.token_url {
            builder = builder.with_token_endpoint(url);
        }
        builder.build()
    }

    /// The downstream endpoint.
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// The audience requested for the ID tokens.
    pub fn target_audience(&self) -> &str {
        &self.target_audience
    }

    /// Sends `request` to the downstream endpoint and returns its answer.
    ///
    /// Without the token cache every call signs a new assertion and exchanges
    /// it for a new ID token. Nothing is retried; a failed call can be
    /// retried by calling `ask()` again if [is_transient] returns `true`.
    ///
    /// [is_transient]: crate::errors::Error::is_transient
    #[tracing::instrument(level = "debug", skip_all, fields(target_url = %self.target_url))]
    pub async fn ask(&self, request: &DownstreamRequest) -> Result<String> {
        let token = self.tokens.token(&self.target_audience).await?;

        tracing::debug!(stage = %Stage::InvokingDownstream, "entering stage");
        let response = self
            .invoker
            .invoke(token, &self.target_url, request)
            .await?;
        tracing::debug!("call succeeded");
        Ok(response.response)
    }
}

/// Creates [Client] instances.
///
/// The service account key and the downstream URL are required. Everything
/// else has defaults:
///
/// * the target audience is the downstream URL,
/// * the token endpoint is the `token_uri` from the key, or
///   `https://oauth2.googleapis.com/token` if the key does not have one,
/// * the token cache is disabled,
/// * each network call times out after 30 seconds.
///
/// [build][Builder::build] imports the private key, so a key that cannot sign
/// assertions is reported before any call is made.
pub struct Builder {
    credential: ServiceAccountCredential,
    target_url: String,
    target_audience: Option<String>,
    token_endpoint: Option<String>,
    token_cache: bool,
    timeout: Duration,
    http_client: Option<reqwest::Client>,
}

impl Builder {
    pub fn new<S: Into<String>>(credential: ServiceAccountCredential, target_url: S) -> Self {
        Self {
            credential,
            target_url: target_url.into(),
            target_audience: None,
            token_endpoint: None,
            token_cache: false,
            timeout: DEFAULT_TIMEOUT,
            http_client: None,
        }
    }

    /// Requests ID tokens for `audience` instead of the downstream URL.
    pub fn with_target_audience<S: Into<String>>(mut self, audience: S) -> Self {
        self.target_audience = Some(audience.into());
        self
    }

    /// Exchanges assertions at `url`. The `aud` claim of every assertion is
    /// set to this URL.
    pub fn with_token_endpoint<S: Into<String>>(mut self, url: S) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    /// Reuses ID tokens until they are about to expire.
    pub fn with_token_cache(mut self, enabled: bool) -> Self {
        self.token_cache = enabled;
        self
    }

    /// Sets the timeout for each network call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends requests with `client` instead of a default one.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(self) -> BuildResult<Client> {
        let target_url = validate_url("target_url", self.target_url)?;
        let target_audience = match self.target_audience {
            None => target_url.clone(),
            Some(a) if a.trim().is_empty() => {
                return Err(BuilderError::invalid_value(
                    "target_audience",
                    "the target audience cannot be empty",
                ));
            }
            Some(a) => a,
        };
        let token_endpoint = self
            .token_endpoint
            .or_else(|| self.credential.token_uri().map(str::to_string))
            .unwrap_or_else(|| OAUTH2_TOKEN_SERVER_URL.to_string());
        let token_endpoint = validate_url("token_endpoint", token_endpoint)?;
        if self.timeout.is_zero() {
            return Err(BuilderError::invalid_value(
                "timeout",
                "the timeout must be greater than zero",
            ));
        }

        let signer = RsaSigner::from_pem(self.credential.private_key())?;

        let http_client = self.http_client.unwrap_or_default();
        let provider = ServiceAccountTokenProvider {
            client_email: self.credential.client_email().to_string(),
            signer,
            token_endpoint,
            exchange: TokenExchangeClient::new(http_client.clone()).with_timeout(self.timeout),
        };
        let tokens: Arc<dyn TokenProvider> = if self.token_cache {
            Arc::new(TokenCache::new(provider))
        } else {
            Arc::new(provider)
        };

        Ok(Client {
            tokens,
            invoker: DownstreamInvoker::new(http_client).with_timeout(self.timeout),
            target_url,
            target_audience,
        })
    }
}
