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

//! Exchange signed assertions for ID tokens.
//!
//! The token endpoint receives a form-encoded POST with
//! `grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer` and the signed
//! assertion, and answers with a JSON object carrying an `id_token` field.

use crate::assertion::SignedAssertion;
use crate::constants::{DEFAULT_TIMEOUT, JWT_BEARER_GRANT_TYPE};
use crate::errors::{ExchangeError, excerpt};
use crate::token::IdentityToken;
use http::StatusCode;
use serde_json::Value;
use std::time::Duration;

type Result<T> = std::result::Result<T, ExchangeError>;

/// Trades signed assertions for ID tokens.
///
/// Each call to [exchange][TokenExchangeClient::exchange] makes exactly one
/// request. There are no retries: a retry must start over with a new
/// assertion.
#[derive(Clone, Debug)]
pub struct TokenExchangeClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for TokenExchangeClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl TokenExchangeClient {
    /// Creates a client sending requests with `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline for the request, including reading the response.
    ///
    /// Requests that time out fail with a `transport` error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exchanges `assertion` for an ID token at `token_endpoint`.
    #[tracing::instrument(level = "debug", skip_all, fields(token_endpoint = %token_endpoint))]
    pub async fn exchange(
        &self,
        assertion: SignedAssertion,
        token_endpoint: &str,
    ) -> Result<IdentityToken> {
        let request = self.client.post(token_endpoint).form(&[
            ("grant_type", JWT_BEARER_GRANT_TYPE),
            ("assertion", assertion.as_str()),
        ]);

        let (status, body) = tokio::time::timeout(self.timeout, send(request))
            .await
            .map_err(ExchangeError::transport)??;

        if !status.is_success() {
            tracing::debug!(%status, "token endpoint rejected the assertion");
            return Err(ExchangeError::rejected(status, excerpt(&body)));
        }

        let Some(id_token) = parse_id_token(&body) else {
            tracing::debug!(%status, "token endpoint response has no `id_token`");
            return Err(ExchangeError::rejected(status, excerpt(&body)));
        };

        Ok(IdentityToken::new(id_token, assertion.expires_at()))
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<(StatusCode, String)> {
    let response = request.send().await.map_err(ExchangeError::transport)?;
    let status = response.status();
    let body = response.text().await.map_err(ExchangeError::transport)?;
    Ok((status, body))
}

fn parse_id_token(body: &str) -> Option<String> {
    let response = serde_json::from_str::<Value>(body).ok()?;
    match response.get("id_token")?.as_str()? {
        "" => None,
        token => Some(token.to_string()),
    }
}
