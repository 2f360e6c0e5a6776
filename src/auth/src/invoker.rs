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

//! Call the protected analysis endpoint with an ID token.
//!
//! # Example
//! ```no_run
//! # use chat_auth::invoker::{DownstreamInvoker, DownstreamRequest};
//! # use chat_auth::token::IdentityToken;
//! # async fn sample(token: IdentityToken) -> anyhow::Result<()> {
//! let request = DownstreamRequest::new("What were last week's top pages?");
//! let response = DownstreamInvoker::default()
//!     .invoke(token, "https://analysis.example.com/chat", &request)
//!     .await?;
//! println!("{}", response.response);
//! # Ok(()) }
//! ```

use crate::constants::DEFAULT_TIMEOUT;
use crate::errors::{InvocationError, excerpt};
use crate::token::IdentityToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

type Result<T> = std::result::Result<T, InvocationError>;

/// The payload sent to the downstream endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownstreamRequest {
    /// The user question.
    pub query: String,

    /// Opaque conversation state, forwarded as-is.
    #[serde(
        rename = "conversationMemory",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub conversation_memory: Option<Value>,
}

impl DownstreamRequest {
    pub fn new<T: Into<String>>(query: T) -> Self {
        Self {
            query: query.into(),
            conversation_memory: None,
        }
    }

    /// Attaches the conversation state to the request.
    pub fn with_conversation_memory(mut self, memory: Value) -> Self {
        self.conversation_memory = Some(memory);
        self
    }
}

/// The successful downstream payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownstreamResponse {
    pub response: String,
}

/// Sends authenticated requests to the downstream endpoint.
///
/// Each call to [invoke][DownstreamInvoker::invoke] makes exactly one request.
#[derive(Clone, Debug)]
pub struct DownstreamInvoker {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for DownstreamInvoker {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl DownstreamInvoker {
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

    /// Sends `request` to `endpoint_url` using `token` as the bearer
    /// credential.
    #[tracing::instrument(level = "debug", skip_all, fields(endpoint_url = %endpoint_url))]
    pub async fn invoke(
        &self,
        token: IdentityToken,
        endpoint_url: &str,
        request: &DownstreamRequest,
    ) -> Result<DownstreamResponse> {
        let builder = self
            .client
            .post(endpoint_url)
            .bearer_auth(&token.token)
            .json(request);

        let (status, body) = tokio::time::timeout(self.timeout, send(builder))
            .await
            .map_err(InvocationError::transport)??;

        if !status.is_success() {
            tracing::debug!(%status, "downstream endpoint returned an error");
            return Err(InvocationError::downstream_error(status, excerpt(&body)));
        }

        serde_json::from_str::<DownstreamResponse>(&body)
            .map_err(InvocationError::malformed_response)
    }
}

async fn send(builder: reqwest::RequestBuilder) -> Result<(http::StatusCode, String)> {
    let response = builder.send().await.map_err(InvocationError::transport)?;
    let status = response.status();
    let body = response.text().await.map_err(InvocationError::transport)?;
    Ok((status, body))
}
