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

//! Map inbound chat payloads to user-facing replies.
//!
//! The web layer hands the raw request body to [handle] and sends back the
//! returned status and JSON reply. Failures never expose provider responses
//! to the end user: the reply carries a fixed message and a
//! `"<stage>:<reason>"` summary, and the full error is logged.

use crate::client::Client;
use crate::invoker::DownstreamRequest;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The message returned with every failed call.
pub const FAILURE_MESSAGE: &str = "Failed to get a response from the analysis service";

/// The message returned when the inbound payload is invalid.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid chat request";

/// The JSON body returned to the browser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatReply {
    /// `{"answer": "..."}`
    Answer { answer: String },
    /// `{"error": "...", "details": "<stage>:<reason>"}`
    Failure { error: String, details: String },
}

impl ChatReply {
    fn failure<T: Into<String>>(error: &str, details: T) -> Self {
        ChatReply::Failure {
            error: error.to_string(),
            details: details.into(),
        }
    }
}

/// Validates `body`, runs the call, and returns the reply for the browser.
///
/// * `400` if `body` is not a JSON object, or `query` is missing, null, blank,
///   or not a string. The client is not called.
/// * `200` with `{answer}` on success.
/// * `500` with `{error, details}` if any stage fails.
pub async fn handle(client: &Client, body: &[u8]) -> (StatusCode, ChatReply) {
    let request = match parse_request(body) {
        Ok(r) => r,
        Err(reason) => {
            tracing::warn!(reason, "rejecting chat request");
            return (
                StatusCode::BAD_REQUEST,
                ChatReply::failure(INVALID_REQUEST_MESSAGE, format!("request:{reason}")),
            );
        }
    };

    match client.ask(&request).await {
        Ok(answer) => (StatusCode::OK, ChatReply::Answer { answer }),
        Err(e) => {
            let provider_body = match &e {
                crate::Error::Exchange(inner) => inner.body(),
                crate::Error::Invocation(inner) => inner.body_excerpt(),
                _ => None,
            };
            tracing::error!(
                stage = %e.stage(),
                reason = e.reason(),
                transient = e.is_transient(),
                provider_body,
                "chat call failed: {e}"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ChatReply::failure(FAILURE_MESSAGE, e.details()),
            )
        }
    }
}

// Returns the reason for rejecting the payload on error.
fn parse_request(body: &[u8]) -> std::result::Result<DownstreamRequest, &'static str> {
    let Ok(Value::Object(mut payload)) = serde_json::from_slice::<Value>(body) else {
        return Err("malformed-body");
    };
    let query = match payload.remove("query") {
        Some(Value::String(q)) if !q.trim().is_empty() => q,
        None | Some(Value::Null) | Some(Value::String(_)) => return Err("missing-query"),
        Some(_) => return Err("invalid-query"),
    };
    let conversation_memory = match payload.remove("conversationMemory") {
        None | Some(Value::Null) => None,
        Some(memory) => Some(memory),
    };
    Ok(DownstreamRequest {
        query,
        conversation_memory,
    })
}
