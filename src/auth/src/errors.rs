// Copyright 2024 Google LLC
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

//! Errors reported by each stage of a chat call.
//!
//! Every stage has its own error type. The types are opaque, applications
//! inspect them with the `is_*()` predicates or with [reason()], which returns
//! a short machine-readable string such as `"invalid-key"`. The crate-level
//! [Error] wraps the stage errors and remembers the [Stage] that failed.
//!
//! [reason()]: Error::reason

use crate::constants::BODY_EXCERPT_LIMIT;
use http::StatusCode;
use std::fmt::{Display, Formatter};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The stages of a chat call, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Creating and signing the JWT assertion.
    BuildingAssertion,
    /// Exchanging the assertion for an ID token.
    ExchangingToken,
    /// Calling the protected downstream endpoint.
    InvokingDownstream,
}

impl Stage {
    /// A short, stable name for the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BuildingAssertion => "assertion",
            Stage::ExchangingToken => "exchange",
            Stage::InvokingDownstream => "invocation",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem loading a service account key.
///
/// These errors happen at configuration time. No call can proceed until the
/// configuration is fixed.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct CredentialError(CredentialErrorKind);

impl CredentialError {
    /// The key is not valid JSON, is not a JSON object, or a field has the
    /// wrong type.
    pub fn is_malformed_json(&self) -> bool {
        matches!(self.0, CredentialErrorKind::MalformedJson(_))
    }

    /// A required field is absent.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, CredentialErrorKind::MissingField(_))
    }

    /// The key could not be read from its source.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, CredentialErrorKind::Loading(_))
    }

    /// The name of the missing field, if that is the problem.
    pub fn missing_field_name(&self) -> Option<&'static str> {
        match &self.0 {
            CredentialErrorKind::MissingField(name) => Some(name),
            _ => None,
        }
    }

    pub fn reason(&self) -> &'static str {
        match &self.0 {
            CredentialErrorKind::MalformedJson(_) => "malformed-json",
            CredentialErrorKind::MissingField(_) => "missing-field",
            CredentialErrorKind::Loading(_) => "loading",
        }
    }

    pub(crate) fn malformed_json<T>(source: T) -> CredentialError
    where
        T: Into<BoxError>,
    {
        CredentialError(CredentialErrorKind::MalformedJson(source.into()))
    }

    pub(crate) fn missing_field(field: &'static str) -> CredentialError {
        CredentialError(CredentialErrorKind::MissingField(field))
    }

    pub(crate) fn loading<T>(source: T) -> CredentialError
    where
        T: Into<BoxError>,
    {
        CredentialError(CredentialErrorKind::Loading(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum CredentialErrorKind {
    #[error("cannot parse the service account key: {0}")]
    MalformedJson(#[source] BoxError),
    #[error("missing required field in the service account key: {0}")]
    MissingField(&'static str),
    #[error("cannot read the service account key: {0}")]
    Loading(#[source] BoxError),
}

/// A problem creating the signed assertion.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct SigningError(SigningErrorKind);

impl SigningError {
    /// The private key is not a usable PKCS#8 RSA key.
    pub fn is_invalid_key(&self) -> bool {
        matches!(self.0, SigningErrorKind::InvalidKey(_))
    }

    /// The signing primitive failed.
    pub fn is_sign_failed(&self) -> bool {
        matches!(self.0, SigningErrorKind::SignFailed(_))
    }

    pub fn reason(&self) -> &'static str {
        match &self.0 {
            SigningErrorKind::InvalidKey(_) => "invalid-key",
            SigningErrorKind::SignFailed(_) => "sign-failed",
        }
    }

    pub(crate) fn invalid_key<T>(source: T) -> SigningError
    where
        T: Into<BoxError>,
    {
        SigningError(SigningErrorKind::InvalidKey(source.into()))
    }

    pub(crate) fn sign_failed<T>(source: T) -> SigningError
    where
        T: Into<BoxError>,
    {
        SigningError(SigningErrorKind::SignFailed(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum SigningErrorKind {
    #[error("invalid service account private key: {0}")]
    InvalidKey(#[source] BoxError),
    #[error("cannot sign the assertion: {0}")]
    SignFailed(#[source] BoxError),
}

/// A problem exchanging the assertion for an ID token.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct ExchangeError(ExchangeErrorKind);

impl ExchangeError {
    /// The token endpoint could not be reached, or did not answer in time.
    pub fn is_transport(&self) -> bool {
        matches!(self.0, ExchangeErrorKind::Transport(_))
    }

    /// The token endpoint refused the assertion or returned an unusable
    /// response.
    pub fn is_rejected(&self) -> bool {
        matches!(self.0, ExchangeErrorKind::Rejected { .. })
    }

    /// The HTTP status returned by the token endpoint, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.0 {
            ExchangeErrorKind::Rejected { status, .. } => Some(*status),
            ExchangeErrorKind::Transport(_) => None,
        }
    }

    /// The first 256 characters of the response body returned by the token
    /// endpoint, if any.
    ///
    /// The body may echo request parameters. Log it, never show it to end
    /// users.
    pub fn body(&self) -> Option<&str> {
        match &self.0 {
            ExchangeErrorKind::Rejected { body, .. } => Some(body),
            ExchangeErrorKind::Transport(_) => None,
        }
    }

    pub fn reason(&self) -> &'static str {
        match &self.0 {
            ExchangeErrorKind::Transport(_) => "transport",
            ExchangeErrorKind::Rejected { .. } => "rejected",
        }
    }

    pub(crate) fn transport<T>(source: T) -> ExchangeError
    where
        T: Into<BoxError>,
    {
        ExchangeError(ExchangeErrorKind::Transport(source.into()))
    }

    pub(crate) fn rejected<T: Into<String>>(status: StatusCode, body: T) -> ExchangeError {
        ExchangeError(ExchangeErrorKind::Rejected {
            status,
            body: body.into(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
enum ExchangeErrorKind {
    #[error("cannot reach the token endpoint: {0}")]
    Transport(#[source] BoxError),
    #[error("the token endpoint rejected the assertion, status={status}")]
    Rejected { status: StatusCode, body: String },
}

/// A problem calling the protected downstream endpoint.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct InvocationError(InvocationErrorKind);

impl InvocationError {
    /// The downstream endpoint could not be reached, or did not answer in
    /// time.
    pub fn is_transport(&self) -> bool {
        matches!(self.0, InvocationErrorKind::Transport(_))
    }

    /// The downstream endpoint returned a non-success status.
    pub fn is_downstream_error(&self) -> bool {
        matches!(self.0, InvocationErrorKind::DownstreamError { .. })
    }

    /// The downstream endpoint answered with an unexpected payload.
    pub fn is_malformed_response(&self) -> bool {
        matches!(self.0, InvocationErrorKind::MalformedResponse(_))
    }

    /// The HTTP status returned by the downstream endpoint, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.0 {
            InvocationErrorKind::DownstreamError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The first characters of the downstream error body, if any.
    pub fn body_excerpt(&self) -> Option<&str> {
        match &self.0 {
            InvocationErrorKind::DownstreamError { body_excerpt, .. } => Some(body_excerpt),
            _ => None,
        }
    }

    pub fn reason(&self) -> &'static str {
        match &self.0 {
            InvocationErrorKind::Transport(_) => "transport",
            InvocationErrorKind::DownstreamError { .. } => "downstream-error",
            InvocationErrorKind::MalformedResponse(_) => "malformed-response",
        }
    }

    pub(crate) fn transport<T>(source: T) -> InvocationError
    where
        T: Into<BoxError>,
    {
        InvocationError(InvocationErrorKind::Transport(source.into()))
    }

    pub(crate) fn downstream_error<T: Into<String>>(
        status: StatusCode,
        body_excerpt: T,
    ) -> InvocationError {
        InvocationError(InvocationErrorKind::DownstreamError {
            status,
            body_excerpt: body_excerpt.into(),
        })
    }

    pub(crate) fn malformed_response<T>(source: T) -> InvocationError
    where
        T: Into<BoxError>,
    {
        InvocationError(InvocationErrorKind::MalformedResponse(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum InvocationErrorKind {
    #[error("cannot reach the downstream endpoint: {0}")]
    Transport(#[source] BoxError),
    #[error("the downstream endpoint returned status={status}: {body_excerpt}")]
    DownstreamError {
        status: StatusCode,
        body_excerpt: String,
    },
    #[error("malformed response from the downstream endpoint: {0}")]
    MalformedResponse(#[source] BoxError),
}

/// The error type for chat calls.
///
/// Wraps the error of the stage that failed. A failure in any stage stops the
/// call, later stages never run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl Error {
    /// The stage where the call failed.
    pub fn stage(&self) -> Stage {
        match self {
            Error::Signing(_) => Stage::BuildingAssertion,
            Error::Exchange(_) => Stage::ExchangingToken,
            Error::Invocation(_) => Stage::InvokingDownstream,
        }
    }

    /// The stage specific reason, e.g. `"rejected"`.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Signing(e) => e.reason(),
            Error::Exchange(e) => e.reason(),
            Error::Invocation(e) => e.reason(),
        }
    }

    /// A machine-readable summary in the form `<stage>:<reason>`.
    ///
    /// This is safe to return to end users, it never contains response
    /// bodies or key material.
    pub fn details(&self) -> String {
        format!("{}:{}", self.stage(), self.reason())
    }

    /// Returns `true` if a new attempt (with a new assertion) may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Signing(_) => false,
            Error::Exchange(e) => e.is_transport(),
            Error::Invocation(e) => {
                e.is_transport() || e.status().is_some_and(is_retryable)
            }
        }
    }
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}

// Truncates on character boundaries.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LIMIT).collect()
}
