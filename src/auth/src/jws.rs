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

use crate::constants::ASSERTION_LIFETIME;
use crate::errors::SigningError;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use time::OffsetDateTime;

type Result<T> = std::result::Result<T, SigningError>;

/// The claims in an assertion for the JWT bearer grant.
///
/// `iss` and `sub` are the service account email, `aud` is the token
/// endpoint, and `target_audience` is the URL the resulting ID token must be
/// valid for.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub target_audience: String,
    #[serde(with = "time::serde::timestamp")]
    pub iat: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub exp: OffsetDateTime,
}

impl AssertionClaims {
    /// Claims issued at `now` and valid for one hour.
    pub fn new(
        client_email: &str,
        token_endpoint: &str,
        target_audience: &str,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            iss: client_email.to_string(),
            sub: client_email.to_string(),
            aud: token_endpoint.to_string(),
            target_audience: target_audience.to_string(),
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        }
    }

    pub(crate) fn encode(&self) -> Result<String> {
        if self.exp <= self.iat {
            return Err(SigningError::sign_failed(format!(
                "expiration time {:?}, must be later than issued time {:?}",
                self.exp, self.iat
            )));
        }
        encode_segment(self)
    }
}

/// The header that describes how an assertion was signed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub(crate) struct JwsHeader<'a> {
    pub alg: &'a str,
    pub typ: &'a str,
}

pub(crate) const RS256_HEADER: JwsHeader<'static> = JwsHeader {
    alg: "RS256",
    typ: "JWT",
};

impl JwsHeader<'_> {
    pub(crate) fn encode(&self) -> Result<String> {
        encode_segment(self)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value).map_err(SigningError::sign_failed)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes()))
}
