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

//! Types and functions to work with [ID tokens].
//!
//! [ID tokens]: https://cloud.google.com/docs/authentication/token-types#identity-tokens

use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use std::time::Duration;
use time::OffsetDateTime;
// Using tokio's wrapper makes expirations testable without relying on clock
// times.
use tokio::time::Instant;

/// An ID token obtained from the token endpoint.
#[derive(Clone, PartialEq)]
pub struct IdentityToken {
    /// The token string.
    ///
    /// This is the value used in the `Authorization: Bearer` header.
    pub token: String,

    /// When the token was obtained.
    pub obtained_at: Instant,

    /// The instant at which the token expires.
    ///
    /// Note that the `Instant` is not valid across processes.
    pub expires_at: Instant,
}

impl IdentityToken {
    /// Creates a token from the raw token endpoint response.
    ///
    /// The expiration is the `exp` claim of the token, but never later than
    /// `assertion_expires_at`. Tokens that are not decodable JWTs expire with
    /// the assertion.
    pub(crate) fn new(token: String, assertion_expires_at: OffsetDateTime) -> Self {
        let now = OffsetDateTime::now_utc();
        let bound = match token_expiration(&token) {
            Some(exp) if exp < assertion_expires_at => exp,
            _ => assertion_expires_at,
        };
        let remaining = Duration::try_from(bound - now).unwrap_or(Duration::ZERO);
        let obtained_at = Instant::now();
        Self {
            token,
            obtained_at,
            expires_at: obtained_at + remaining,
        }
    }

    /// How long the token remains valid, zero if it has expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Returns true if the token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToken")
            .field("token", &"[censored]")
            .field("obtained_at", &self.obtained_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// Reads the `exp` claim of a JWT without verifying its signature. The token
// came straight from the token endpoint over TLS, and the value is only used
// to decide when to refresh it.
fn token_expiration(token: &str) -> Option<OffsetDateTime> {
    let mut parts = token.split('.');
    let (_, payload, _) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let payload = BASE64_URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims = serde_json::from_slice::<Value>(&payload).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    OffsetDateTime::from_unix_timestamp(exp).ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use test_case::test_case;

    const HOUR: Duration = Duration::from_secs(3600);

    /// A fake, but decodable, ID token that expires at `exp`.
    pub(crate) fn generate_test_id_token(exp: OffsetDateTime) -> String {
        let claims = serde_json::json!({
            "iss": "https://accounts.google.com",
            "aud": "https://analysis.example.com",
            "exp": exp.unix_timestamp(),
        });
        let payload = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("test_header.{payload}.test_signature")
    }

    fn assert_close(got: Duration, want: Duration) {
        let skew = Duration::from_secs(2);
        assert!(got + skew >= want && got <= want + skew, "got={got:?} want={want:?}");
    }

    #[tokio::test]
    async fn opaque_token_expires_with_assertion() {
        let token = IdentityToken::new("abc123".into(), OffsetDateTime::now_utc() + HOUR);
        assert_eq!(token.token, "abc123");
        assert_close(token.remaining(), HOUR);
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn jwt_token_uses_exp_claim() {
        let now = OffsetDateTime::now_utc();
        let id_token = generate_test_id_token(now + Duration::from_secs(600));
        let token = IdentityToken::new(id_token.clone(), now + HOUR);
        assert_eq!(token.token, id_token);
        assert_close(token.remaining(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn jwt_token_bounded_by_assertion() {
        let now = OffsetDateTime::now_utc();
        let id_token = generate_test_id_token(now + 5 * HOUR);
        let token = IdentityToken::new(id_token, now + HOUR);
        assert_close(token.remaining(), HOUR);
    }

    #[tokio::test]
    async fn already_expired() {
        let now = OffsetDateTime::now_utc();
        let id_token = generate_test_id_token(now - HOUR);
        let token = IdentityToken::new(id_token, now + HOUR);
        assert!(token.is_expired());
        assert_eq!(token.remaining(), Duration::ZERO);
    }

    #[test_case("abc123"; "opaque")]
    #[test_case("a.b"; "two parts")]
    #[test_case("a.b.c.d"; "four parts")]
    #[test_case("a.!!!.c"; "bad base64")]
    #[test_case("a.eyJhIjoxfQ.c"; "no exp")]
    fn expiration_not_found(token: &str) {
        assert_eq!(token_expiration(token), None);
    }

    #[test]
    fn expiration_found() {
        let exp = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let token = generate_test_id_token(exp);
        assert_eq!(token_expiration(&token), Some(exp));
    }

    #[tokio::test]
    async fn debug() {
        let token = IdentityToken::new("token-test-only".into(), OffsetDateTime::now_utc() + HOUR);
        let got = format!("{token:?}");
        assert!(!got.contains("token-test-only"), "{got}");
        assert!(got.contains("token: \"[censored]\""), "{got}");
        assert!(got.contains("expires_at"), "{got}");
    }
}
