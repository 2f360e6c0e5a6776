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

//! Signed JWT assertions for the [JWT bearer grant].
//!
//! An assertion is a compact JWS: `header.claims.signature`, where each
//! segment is base64url encoded without padding. The header is always
//! `{"alg":"RS256","typ":"JWT"}` and the signature is RSASSA-PKCS1-v1_5 with
//! SHA-256 over the UTF-8 bytes of `header.claims`.
//!
//! Nothing in this module performs network I/O. The pieces are exposed
//! separately so each one can be verified on its own:
//!
//! ```
//! # use chat_auth::assertion::{AssertionClaims, signing_input};
//! # use time::OffsetDateTime;
//! let claims = AssertionClaims::new(
//!     "sa@example.iam.gserviceaccount.com",
//!     "https://oauth2.googleapis.com/token",
//!     "https://analysis.example.com",
//!     OffsetDateTime::now_utc(),
//! );
//! let input = signing_input(&claims)?;
//! assert!(input.starts_with("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9."));
//! # Ok::<(), chat_auth::errors::SigningError>(())
//! ```
//!
//! [JWT bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523

use crate::constants::MIN_RSA_KEY_BITS;
use crate::credentials::ServiceAccountCredential;
use crate::errors::SigningError;
use crate::jws::RS256_HEADER;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use rsa::pkcs1::{ALGORITHM_OID, RsaPrivateKey};
use rsa::pkcs8::PrivateKeyInfo;
use rustls::SignatureScheme;
use rustls::crypto::{CryptoProvider, KeyProvider};
use rustls::sign::Signer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::pem::PemObject;
use time::OffsetDateTime;

pub use crate::jws::AssertionClaims;

type Result<T> = std::result::Result<T, SigningError>;

/// A signed assertion, ready to be exchanged for an ID token.
///
/// The assertion proves the identity of the service account, treat it as a
/// secret. It is consumed by the exchange and is never reused: its `iat` and
/// `exp` claims are specific to one attempt.
pub struct SignedAssertion {
    value: String,
    expires_at: OffsetDateTime,
}

impl SignedAssertion {
    /// The compact `header.claims.signature` representation.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The value of the `exp` claim.
    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }
}

impl std::fmt::Debug for SignedAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedAssertion")
            .field("value", &"[censored]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Creates a signed assertion for `credential`.
///
/// The claims are issued at `now` and expire one hour later. The `aud` claim
/// is `token_endpoint`; `target_audience` is the URL the exchanged ID token
/// must be valid for.
pub fn build(
    credential: &ServiceAccountCredential,
    token_endpoint: &str,
    target_audience: &str,
    now: OffsetDateTime,
) -> Result<SignedAssertion> {
    let claims = AssertionClaims::new(
        credential.client_email(),
        token_endpoint,
        target_audience,
        now,
    );
    RsaSigner::from_pem(credential.private_key())?.sign_claims(&claims)
}

/// Returns the `header.claims` string that is signed.
pub fn signing_input(claims: &AssertionClaims) -> Result<String> {
    Ok(format!("{}.{}", RS256_HEADER.encode()?, claims.encode()?))
}

/// Signs with RSASSA-PKCS1-v1_5 and SHA-256.
pub struct RsaSigner {
    inner: Box<dyn Signer>,
}

impl RsaSigner {
    /// Imports a PEM encoded PKCS#8 RSA private key.
    ///
    /// RSA keys must be at least 2048 bits.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = PrivateKeyDer::from_pem_slice(pem.as_bytes()).map_err(SigningError::invalid_key)?;
        let PrivateKeyDer::Pkcs8(pkcs8) = &key else {
            return Err(unexpected_private_key_error(&key));
        };
        check_rsa_key_size(pkcs8.secret_pkcs8_der())?;
        let signing_key = key_provider()?
            .load_private_key(key)
            .map_err(SigningError::invalid_key)?;
        let inner = signing_key
            .choose_scheme(&[SignatureScheme::RSA_PKCS1_SHA256])
            .ok_or_else(|| {
                SigningError::invalid_key(
                    "unable to choose RSA_PKCS1_SHA256 signing scheme, is this an RSA key?",
                )
            })?;
        Ok(Self { inner })
    }

    /// Signs `input` and returns the base64url encoded signature.
    pub fn sign(&self, input: &str) -> Result<String> {
        let signature = self
            .inner
            .sign(input.as_bytes())
            .map_err(SigningError::sign_failed)?;
        Ok(BASE64_URL_SAFE_NO_PAD.encode(signature))
    }

    /// Signs `claims` and returns the compact assertion.
    pub fn sign_claims(&self, claims: &AssertionClaims) -> Result<SignedAssertion> {
        let input = signing_input(claims)?;
        let signature = self.sign(&input)?;
        Ok(SignedAssertion {
            value: format!("{input}.{signature}"),
            expires_at: claims.exp,
        })
    }
}

impl std::fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigner")
            .field("scheme", &self.inner.scheme())
            .finish()
    }
}

fn key_provider() -> Result<&'static dyn KeyProvider> {
    #[cfg(feature = "default-rustls-provider")]
    let fallback = Some(rustls::crypto::aws_lc_rs::default_provider().key_provider);
    #[cfg(not(feature = "default-rustls-provider"))]
    let fallback = None;

    CryptoProvider::get_default()
        .map(|p| p.key_provider)
        .or(fallback)
        .ok_or_else(|| {
            SigningError::invalid_key(
                "no rustls crypto provider, call `rustls::crypto::CryptoProvider::install_default()`",
            )
        })
}

// Keys that are not RSA are left to the key provider.
fn check_rsa_key_size(pkcs8_der: &[u8]) -> Result<()> {
    match rsa_modulus_bits(pkcs8_der) {
        Some(bits) if bits < MIN_RSA_KEY_BITS => Err(SigningError::invalid_key(format!(
            "RSA keys must be at least {MIN_RSA_KEY_BITS} bits, found {bits} bits"
        ))),
        _ => Ok(()),
    }
}

fn rsa_modulus_bits(pkcs8_der: &[u8]) -> Option<usize> {
    let info = PrivateKeyInfo::try_from(pkcs8_der).ok()?;
    if info.algorithm.oid != ALGORITHM_OID {
        return None;
    }
    let key = RsaPrivateKey::try_from(info.private_key).ok()?;
    let modulus = key.modulus.as_bytes();
    let leading_zeros = modulus.first().map_or(0, |b| b.leading_zeros() as usize);
    Some(modulus.len() * 8 - leading_zeros)
}

fn unexpected_private_key_error(key: &PrivateKeyDer<'_>) -> SigningError {
    let found = match key {
        PrivateKeyDer::Pkcs1(_) => "PKCS#1",
        PrivateKeyDer::Sec1(_) => "SEC1",
        _ => "an unknown format",
    };
    SigningError::invalid_key(format!(
        "expected key to be in form of PKCS#8, found {found}"
    ))
}
