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

//! Load the client configuration from the environment.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `CHAT_AUTH_CREDENTIALS` | The service account key, as inline JSON. |
//! | `CHAT_AUTH_CREDENTIALS_FILE` | Path to the service account key file. Used if `CHAT_AUTH_CREDENTIALS` is not set. |
//! | `CHAT_AUTH_TARGET_URL` | Required. The downstream endpoint. |
//! | `CHAT_AUTH_TARGET_AUDIENCE` | The ID token audience, defaults to the target URL. |
//! | `CHAT_AUTH_TOKEN_URL` | The token endpoint, defaults to the `token_uri` in the key. |
//! | `CHAT_AUTH_TOKEN_CACHE` | `true` to reuse ID tokens across calls. Defaults to `false`. |
//! | `CHAT_AUTH_TIMEOUT_SECS` | Timeout for each network call. Defaults to 30. |
//!
//! Empty variables are treated as unset.

use crate::BuildResult;
use crate::assertion::RsaSigner;
use crate::build_errors::Error as BuilderError;
use crate::constants::DEFAULT_TIMEOUT;
use crate::credentials::ServiceAccountCredential;
use std::time::Duration;

pub const CREDENTIALS_VAR: &str = "CHAT_AUTH_CREDENTIALS";
pub const CREDENTIALS_FILE_VAR: &str = "CHAT_AUTH_CREDENTIALS_FILE";
pub const TARGET_URL_VAR: &str = "CHAT_AUTH_TARGET_URL";
pub const TARGET_AUDIENCE_VAR: &str = "CHAT_AUTH_TARGET_AUDIENCE";
pub const TOKEN_URL_VAR: &str = "CHAT_AUTH_TOKEN_URL";
pub const TOKEN_CACHE_VAR: &str = "CHAT_AUTH_TOKEN_CACHE";
pub const TIMEOUT_SECS_VAR: &str = "CHAT_AUTH_TIMEOUT_SECS";

/// Settings for a [Client][crate::client::Client].
#[derive(Clone, Debug)]
pub struct Config {
    pub credential: ServiceAccountCredential,
    pub target_url: String,
    pub target_audience: Option<String>,
    pub token_url: Option<String>,
    pub token_cache: bool,
    pub timeout: Duration,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// The service account key is loaded (and the key file read) here, and
    /// its private key is imported, so a bad key is reported before any call
    /// is made.
    pub async fn from_env() -> BuildResult<Config> {
        let credential = match (var(CREDENTIALS_VAR)?, var(CREDENTIALS_FILE_VAR)?) {
            (Some(raw), _) => ServiceAccountCredential::load(&raw)?,
            (None, Some(path)) => ServiceAccountCredential::from_file(path).await?,
            (None, None) => {
                return Err(BuilderError::missing_field(
                    "CHAT_AUTH_CREDENTIALS or CHAT_AUTH_CREDENTIALS_FILE",
                ));
            }
        };
        RsaSigner::from_pem(credential.private_key())?;

        let target_url =
            var(TARGET_URL_VAR)?.ok_or_else(|| BuilderError::missing_field(TARGET_URL_VAR))?;
        let target_url = validate_url(TARGET_URL_VAR, target_url)?;
        let token_url = var(TOKEN_URL_VAR)?
            .map(|u| validate_url(TOKEN_URL_VAR, u))
            .transpose()?;
        let token_cache = var(TOKEN_CACHE_VAR)?
            .map(|v| parse_bool(TOKEN_CACHE_VAR, &v))
            .transpose()?
            .unwrap_or(false);
        let timeout = var(TIMEOUT_SECS_VAR)?
            .map(|v| parse_timeout(TIMEOUT_SECS_VAR, &v))
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Config {
            credential,
            target_url,
            target_audience: var(TARGET_AUDIENCE_VAR)?,
            token_url,
            token_cache,
            timeout,
        })
    }
}

fn var(name: &'static str) -> BuildResult<Option<String>> {
    match std::env::var(name) {
        Ok(v) if v.is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(BuilderError::invalid_value(name, e)),
    }
}

/// Accepts absolute `http` and `https` URLs.
pub(crate) fn validate_url(field: &'static str, value: String) -> BuildResult<String> {
    let url = url::Url::parse(&value).map_err(|e| BuilderError::invalid_value(field, e))?;
    match url.scheme() {
        "http" | "https" => Ok(value),
        scheme => Err(BuilderError::invalid_value(
            field,
            format!("unsupported scheme `{scheme}`, expected `http` or `https`"),
        )),
    }
}

fn parse_bool(field: &'static str, value: &str) -> BuildResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BuilderError::invalid_value(
            field,
            format!("expected a boolean, got `{value}`"),
        )),
    }
}

fn parse_timeout(field: &'static str, value: &str) -> BuildResult<Duration> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| BuilderError::invalid_value(field, e))?;
    if secs == 0 {
        return Err(BuilderError::invalid_value(
            field,
            "the timeout must be greater than zero",
        ));
    }
    Ok(Duration::from_secs(secs))
}
