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

use std::time::Duration;

/// JWT Bearer OAuth Grant Type
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub(crate) const OAUTH2_TOKEN_SERVER_URL: &str = "https://oauth2.googleapis.com/token";

// Lifetime of a signed assertion, measured from its `iat` claim.
pub(crate) const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

// Services reject assertions with `iat` in the future. Machines have some
// amount of clock skew, so assertions are backdated by this margin.
pub(crate) const CLOCK_SKEW_FUDGE: Duration = Duration::from_secs(10);

// Cached ID tokens are refreshed once they have less than this left.
pub(crate) const TOKEN_REFRESH_SLACK: Duration = Duration::from_secs(60);

// Smallest RSA modulus accepted for signing assertions.
pub(crate) const MIN_RSA_KEY_BITS: usize = 2048;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// Upper bound, in characters, for response bodies kept in errors.
pub(crate) const BODY_EXCERPT_LIMIT: usize = 256;
