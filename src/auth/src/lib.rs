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

//! Service account authentication for the chat analysis backend.
//!
//! The chat feature forwards user questions to an analysis service that only
//! accepts requests carrying an [OIDC ID token]. This crate obtains such
//! tokens without any user present: it signs a JWT assertion with a
//! [service account] private key, exchanges the assertion for an ID token
//! using the [JWT bearer grant], and calls the protected endpoint with the ID
//! token as a bearer credential.
//!
//! Each stage is usable on its own:
//!
//! * [credentials::ServiceAccountCredential] parses the service account key.
//! * [assertion::build] creates the signed assertion. It never touches the
//!   network.
//! * [exchange::TokenExchangeClient] trades the assertion for an ID token.
//! * [invoker::DownstreamInvoker] calls the protected endpoint.
//!
//! Most applications use the [client::Client] facade, which runs the stages
//! in order, and the [chat] module, which maps inbound chat payloads to
//! user-facing replies.
//!
//! [OIDC ID token]: https://cloud.google.com/docs/authentication/token-types#identity-tokens
//! [service account]: https://cloud.google.com/iam/docs/service-account-overview
//! [JWT bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523

pub mod assertion;
pub mod build_errors;
pub mod chat;
pub mod client;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod exchange;
pub mod invoker;
pub mod token;

pub(crate) mod constants;
pub(crate) mod jws;
pub(crate) mod token_cache;

/// A `Result` alias where the `Err` case is `chat_auth::errors::Error`.
pub type Result<T> = std::result::Result<T, crate::errors::Error>;

/// A `Result` alias where the `Err` case is `chat_auth::build_errors::Error`.
pub type BuildResult<T> = std::result::Result<T, crate::build_errors::Error>;

pub use errors::Error;
