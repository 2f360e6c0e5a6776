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

//! Errors created during client construction and configuration.

use crate::errors::{CredentialError, SigningError};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type for [Client] builders and [Config] loading.
///
/// [Client]: crate::client::Client
/// [Config]: crate::config::Config
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    /// A required setting was not provided.
    pub fn is_missing_field(&self) -> bool {
        matches!(self.0, ErrorKind::MissingField(_))
    }

    /// A setting was provided, but its value is invalid.
    pub fn is_invalid_value(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidValue { .. })
    }

    /// The service account key could not be loaded.
    pub fn is_credential(&self) -> bool {
        matches!(self.0, ErrorKind::Credential(_))
    }

    /// The service account key cannot sign assertions.
    pub fn is_invalid_key(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidKey(_))
    }

    /// A required setting was not provided.
    pub(crate) fn missing_field(field: &'static str) -> Error {
        Error(ErrorKind::MissingField(field))
    }

    /// The value for `field` is invalid.
    pub(crate) fn invalid_value<T>(field: &'static str, source: T) -> Error
    where
        T: Into<BoxError>,
    {
        Error(ErrorKind::InvalidValue {
            field,
            source: source.into(),
        })
    }
}

impl From<CredentialError> for Error {
    fn from(value: CredentialError) -> Self {
        Error(ErrorKind::Credential(value))
    }
}

impl From<SigningError> for Error {
    fn from(value: SigningError) -> Self {
        Error(ErrorKind::InvalidKey(value))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {source}")]
    InvalidValue {
        field: &'static str,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Credential(CredentialError),
    #[error(transparent)]
    InvalidKey(SigningError),
}
