// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error kinds shared across the discovery client, version database,
//! and download coordinator (see spec §7).

use std::time::SystemTime;

/// A process exit code, per the table in spec §6.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG_ERROR: i32 = 2;
pub const EXIT_STORAGE_ERROR: i32 = 3;
pub const EXIT_CREDENTIAL_ERROR: i32 = 4;
pub const EXIT_CANCELLED: i32 = 5;
pub const EXIT_OTHER_FAILURE: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("credential missing: {0}")]
    CredentialMissing(String),

    #[error("credential rejected by upstream: {0}")]
    CredentialRejected(String),

    #[error("rate limited, reset at {reset_at:?}")]
    RateLimited { reset_at: Option<SystemTime> },

    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("verification mismatch: {0}")]
    VerificationMismatch(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    /// Map this error to the process exit code it should produce when
    /// the core is invoked standalone, per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::ConfigInvalid(_) => EXIT_CONFIG_ERROR,
            CoreError::StorageUnavailable(_) | CoreError::StorageCorrupt(_) => {
                EXIT_STORAGE_ERROR
            }
            CoreError::CredentialMissing(_) | CoreError::CredentialRejected(_) => {
                EXIT_CREDENTIAL_ERROR
            }
            CoreError::Cancelled => EXIT_CANCELLED,
            CoreError::RateLimited { .. }
            | CoreError::Transient(_)
            | CoreError::NotFound(_)
            | CoreError::VerificationMismatch(_) => EXIT_OTHER_FAILURE,
        }
    }
}
