// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the control plane.
//!
//! Errors are classified by kind so the RPC boundary can map them to
//! status codes: `INVALID_ARGUMENT`, `NOT_FOUND`, `FAILED_PRECONDITION`,
//! and `INTERNAL`.

use thiserror::Error;
use uuid::Uuid;

/// Result type using ControlError.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Control plane errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControlError {
    /// Caller-visible bad input.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// Scan was not found.
    #[error("scan '{0}' not found")]
    ScanNotFound(Uuid),

    /// Some other entity was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Write violates uniqueness or a precondition.
    #[error("{0}")]
    Conflict(String),

    /// Workload manager call failed.
    #[error("workload manager error: {0}")]
    Workload(#[from] crate::workload::WorkloadError),

    /// Blob service call failed.
    #[error("storage service error: {0}")]
    Storage(#[from] crate::blobstore::StorageError),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Programming error or unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// RPC status code for this error.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "INVALID_ARGUMENT",
            Self::ScanNotFound(_) | Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "FAILED_PRECONDITION",
            Self::Workload(_) | Self::Storage(_) | Self::Database(_) | Self::Internal(_) => {
                "INTERNAL"
            }
        }
    }
}

impl From<sqlx::Error> for ControlError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::DatabaseError;

        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    return ControlError::Conflict(db_err.to_string());
                }
                sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::NotNullViolation => {
                    return ControlError::Invalid(db_err.to_string());
                }
                _ => {}
            }
        }
        ControlError::Database(err.to_string())
    }
}
