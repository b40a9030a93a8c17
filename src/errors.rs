use std::io;

use rusoto_core::RusotoError;
use rusoto_s3::{GetObjectError, PutObjectError};
use thiserror::Error;
use uuid::Uuid;

use crate::store::BlobId;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents an error from the blob store.
    #[error(transparent)]
    Store {
        #[from]
        source: StoreError,
    },

    /// Represents a report ID that does not resolve.
    #[error("Report {0} not found")]
    ReportNotFound(String),

    /// Represents a form submission that could not be read at all.
    #[error("Malformed form submission")]
    MalformedFormSubmission,

    /// Represents a required form field that was not submitted.
    #[error("Missing field {0}")]
    MissingField(&'static str),

    /// Represents a form field whose value could not be parsed.
    #[error("Invalid value {value:?} for field {name}")]
    InvalidField { name: &'static str, value: String },

    /// Represents an error creating a public URL.
    #[error("Failed to generate URL")]
    FailedToGenerateUrl { source: url::ParseError },
}

impl BackendError {
    /// Whether this error means the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::ReportNotFound(_)
                | BackendError::Store {
                    source: StoreError::NotFound(_)
                }
        )
    }

    pub fn report_not_found(id: &Uuid) -> Self {
        BackendError::ReportNotFound(id.to_string())
    }
}

/// Enumerates errors returned by the store subsystem.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Represents a blob ID that is unknown or malformed.
    #[error("Blob {0} not found")]
    NotFound(BlobId),

    /// Represents an error reading the content to upload.
    #[error("Content could not be read")]
    ContentUnreadable { source: io::Error },

    /// Represents an error returned by the remote server when uploading.
    #[error("Upload error")]
    UploadFailed { source: RusotoError<PutObjectError> },

    /// Represents an error returned by the remote server when downloading.
    #[error("Download error")]
    DownloadFailed { source: RusotoError<GetObjectError> },

    /// Represents an object that exists but came back without a body.
    #[error("Blob {0} has no body")]
    MissingBody(BlobId),
}
