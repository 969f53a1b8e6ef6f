use common::Error;
use serde::Serialize;
use std::fmt;

use super::record::MetadataRecord;

/// Why a single key did not produce a record. None of these abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    NotFound,
    AccessDenied,
    Timeout,
    Transient,
    MalformedJson,
    NotAnObject,
    Oversized,
    DeadlineExceeded,
}

impl FailureKind {
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::NotFound(_) => FailureKind::NotFound,
            Error::AccessDenied(_) => FailureKind::AccessDenied,
            Error::Timeout(_) => FailureKind::Timeout,
            Error::Json(_) => FailureKind::MalformedJson,
            _ => FailureKind::Transient,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Transient)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::NotFound => "not-found",
            FailureKind::AccessDenied => "access-denied",
            FailureKind::Timeout => "timeout",
            FailureKind::Transient => "transient",
            FailureKind::MalformedJson => "malformed-json",
            FailureKind::NotAnObject => "not-an-object",
            FailureKind::Oversized => "oversized",
            FailureKind::DeadlineExceeded => "deadline-exceeded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub key: String,
    pub kind: FailureKind,
    pub detail: String,
    /// GET attempts made. Zero when the key was rejected before download or
    /// abandoned at the run deadline.
    pub attempts: u32,
    pub bytes_read: u64,
}

impl RecordFailure {
    pub fn new(key: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            detail: detail.into(),
            attempts: 0,
            bytes_read: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_bytes_read(mut self, bytes_read: u64) -> Self {
        self.bytes_read = bytes_read;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(MetadataRecord),
    Failure(RecordFailure),
}

impl FetchOutcome {
    pub fn key(&self) -> &str {
        match self {
            FetchOutcome::Success(record) => &record.metadata_key,
            FetchOutcome::Failure(failure) => &failure.key,
        }
    }

    /// Bytes downloaded while producing this outcome.
    pub fn bytes(&self) -> u64 {
        match self {
            FetchOutcome::Success(record) => record.size_bytes,
            FetchOutcome::Failure(failure) => failure.bytes_read,
        }
    }
}
