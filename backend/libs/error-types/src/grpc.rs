//! gRPC wire representation of error codes
//!
//! An [`ErrorCode`] is rendered as a `tonic::Status` whose binary details
//! carry an [`ErrorDetail`] message (`grpc-status-details-bin` on the wire).
//! The code is mirrored into the `x-error-code` metadata entry for clients
//! that do not decode details.

use bytes::Bytes;
use prost::Message;
use tonic::{Code, Status};

use crate::ErrorCode;

/// Metadata key mirroring the application error code
pub const ERROR_CODE_HEADER: &str = "x-error-code";

/// Structured detail attached to every rendered status
#[derive(Clone, PartialEq, Message)]
pub struct ErrorDetail {
    #[prost(string, tag = "1")]
    pub code: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl ErrorDetail {
    /// Decode the detail payload, if `status` carries one.
    ///
    /// Statuses without details, or with details in another format, yield `None`.
    pub fn from_status(status: &Status) -> Option<Self> {
        let details = status.details();
        if details.is_empty() {
            return None;
        }

        match Self::decode(details) {
            Ok(detail) if !detail.code.is_empty() => Some(detail),
            _ => None,
        }
    }
}

impl ErrorCode {
    /// Render as a protocol status carrying the code and message as detail.
    ///
    /// The wrapped cause is never included.
    pub fn to_status(&self) -> Status {
        let detail = ErrorDetail {
            code: self.code().to_string(),
            message: self.message().to_string(),
        };

        Status::with_details(
            self.status(),
            self.message(),
            Bytes::from(detail.encode_to_vec()),
        )
        .with_error_code(self.code())
    }
}

impl From<ErrorCode> for Status {
    fn from(code: ErrorCode) -> Self {
        code.to_status()
    }
}

/// Extension trait for reading and writing the error code metadata entry
pub trait StatusExt {
    /// Add error code for client handling
    fn with_error_code(self, code: &str) -> Self;

    /// Error code mirrored in metadata, if any
    fn error_code(&self) -> Option<&str>;
}

impl StatusExt for Status {
    fn with_error_code(mut self, code: &str) -> Self {
        if let Ok(value) = code.parse() {
            self.metadata_mut().insert(ERROR_CODE_HEADER, value);
        }
        self
    }

    fn error_code(&self) -> Option<&str> {
        self.metadata()
            .get(ERROR_CODE_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}

/// Upper snake case name of a status code, e.g. `UNAUTHENTICATED`.
pub fn canonical_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}
