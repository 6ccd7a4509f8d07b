//! Error code registry shared by the user service and its interceptors
//!
//! Every domain failure is described by an [`ErrorCode`]: a stable machine
//! code, a message that is safe to hand to callers, and a coarse gRPC status.
//! Codes are registered once on an [`ErrorRegistry`] while the process starts
//! and are then passed by value to whatever raises or classifies them.
//!
//! # Design Principles
//!
//! 1. **Single catalog**: a code string can be registered exactly once
//! 2. **Immutable values**: `with_message` and `with_cause` derive new codes
//! 3. **No leakage**: the wrapped cause is for server logs, never the wire
//! 4. **Total classification**: any error maps to some code without panicking

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tonic::{Code, Status};

pub mod grpc;
pub mod http;

pub use grpc::{canonical_name, ErrorDetail, StatusExt, ERROR_CODE_HEADER};
pub use http::{http_status_from_code, ErrorBody};

/// Code of the designated fallback for unclassified failures.
pub const INTERNAL: &str = "INTERNAL";

/// Code reserved for failures whose origin could not be determined.
pub const UNKNOWN: &str = "UNKNOWN";

/// Coarse taxonomy used for log levels and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, missing or invalid credentials, absent or duplicate resources
    Client,
    /// Unexpected failures, hashing failures, recovered panics
    Internal,
    /// Dependency failures; currently reported as [`ErrorKind::Internal`]
    ThirdParty,
}

impl ErrorKind {
    pub fn from_code(code: Code) -> Self {
        match code {
            Code::InvalidArgument
            | Code::NotFound
            | Code::AlreadyExists
            | Code::PermissionDenied
            | Code::Unauthenticated
            | Code::FailedPrecondition
            | Code::OutOfRange
            | Code::ResourceExhausted
            | Code::Cancelled => ErrorKind::Client,
            _ => ErrorKind::Internal,
        }
    }
}

/// A classified failure.
///
/// Cloning is cheap: the code and message are shared, and the optional cause
/// sits behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ErrorCode {
    code: Arc<str>,
    message: Arc<str>,
    status: Code,
    registered: bool,
    cause: Option<Arc<anyhow::Error>>,
}

impl ErrorCode {
    fn new(code: &str, message: &str, status: Code, registered: bool) -> Self {
        Self {
            code: Arc::from(code),
            message: Arc::from(message),
            status,
            registered,
            cause: None,
        }
    }

    /// Stable machine-readable identifier
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Caller-safe message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// gRPC status this code is rendered with
    pub fn status(&self) -> Code {
        self.status
    }

    /// `false` for codes synthesized from foreign statuses
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Original error retained for diagnostics
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.status)
    }

    /// Same code and status, different caller-facing message.
    pub fn with_message(&self, message: impl Into<String>) -> Self {
        let mut derived = self.clone();
        derived.message = Arc::from(message.into());
        derived
    }

    /// Same code, status and message, carrying `cause` for server-side logs.
    pub fn with_cause<E>(&self, cause: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        let mut derived = self.clone();
        derived.cause = Some(Arc::new(cause.into()));
        derived
    }

    /// Identity comparison on the code string.
    pub fn is(&self, other: &ErrorCode) -> bool {
        self.code == other.code
    }

    /// Log with a level matching the taxonomy.
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::Client => {
                tracing::debug!(code = %self.code, message = %self.message, "Client error");
            }
            ErrorKind::Internal | ErrorKind::ThirdParty => match &self.cause {
                Some(cause) => {
                    tracing::error!(code = %self.code, cause = ?cause, "Internal error");
                }
                None => {
                    tracing::error!(code = %self.code, message = %self.message, "Internal error");
                }
            },
        }
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl Eq for ErrorCode {}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorCode {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| &**cause as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("error code {0} is already registered")]
    Duplicate(String),
}

/// Catalog of every registered [`ErrorCode`].
///
/// Built mutably during startup, then shared read-only (usually behind an
/// `Arc`) by the components that classify errors.
#[derive(Debug)]
pub struct ErrorRegistry {
    codes: HashMap<Arc<str>, ErrorCode>,
    internal: ErrorCode,
}

impl Default for ErrorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorRegistry {
    /// Create a registry holding the generic `INTERNAL` and `UNKNOWN` codes.
    pub fn new() -> Self {
        let internal = ErrorCode::new(INTERNAL, "internal error", Code::Internal, true);
        let unknown = ErrorCode::new(UNKNOWN, "unknown error", Code::Unknown, true);

        let mut codes = HashMap::new();
        codes.insert(Arc::clone(&internal.code), internal.clone());
        codes.insert(Arc::clone(&unknown.code), unknown);

        Self { codes, internal }
    }

    /// Register a code, reporting duplicates to the caller.
    pub fn try_register(
        &mut self,
        code: &str,
        message: &str,
        status: Code,
    ) -> Result<ErrorCode, RegistryError> {
        if self.codes.contains_key(code) {
            return Err(RegistryError::Duplicate(code.to_string()));
        }

        let error_code = ErrorCode::new(code, message, status, true);
        self.codes
            .insert(Arc::clone(&error_code.code), error_code.clone());
        Ok(error_code)
    }

    /// Register a code.
    ///
    /// # Panics
    ///
    /// Panics when `code` is already registered. Codes form a fixed catalog
    /// built at startup, so a duplicate is a programming error.
    pub fn register(&mut self, code: &str, message: &str, status: Code) -> ErrorCode {
        match self.try_register(code, message, status) {
            Ok(error_code) => error_code,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn get(&self, code: &str) -> Option<&ErrorCode> {
        self.codes.get(code)
    }

    /// The designated fallback for unclassified failures.
    pub fn internal(&self) -> &ErrorCode {
        &self.internal
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Classify an arbitrary error.
    ///
    /// 1. An [`ErrorCode`] anywhere in the chain is returned unchanged.
    /// 2. A foreign [`Status`] becomes a transient code (see [`Self::from_status`]).
    /// 3. Anything else becomes [`Self::internal`] wrapping `err` as its cause.
    pub fn from_error(&self, err: anyhow::Error) -> ErrorCode {
        if let Some(code) = find_code(&err) {
            return code.clone();
        }
        if let Some(status) = find_status(&err) {
            return self.from_status(status);
        }
        self.internal.with_cause(err)
    }

    /// Classify a status received from the wire.
    ///
    /// A status rendered by [`ErrorCode::to_status`] keeps its code; others get
    /// the canonical status name as a transient, unregistered code.
    pub fn from_status(&self, status: &Status) -> ErrorCode {
        match ErrorDetail::from_status(status) {
            Some(detail) => match self.get(&detail.code) {
                Some(registered) if registered.message() == detail.message => registered.clone(),
                Some(registered) => registered.with_message(detail.message),
                None => ErrorCode::new(&detail.code, &detail.message, status.code(), false),
            },
            None => ErrorCode::new(
                canonical_name(status.code()),
                status.message(),
                status.code(),
                false,
            ),
        }
    }

    /// Status code `err` would be rendered with, without consuming it.
    pub fn status_code_of(&self, err: &anyhow::Error) -> Code {
        if let Some(code) = find_code(err) {
            return code.status();
        }
        if let Some(status) = find_status(err) {
            return status.code();
        }
        self.internal.status()
    }

    /// Render an error for the wire.
    ///
    /// A top-level [`Status`] has already been rendered and passes through.
    pub fn into_status(&self, err: anyhow::Error) -> Status {
        match err.downcast::<Status>() {
            Ok(status) => status,
            Err(err) => self.from_error(err).to_status(),
        }
    }
}

fn find_code(err: &anyhow::Error) -> Option<&ErrorCode> {
    err.chain().find_map(|e| e.downcast_ref::<ErrorCode>())
}

fn find_status(err: &anyhow::Error) -> Option<&Status> {
    err.chain().find_map(|e| e.downcast_ref::<Status>())
}
