//! Per-call request context
//!
//! A [`RequestContext`] is created once per inbound call, handed by value down
//! the stage chain and finally to the handler. Stages enrich it through
//! set-once slots; nothing already attached can be overwritten.

use crate::client::OutboundInterceptor;
use crypto_core::Claims;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use uuid::Uuid;

/// Metadata key carrying the trace id in both directions.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Metadata key carrying the bearer credential.
pub const AUTHORIZATION_HEADER: &str = "authorization";

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";
const MAX_TRACE_ID_LEN: usize = 128;

/// Correlation identifier for one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a caller-supplied id if it is non-empty printable ASCII of at
    /// most 128 characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_TRACE_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_graphic());
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn to_metadata_value(&self) -> Option<AsciiMetadataValue> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Headers the chain wants on the response, whatever the outcome.
///
/// Shared between the context and the chain boundary, which copies the
/// entries onto the outgoing response or status.
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    entries: Arc<Mutex<Vec<(&'static str, AsciiMetadataValue)>>>,
}

impl ResponseMetadata {
    /// Record `key` unless it is already present. Returns whether it was stored.
    pub fn insert(&self, key: &'static str, value: AsciiMetadataValue) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|(existing, _)| *existing == key) {
            return false;
        }
        entries.push((key, value));
        true
    }

    pub fn get(&self, key: &str) -> Option<AsciiMetadataValue> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, value)| value.clone())
    }

    pub fn apply_to(&self, target: &mut MetadataMap) {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries.iter() {
            target.insert(*key, value.clone());
        }
    }
}

/// Request-scoped data visible to every stage and to the handler.
#[derive(Debug)]
pub struct RequestContext {
    method: Arc<str>,
    metadata: MetadataMap,
    deadline: Option<Instant>,
    trace_id: Option<TraceId>,
    claims: Option<Claims>,
    response: ResponseMetadata,
}

impl RequestContext {
    /// Build the context for a call to the fully qualified `method`.
    pub fn new(method: impl Into<Arc<str>>, metadata: MetadataMap) -> Self {
        let deadline = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(|timeout| Instant::now() + timeout);

        Self {
            method: method.into(),
            metadata,
            deadline,
            trace_id: None,
            claims: None,
            response: ResponseMetadata::default(),
        }
    }

    /// Fully qualified method name, e.g. `/user.v1.UserService/Login`
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Inbound metadata as received
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the caller's deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Claims of the authenticated caller, absent on whitelisted routes.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Returns `false` and keeps the existing id if one is already attached.
    pub fn attach_trace_id(&mut self, trace_id: TraceId) -> bool {
        if self.trace_id.is_some() {
            return false;
        }
        self.trace_id = Some(trace_id);
        true
    }

    /// Returns `false` and keeps the existing claims if already attached.
    pub fn attach_claims(&mut self, claims: Claims) -> bool {
        if self.claims.is_some() {
            return false;
        }
        self.claims = Some(claims);
        true
    }

    pub fn response_metadata(&self) -> &ResponseMetadata {
        &self.response
    }

    /// Metadata to send on outbound calls made while serving this request.
    pub fn outgoing_metadata(&self) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        if let Some(value) = self.trace_id.as_ref().and_then(TraceId::to_metadata_value) {
            metadata.insert(TRACE_ID_HEADER, value);
        }
        metadata
    }

    /// Copy the trace id onto an outbound request.
    pub fn propagate<T>(&self, request: &mut tonic::Request<T>) {
        if let Some(value) = self.trace_id.as_ref().and_then(TraceId::to_metadata_value) {
            request.metadata_mut().insert(TRACE_ID_HEADER, value);
        }
    }

    /// Client interceptor carrying this request's trace id.
    pub fn outbound_interceptor(&self) -> OutboundInterceptor {
        match &self.trace_id {
            Some(trace_id) => OutboundInterceptor::new().with_trace_id(trace_id),
            None => OutboundInterceptor::new(),
        }
    }
}

/// Parse a `grpc-timeout` value: up to eight digits followed by a unit.
fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    if !raw.is_ascii() || raw.len() < 2 || raw.len() > 9 {
        return None;
    }

    let (digits, unit) = raw.split_at(raw.len() - 1);
    let value: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(value * 3600),
        "M" => Duration::from_secs(value * 60),
        "S" => Duration::from_secs(value),
        "m" => Duration::from_millis(value),
        "u" => Duration::from_micros(value),
        "n" => Duration::from_nanos(value),
        _ => return None,
    };
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claims(subject_id: i64) -> Claims {
        Claims {
            subject_id,
            subject_name: "alice".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_trace_id_validation() {
        assert!(TraceId::parse("abc-123").is_some());
        assert!(TraceId::parse("").is_none());
        assert!(TraceId::parse("has space").is_none());
        assert!(TraceId::parse(&"x".repeat(129)).is_none());
        assert!(TraceId::parse(&"x".repeat(128)).is_some());
    }

    #[test]
    fn test_generated_trace_ids_are_distinct() {
        assert_ne!(TraceId::generate(), TraceId::generate());
    }

    #[test]
    fn test_slots_are_set_once() {
        let mut ctx = RequestContext::new("/svc/Method", MetadataMap::new());

        assert!(ctx.attach_trace_id(TraceId::parse("first").unwrap()));
        assert!(!ctx.attach_trace_id(TraceId::parse("second").unwrap()));
        assert_eq!(ctx.trace_id().unwrap().as_str(), "first");

        assert!(ctx.attach_claims(claims(1)));
        assert!(!ctx.attach_claims(claims(2)));
        assert_eq!(ctx.claims().unwrap().subject_id, 1);
    }

    #[test]
    fn test_deadline_from_grpc_timeout() {
        let mut metadata = MetadataMap::new();
        metadata.insert("grpc-timeout", "5S".parse().unwrap());
        let ctx = RequestContext::new("/svc/Method", metadata);

        let remaining = ctx.remaining().expect("deadline set");
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }

    #[test]
    fn test_grpc_timeout_parsing() {
        assert_eq!(parse_grpc_timeout("100m"), Some(Duration::from_millis(100)));
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10x"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[test]
    fn test_outgoing_metadata_carries_trace_id() {
        let mut ctx = RequestContext::new("/svc/Method", MetadataMap::new());
        assert!(ctx.outgoing_metadata().get(TRACE_ID_HEADER).is_none());

        ctx.attach_trace_id(TraceId::parse("trace-1").unwrap());
        let mut request = tonic::Request::new(());
        ctx.propagate(&mut request);

        assert_eq!(
            request.metadata().get(TRACE_ID_HEADER).unwrap().to_str().unwrap(),
            "trace-1"
        );
    }

    #[test]
    fn test_response_metadata_keeps_first_value() {
        let response = ResponseMetadata::default();
        assert!(response.insert(TRACE_ID_HEADER, "a".parse().unwrap()));
        assert!(!response.insert(TRACE_ID_HEADER, "b".parse().unwrap()));

        let mut target = MetadataMap::new();
        response.apply_to(&mut target);
        assert_eq!(target.get(TRACE_ID_HEADER).unwrap().to_str().unwrap(), "a");
    }
}
