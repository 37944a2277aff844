//! Request model and per-attempt cloning.
//!
//! Racing a request means an unknowable number of attempts may each need
//! their own copy of the body, so the body is captured once as bytes and
//! clones read from that buffer. Requests with no body keep the explicit
//! empty-body sentinel through cloning instead of picking up a zero-length
//! buffer.

use std::fmt;
use std::sync::Mutex;

use bytes::Bytes;
use http::{Method, Uri};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Header identifying the calling application on every attempt.
pub const HEADER_APP: &str = "X-Kindling-App";

/// Header identifying which transport carried the attempt.
pub const HEADER_METHOD: &str = "X-Kindling-Method";

/// Request body.
pub enum Body {
    /// No body. This is a sentinel, distinct from a zero-length buffer.
    Empty,
    /// Fully buffered body.
    Bytes(Bytes),
    /// Caller-supplied stream, buffered by the race engine before dispatch.
    Stream(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl Body {
    /// Whether this body is the empty-body sentinel.
    pub fn is_empty_sentinel(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Declared length, when knowable without reading.
    pub fn len(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(b) => Some(b.len() as u64),
            Body::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(b))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

/// An HTTP request as seen by the race engine and transports.
///
/// Headers are an ordered list of pairs; adding a header never overwrites
/// one the caller already set. The cancellation token is the caller's
/// request context: cancelling it aborts the race and every in-flight
/// attempt derived from it.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub cancel: CancellationToken,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            body: Body::Empty,
            cancel: CancellationToken::new(),
        }
    }

    /// Declared content length: the body's own length when buffered,
    /// otherwise whatever Content-Length header the caller set.
    pub fn content_length(&self) -> Option<u64> {
        if let Some(len) = self.body.len() {
            return Some(len);
        }
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// First header value matching `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// One clone at a time across the process; workers clone concurrently while
// the original request is shared.
static CLONE_LOCK: Mutex<()> = Mutex::new(());

/// Produce an independent per-attempt copy of `req`.
///
/// The clone shares the URL and method, gets its own header list with the
/// two diagnostic headers appended, and reads its body from `body_bytes`.
/// A source request carrying the empty-body sentinel yields a clone that
/// still carries the sentinel.
pub(crate) fn clone_request(
    req: &Request,
    app_name: &str,
    transport_name: &str,
    body_bytes: &Bytes,
) -> Request {
    let _guard = CLONE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let mut headers = req.headers.clone();
    headers.push((HEADER_APP.to_string(), app_name.to_string()));
    headers.push((HEADER_METHOD.to_string(), transport_name.to_string()));

    let body = if req.body.is_empty_sentinel() {
        Body::Empty
    } else {
        Body::Bytes(body_bytes.clone())
    };

    Request {
        method: req.method.clone(),
        uri: req.uri.clone(),
        headers,
        body,
        cancel: req.cancel.clone(),
    }
}
