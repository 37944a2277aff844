//! The race transport: the round-tripper behind every kindling client.
//!
//! Connection establishment is fanned out to every eligible transport in
//! parallel, but requests are transmitted serially over one ready
//! connection at a time. Non-idempotent requests therefore reach the origin
//! at most once per successful run, while handshake latency is amortised
//! across every available path. Workers are cancelled as soon as a winner's
//! response is committed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use http::Uri;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::options::PanicListener;
use crate::registry::Registry;
use crate::request::{clone_request, Body, Request};
use crate::response::Response;
use crate::transport::{RoundTripper, Transport};

/// Deadline for requests with no body. Generous because some transports
/// (DNS tunnels, AMP relays) have large setup costs.
const BODYLESS_TIMEOUT: Duration = Duration::from_secs(80);

/// Deadline for requests carrying a payload.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(180);

/// Races the registered transports against a single request.
pub struct RaceTransport {
    registry: Arc<Registry>,
    panic_listener: PanicListener,
    app_name: String,
}

struct ReadyRoundTripper {
    round_tripper: Box<dyn RoundTripper>,
    name: String,
}

/// Counts failed connect and send attempts; when every fanned-out attempt
/// has failed, reports the terminal error carrying the last cause.
struct FailureCounter {
    failed: AtomicUsize,
    total: usize,
    err_tx: mpsc::Sender<Error>,
}

impl FailureCounter {
    fn record(&self, err: Error) {
        let failed = self.failed.fetch_add(1, Ordering::SeqCst) + 1;
        if failed == self.total {
            let _ = self
                .err_tx
                .try_send(Error::AllDialersFailed(err.to_string()));
        }
    }
}

impl RaceTransport {
    pub(crate) fn new(
        registry: Arc<Registry>,
        panic_listener: PanicListener,
        app_name: String,
    ) -> Self {
        Self {
            registry,
            panic_listener,
            app_name,
        }
    }

    /// Send `req` through the first transport that can carry it.
    ///
    /// Transports race to establish connections; ready connections are then
    /// consumed one at a time until a response with status below 400
    /// arrives. Statuses of 400 and above are retryable (an intermediary
    /// transport, not the origin, may have produced them); the last such
    /// response is returned if nothing better materialises.
    pub async fn round_trip(&self, mut req: Request) -> Result<Response> {
        let timeout = request_timeout(&req);
        let cancel = req.cancel.child_token();
        // Cancelled on every return path, which tears down all remaining
        // workers and the connections they produced.
        let _guard = cancel.clone().drop_guard();

        let body_bytes = buffer_body(&mut req).await;
        let addr = authority_with_port(&req.uri)?;

        let runnable: Vec<Arc<dyn Transport>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|transport| {
                let max = transport.max_length();
                if max > 0 && body_bytes.len() > max {
                    tracing::debug!(
                        transport = transport.name(),
                        request_body_length = body_bytes.len(),
                        max_transport_body_length = max,
                        "skipping transport, body exceeds its limit"
                    );
                    return false;
                }
                true
            })
            .collect();

        let attempts = runnable.len();
        tracing::debug!(dialers = attempts, "dialing");

        let (ready_tx, mut ready_rx) = mpsc::channel::<ReadyRoundTripper>(attempts.max(1));
        let (err_tx, mut err_rx) = mpsc::channel::<Error>(attempts.max(1));
        let counter = Arc::new(FailureCounter {
            failed: AtomicUsize::new(0),
            total: attempts,
            err_tx: err_tx.clone(),
        });

        for transport in runnable {
            tokio::spawn(connect_worker(
                transport,
                cancel.clone(),
                addr.clone(),
                counter.clone(),
                ready_tx.clone(),
                err_tx.clone(),
                self.panic_listener.clone(),
            ));
        }
        drop(ready_tx);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut last_response: Option<Response> = None;
        for _ in 0..attempts {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(Error::Canceled);
                }
                () = &mut deadline => {
                    return Err(Error::DeadlineExceeded(timeout));
                }
                Some(ready) = ready_rx.recv() => {
                    tracing::debug!(transport = %ready.name, "got connected round tripper");
                    let mut attempt = clone_request(&req, &self.app_name, &ready.name, &body_bytes);
                    attempt.cancel = cancel.clone();
                    // The deadline and caller cancellation stay live while the
                    // request is in flight; dropping the attempt tears the
                    // connection down.
                    let attempt_result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(Error::Canceled),
                        () = &mut deadline => return Err(Error::DeadlineExceeded(timeout)),
                        result = ready.round_tripper.round_trip(attempt) => result,
                    };
                    match attempt_result {
                        Err(err) => {
                            tracing::error!(transport = %ready.name, error = %err, "HTTP request failed");
                            counter.record(err);
                        }
                        Ok(resp) if resp.status < 400 => {
                            tracing::debug!(transport = %ready.name, status = resp.status, "HTTP request succeeded");
                            return Ok(resp);
                        }
                        Ok(resp) => {
                            tracing::error!(
                                transport = %ready.name,
                                status = resp.status,
                                "HTTP request returned retryable status"
                            );
                            counter.record(Error::http_status(resp.status, "retryable response"));
                            last_response = Some(resp);
                        }
                    }
                }
                Some(err) = err_rx.recv() => {
                    tracing::error!(error = %err, "round trip error");
                    return Err(err);
                }
            }
        }

        match last_response {
            Some(resp) => Ok(resp),
            None => Err(Error::NoResponse),
        }
    }
}

/// One connect attempt. Runs under a panic guard: a panicking transport is
/// reported to the panic listener and surfaced as an error instead of
/// taking down the process.
async fn connect_worker(
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    addr: String,
    counter: Arc<FailureCounter>,
    ready_tx: mpsc::Sender<ReadyRoundTripper>,
    err_tx: mpsc::Sender<Error>,
    panic_listener: PanicListener,
) {
    let name = transport.name().to_string();
    let connect = async {
        match transport.new_round_tripper(cancel.clone(), &addr).await {
            Err(err) => {
                tracing::debug!(transport = %name, error = %err, "connect attempt failed");
                counter.record(err);
            }
            Ok(round_tripper) => {
                if cancel.is_cancelled() {
                    tracing::debug!(transport = %name, "cancelled before publishing connection");
                    counter.record(Error::Canceled);
                    return;
                }
                let _ = ready_tx
                    .send(ReadyRoundTripper {
                        round_tripper,
                        name: name.clone(),
                    })
                    .await;
            }
        }
    };

    if let Err(payload) = AssertUnwindSafe(connect).catch_unwind().await {
        let message = format!("panic in dialer: {}", panic_message(payload.as_ref()));
        (panic_listener)(message);
        let _ = err_tx.try_send(Error::DialerPanic(panic_message(payload.as_ref())));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Buffer the request body once, replacing it with a reader over the
/// buffer. A read failure is logged and yields the empty buffer.
async fn buffer_body(req: &mut Request) -> Bytes {
    match std::mem::replace(&mut req.body, Body::Empty) {
        Body::Empty => Bytes::new(),
        Body::Bytes(bytes) => {
            req.body = Body::Bytes(bytes.clone());
            bytes
        }
        Body::Stream(mut stream) => {
            let mut buf = Vec::new();
            match stream.read_to_end(&mut buf).await {
                Ok(_) => {
                    let bytes = Bytes::from(buf);
                    req.body = Body::Bytes(bytes.clone());
                    bytes
                }
                Err(err) => {
                    tracing::error!(error = %err, "error reading request body");
                    Bytes::new()
                }
            }
        }
    }
}

/// Normalise the request host to `host:port`, defaulting the port from the
/// scheme when the URL omits it.
fn authority_with_port(uri: &Uri) -> Result<String> {
    let host = uri
        .host()
        .ok_or_else(|| Error::http_protocol("request URL has no host"))?;
    match uri.port_u16() {
        Some(port) => Ok(format!("{}:{}", host, port)),
        None if uri.scheme_str() == Some("https") => Ok(format!("{}:443", host)),
        None => Ok(format!("{}:80", host)),
    }
}

/// Bodyless requests get a reduced deadline; uploads get more headroom.
fn request_timeout(req: &Request) -> Duration {
    match req.content_length() {
        None | Some(0) => BODYLESS_TIMEOUT,
        Some(_) => UPLOAD_TIMEOUT,
    }
}
