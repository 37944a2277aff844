#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kindling::{Error, Request, Response, Result, RoundTripper, RoundTripperFactory, Transport};
use tokio_util::sync::CancellationToken;

/// What a scripted transport does when asked to connect.
#[derive(Clone, Copy)]
pub enum Connect {
    /// Succeed after the delay.
    Ready(Duration),
    /// Fail after the delay.
    Fail(Duration),
    /// Panic immediately.
    Panic,
    /// Block until the cancellation token fires.
    Hang,
}

/// What a scripted round-tripper answers.
#[derive(Clone, Copy)]
pub enum Reply {
    /// Respond with this status; the body is the transport's name.
    Status(u16),
    /// Fail the send.
    Error,
}

/// Everything a scripted transport observed, for assertions.
#[derive(Default)]
pub struct Observed {
    pub connects: AtomicUsize,
    pub sends: AtomicUsize,
    pub addr: Mutex<Option<String>>,
    pub token: Mutex<Option<CancellationToken>>,
    pub request_headers: Mutex<Vec<(String, String)>>,
    pub request_body_was_sentinel: AtomicUsize,
}

impl Observed {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn addr(&self) -> Option<String> {
        self.addr.lock().unwrap().clone()
    }

    pub fn token(&self) -> Option<CancellationToken> {
        self.token.lock().unwrap().clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.request_headers
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

/// A fully scriptable [`Transport`] for exercising the race engine without
/// touching the network.
pub struct ScriptedTransport {
    name: &'static str,
    max_length: usize,
    connect: Connect,
    reply: Reply,
    observed: Arc<Observed>,
}

impl ScriptedTransport {
    pub fn new(name: &'static str, connect: Connect, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name,
            max_length: 0,
            connect,
            reply,
            observed: Arc::new(Observed::default()),
        })
    }

    pub fn with_max_length(
        name: &'static str,
        max_length: usize,
        connect: Connect,
        reply: Reply,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            max_length,
            connect,
            reply,
            observed: Arc::new(Observed::default()),
        })
    }

    pub fn observed(&self) -> Arc<Observed> {
        self.observed.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        self.name
    }

    fn max_length(&self) -> usize {
        self.max_length
    }

    async fn new_round_tripper(
        &self,
        cancel: CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn RoundTripper>> {
        self.observed.connects.fetch_add(1, Ordering::SeqCst);
        *self.observed.addr.lock().unwrap() = Some(addr.to_string());
        *self.observed.token.lock().unwrap() = Some(cancel.clone());

        match self.connect {
            Connect::Panic => panic!("scripted connect panic in {}", self.name),
            Connect::Hang => {
                cancel.cancelled().await;
                Err(Error::Canceled)
            }
            Connect::Fail(delay) => {
                tokio::time::sleep(delay).await;
                Err(Error::connection(format!("{}: connection refused", self.name)))
            }
            Connect::Ready(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Box::new(ScriptedRoundTripper {
                    name: self.name,
                    reply: self.reply,
                    observed: self.observed.clone(),
                }))
            }
        }
    }
}

pub struct ScriptedRoundTripper {
    name: &'static str,
    reply: Reply,
    observed: Arc<Observed>,
}

#[async_trait]
impl RoundTripper for ScriptedRoundTripper {
    async fn round_trip(&self, req: Request) -> Result<Response> {
        self.observed.sends.fetch_add(1, Ordering::SeqCst);
        *self.observed.request_headers.lock().unwrap() = req.headers.clone();
        if req.body.is_empty_sentinel() {
            self.observed
                .request_body_was_sentinel
                .fetch_add(1, Ordering::SeqCst);
        }

        match self.reply {
            Reply::Error => Err(Error::connection(format!("{}: send failed", self.name))),
            Reply::Status(status) => Ok(Response::new(
                status,
                Vec::new(),
                Bytes::from(self.name),
                "HTTP/1.1".to_string(),
            )),
        }
    }
}

/// A [`RoundTripperFactory`] that always yields round-trippers answering
/// with `reply`. Used to exercise transport replacement.
pub struct ScriptedFactory {
    name: &'static str,
    reply: Reply,
    observed: Arc<Observed>,
}

impl ScriptedFactory {
    pub fn new(name: &'static str, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply,
            observed: Arc::new(Observed::default()),
        })
    }

    pub fn observed(&self) -> Arc<Observed> {
        self.observed.clone()
    }
}

#[async_trait]
impl RoundTripperFactory for ScriptedFactory {
    async fn new_round_tripper(
        &self,
        _cancel: CancellationToken,
        addr: &str,
    ) -> Result<Box<dyn RoundTripper>> {
        self.observed.connects.fetch_add(1, Ordering::SeqCst);
        *self.observed.addr.lock().unwrap() = Some(addr.to_string());
        Ok(Box::new(ScriptedRoundTripper {
            name: self.name,
            reply: self.reply,
            observed: self.observed.clone(),
        }))
    }
}
