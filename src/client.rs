//! Client facade: configuration assembly and the HTTP client surface.

use std::sync::Arc;

use http::{Method, Uri};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::options::{apply_options, KindlingOption, LogWriter, PanicListener, Settings};
use crate::race::RaceTransport;
use crate::registry::Registry;
use crate::request::{Body, Request};
use crate::response::Response;
use crate::transport::RoundTripperFactory;

/// Configured client: the transport registry plus the cross-cutting pieces
/// (panic listener, app name, log sink) every request shares.
///
/// Construct with [`Kindling::new`], then call [`Kindling::new_http_client`]
/// to fetch through the racing transport.
pub struct Kindling {
    app_name: String,
    registry: Arc<Registry>,
    panic_listener: PanicListener,
    log_writer: LogWriter,
}

impl Kindling {
    /// Apply `options` (in priority order) and build the client.
    ///
    /// `app_name` identifies the calling application in the
    /// `X-Kindling-App` header on every attempt.
    pub fn new(app_name: impl Into<String>, options: Vec<KindlingOption>) -> Self {
        let mut settings = Settings::new();
        apply_options(options, &mut settings);

        let registry = Arc::new(Registry::new());
        for transport in settings.transports.drain(..) {
            registry.push(transport);
        }

        let panic_listener = settings
            .panic_listener
            .unwrap_or_else(|| Arc::new(|message: String| tracing::error!("{}", message)));

        Self {
            app_name: app_name.into(),
            registry,
            panic_listener,
            log_writer: settings.log_writer,
        }
    }

    /// An HTTP client whose transport races every configured strategy.
    pub fn new_http_client(&self) -> HttpClient {
        HttpClient {
            transport: Arc::new(RaceTransport::new(
                self.registry.clone(),
                self.panic_listener.clone(),
                self.app_name.clone(),
            )),
        }
    }

    /// Swap the registered transport named `name` for one built from
    /// `factory`, keeping its name, size limit, and position. In-flight
    /// requests that already picked up the old transport are unaffected.
    pub fn replace_transport(
        &self,
        name: &str,
        factory: Arc<dyn RoundTripperFactory>,
    ) -> Result<()> {
        self.registry.replace(name, factory)
    }

    /// The log sink handed to collaborators.
    pub fn log_writer(&self) -> LogWriter {
        self.log_writer.clone()
    }
}

/// HTTP client backed by the race transport.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<RaceTransport>,
}

impl HttpClient {
    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, url)
    }

    /// Create a request builder for any method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            uri: url.into(),
            method,
            headers: Vec::new(),
            body: Body::Empty,
            cancel: None,
        }
    }
}

/// Builder for HTTP requests.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    uri: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Body,
    cancel: Option<CancellationToken>,
}

impl RequestBuilder<'_> {
    /// Add a header to the request.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the cancellation token governing the request. Cancelling it
    /// aborts the race and every in-flight attempt.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Send the request and return the response.
    pub async fn send(self) -> Result<Response> {
        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e| Error::http_protocol(format!("invalid URI: {}", e)))?;

        let req = Request {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body,
            cancel: self.cancel.unwrap_or_default(),
        };
        self.client.transport.round_trip(req).await
    }
}
