//! Priority-ordered configuration options.
//!
//! Some options must be in effect before others that depend on them: the
//! log sink before anything that emits to it, the panic listener before
//! options that construct transports referencing it. Each option carries a
//! priority (smaller applies earlier); everything else keeps the default
//! priority and applies in input order under a stable sort.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::transport::amp::amp_transport;
use crate::transport::dnstt::dnstt_transport;
use crate::transport::fronted::fronted_transport;
use crate::transport::connector::TlsConnector;
use crate::transport::dialer::StreamDialer;
use crate::transport::smart::{smart_transport, StrategyFinder};
use crate::transport::{RoundTripperFactory, Transport};

/// Callback notified whenever a transport worker panics.
pub type PanicListener = Arc<dyn Fn(String) + Send + Sync>;

/// Shared sink for collaborator narration (strategy probes and the like).
pub type LogWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub(crate) const PRIORITY_LOG_WRITER: i32 = 0;
pub(crate) const PRIORITY_PANIC_LISTENER: i32 = 10;
pub(crate) const PRIORITY_DEFAULT: i32 = 1000;

/// Mutable configuration state the options apply to.
pub(crate) struct Settings {
    pub transports: Vec<Arc<dyn Transport>>,
    pub panic_listener: Option<PanicListener>,
    pub log_writer: LogWriter,
    pub root_ca: Option<String>,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
            panic_listener: None,
            log_writer: Arc::new(Mutex::new(Box::new(io::stdout()))),
            root_ca: None,
        }
    }

    pub fn tls_connector(&self) -> TlsConnector {
        match &self.root_ca {
            Some(pem) => TlsConnector::with_root_ca(pem.clone()),
            None => TlsConnector::new(),
        }
    }
}

/// A configuration option for [`Kindling`](crate::client::Kindling).
///
/// Built through the `with_*` constructors in this module.
pub struct KindlingOption {
    priority: i32,
    apply: Box<dyn FnOnce(&mut Settings) + Send>,
}

impl KindlingOption {
    fn new(priority: i32, apply: impl FnOnce(&mut Settings) + Send + 'static) -> Self {
        Self {
            priority,
            apply: Box::new(apply),
        }
    }
}

/// Sort by priority (stable, so equal priorities keep input order) and
/// apply in that order.
pub(crate) fn apply_options(mut options: Vec<KindlingOption>, settings: &mut Settings) {
    options.sort_by_key(|opt| opt.priority);
    for opt in options {
        (opt.apply)(settings);
    }
}

/// Register a caller-provided transport.
pub fn with_transport(transport: Arc<dyn Transport>) -> KindlingOption {
    KindlingOption::new(PRIORITY_DEFAULT, move |settings| {
        settings.transports.push(transport);
    })
}

/// Set the log sink handed to collaborators. Applied before every other
/// option so all of them emit to the chosen sink.
pub fn with_log_writer(writer: impl Write + Send + 'static) -> KindlingOption {
    KindlingOption::new(PRIORITY_LOG_WRITER, move |settings| {
        settings.log_writer = Arc::new(Mutex::new(Box::new(writer)));
    })
}

/// Set the listener notified when any transport worker panics. Applied
/// before transport-constructing options so they can reference it.
pub fn with_panic_listener(listener: impl Fn(String) + Send + Sync + 'static) -> KindlingOption {
    KindlingOption::new(PRIORITY_PANIC_LISTENER, move |settings| {
        tracing::info!("setting panic listener");
        settings.panic_listener = Some(Arc::new(listener));
    })
}

/// Pin the root CA used for TLS by stream-dialer transports registered
/// after this option.
pub fn with_root_ca(root_ca_pem: impl Into<String>) -> KindlingOption {
    let pem = root_ca_pem.into();
    KindlingOption::new(PRIORITY_DEFAULT, move |settings| {
        settings.root_ca = Some(pem);
    })
}

/// Enable domain fronting, registered as the `"fronted"` transport.
pub fn with_domain_fronting(fronter: Arc<dyn RoundTripperFactory>) -> KindlingOption {
    KindlingOption::new(PRIORITY_DEFAULT, move |settings| {
        tracing::info!("setting domain fronting");
        settings.transports.push(fronted_transport(fronter));
    })
}

/// Enable proxyless access to the given domains through a smart-dialer
/// strategy finder, registered as the `"smart"` transport.
///
/// When the finder cannot produce a dialer the failure is logged and no
/// transport is registered; other strategies remain usable.
pub fn with_proxyless(
    finder: Arc<dyn StrategyFinder>,
    domains: impl IntoIterator<Item = impl Into<String>>,
) -> KindlingOption {
    let domains: Vec<String> = domains.into_iter().map(Into::into).collect();
    KindlingOption::new(PRIORITY_DEFAULT, move |settings| {
        tracing::info!("setting proxyless mode");
        let tls = settings.tls_connector();
        match smart_transport(finder.as_ref(), &domains, settings.log_writer.clone(), tls) {
            Ok(transport) => settings.transports.push(transport),
            Err(e) => tracing::error!(error = %e, "failed to create smart dialer"),
        }
    })
}

/// Enable a DNS tunnel, registered as the `"dnstt"` transport.
pub fn with_dns_tunnel(dialer: Arc<dyn StreamDialer>) -> KindlingOption {
    KindlingOption::new(PRIORITY_DEFAULT, move |settings| {
        tracing::info!("setting DNS tunnel");
        let tls = settings.tls_connector();
        settings.transports.push(dnstt_transport(dialer, tls));
    })
}

/// Enable AMP-cache relaying, registered as the `"amp"` transport with its
/// 6000-byte payload limit.
pub fn with_amp_cache(relay: Arc<dyn RoundTripperFactory>) -> KindlingOption {
    KindlingOption::new(PRIORITY_DEFAULT, move |settings| {
        tracing::info!("setting AMP cache");
        settings.transports.push(amp_transport(relay));
    })
}
