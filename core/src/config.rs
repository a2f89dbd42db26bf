//! Client construction.
//!
//! # Design
//! `ClientBuilder` applies settings in the order they are called. Each
//! setting is validated immediately and the first failure is kept; `build`
//! reports it and discards the rest. A built `Client` never changes: callers
//! needing other settings build another one.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::client::Client;
use crate::diagnostics::{DiagnosticSink, NoopSink};
use crate::error::ConfigError;
use crate::transport::{Transport, UreqTransport};

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_HOST: &str = "localhost:8080";

/// Environment variable overriding the scheme in `ClientBuilder::from_env`.
pub const SCHEME_ENV: &str = "ACCOUNTS_API_SCHEME";
/// Environment variable overriding the host in `ClientBuilder::from_env`.
pub const HOST_ENV: &str = "ACCOUNTS_API_HOST";

/// Immutable transport configuration shared by every clone of a `Client`.
pub struct Config {
    pub(crate) scheme: String,
    pub(crate) host: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) diagnostics: Arc<dyn DiagnosticSink>,
    pub(crate) empty_body_on_encode_error: bool,
}

impl Config {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `{scheme}://{host}`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("empty_body_on_encode_error", &self.empty_body_on_encode_error)
            .finish_non_exhaustive()
    }
}

/// Builder for `Client`.
pub struct ClientBuilder {
    scheme: String,
    host: String,
    transport: Option<Arc<dyn Transport>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    empty_body_on_encode_error: bool,
    error: Option<ConfigError>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            host: DEFAULT_HOST.to_string(),
            transport: None,
            diagnostics: Arc::new(NoopSink),
            empty_body_on_encode_error: false,
            error: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from defaults, then apply `ACCOUNTS_API_SCHEME` and
    /// `ACCOUNTS_API_HOST` when they are set.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        if let Ok(scheme) = std::env::var(SCHEME_ENV) {
            builder = builder.scheme(&scheme);
        }
        if let Ok(host) = std::env::var(HOST_ENV) {
            builder = builder.host(&host);
        }
        builder
    }

    /// `http` or `https`, case-insensitive.
    pub fn scheme(mut self, scheme: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let scheme = scheme.to_ascii_lowercase();
        match scheme.as_str() {
            "http" | "https" => self.scheme = scheme,
            _ => self.error = Some(ConfigError::UnsupportedScheme(scheme)),
        }
        self
    }

    /// Host with optional port, e.g. `localhost:8080`.
    pub fn host(mut self, host: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match validate_host(&self.scheme, host) {
            Ok(()) => self.host = host.to_string(),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Replace the network client. Defaults to `UreqTransport`.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        self.transport = Some(transport);
        self
    }

    pub fn diagnostics(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Arc::new(sink);
        self
    }

    /// Send an empty body instead of failing when a request body cannot be
    /// encoded. Off by default.
    pub fn empty_body_on_encode_error(mut self, enabled: bool) -> Self {
        self.empty_body_on_encode_error = enabled;
        self
    }

    pub fn build(self) -> Result<Client, ConfigError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(UreqTransport::new()),
        };
        Ok(Client::from_config(Config {
            scheme: self.scheme,
            host: self.host,
            transport,
            diagnostics: self.diagnostics,
            empty_body_on_encode_error: self.empty_body_on_encode_error,
        }))
    }
}

fn validate_host(scheme: &str, host: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidHost {
        host: host.to_string(),
        reason: reason.to_string(),
    };
    if host.is_empty() {
        return Err(invalid("empty"));
    }
    if host.contains(['/', '?', '#', '@']) || host.chars().any(char::is_whitespace) {
        return Err(invalid("expected host[:port] only"));
    }
    let url = Url::parse(&format!("{scheme}://{host}")).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host name"));
    }
    Ok(())
}
