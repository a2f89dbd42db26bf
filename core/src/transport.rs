//! Network client seam.
//!
//! `Transport` executes one `HttpRequest` and returns the resulting
//! `HttpResponse` whatever its status code. Status classification belongs to
//! the pipeline, so implementations must not turn 4xx/5xx into errors.
//!
//! Implementations honour the caller's `Context` while waiting: the remaining
//! time before its deadline bounds the call, and a cancelled context returns
//! `TransportError::Cancelled` without waiting for the server.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::context::Context;
use crate::error::TransportError;
use crate::http::{reason_phrase, Body, HttpMethod, HttpRequest, HttpResponse};

/// How often an in-flight call checks its cancellation flag.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Executes HTTP requests. Shared read-only between clones of a `Client`.
pub trait Transport: Send + Sync {
    /// Send `request`, bounded by the deadline and cancellation of `ctx`.
    fn send(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError>;
}

/// Default transport backed by a blocking `ureq` agent.
///
/// The agent pools connections, so one instance should be reused for every
/// call made by a client. Calls made with a cancellable context run on a
/// worker thread so the caller can stop waiting as soon as it is cancelled.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Wrap an existing agent. It must be configured with
    /// `http_status_as_error(false)`.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }

    fn send_cancellable(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError> {
        let (tx, rx) = mpsc::channel();
        let agent = self.agent.clone();
        let owned = request.clone();
        let timeout = ctx.remaining();
        thread::Builder::new()
            .name("accounts-client-request".to_string())
            .spawn(move || {
                // The receiver is gone once the caller cancelled.
                let _ = tx.send(dispatch(&agent, &owned, timeout));
            })
            .map_err(|e| TransportError::Io(format!("spawning request worker: {e}")))?;

        loop {
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) if ctx.is_cancelled() => {
                    tracing::debug!(method = %request.method, url = %request.url, "abandoning cancelled request");
                    return Err(TransportError::Cancelled);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Io("request worker exited without a result".to_string()));
                }
            }
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError> {
        if ctx.is_cancellable() {
            self.send_cancellable(request, ctx)
        } else {
            dispatch(&self.agent, request, ctx.remaining())
        }
    }
}

fn dispatch(agent: &ureq::Agent, request: &HttpRequest, timeout: Option<Duration>) -> Result<HttpResponse, TransportError> {
    let url = request.url.as_str();
    let result = match request.method {
        HttpMethod::Get => without_body(agent.get(url), request, timeout),
        HttpMethod::Delete => without_body(agent.delete(url), request, timeout),
        HttpMethod::Post => with_body(agent.post(url), request, timeout),
        HttpMethod::Put => with_body(agent.put(url), request, timeout),
        HttpMethod::Patch => with_body(agent.patch(url), request, timeout),
    };
    let mut response = result.map_err(map_ureq_error)?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = match response.body_mut().read_to_vec() {
        Ok(bytes) => Body::Bytes(bytes),
        Err(e) => Body::Unreadable(e.to_string()),
    };

    Ok(HttpResponse {
        status: status.as_u16(),
        reason: reason_phrase(status.as_u16()).to_string(),
        headers,
        body,
    })
}

fn without_body(
    mut builder: ureq::RequestBuilder<ureq::typestate::WithoutBody>,
    request: &HttpRequest,
    timeout: Option<Duration>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(timeout) = timeout {
        builder = builder.config().timeout_global(Some(timeout)).build();
    }
    builder.call()
}

fn with_body(
    mut builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    request: &HttpRequest,
    timeout: Option<Duration>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(timeout) = timeout {
        builder = builder.config().timeout_global(Some(timeout)).build();
    }
    match &request.body {
        Some(body) => builder.send(body.as_slice()),
        None => builder.send_empty(),
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        other => TransportError::Io(other.to_string()),
    }
}
