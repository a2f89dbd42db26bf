//! Request pipeline and response decoder.
//!
//! # Design
//! `Client` holds only the immutable `Config` behind an `Arc`, so clones are
//! cheap and safe to share across threads. `execute` builds the URL, encodes
//! the body, sets content-negotiation headers, sends through the configured
//! `Transport` and classifies the status. It never retries and never reads
//! the body for meaning; `decode` does that separately for read paths.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::accounts::AccountsService;
use crate::config::{ClientBuilder, Config};
use crate::context::Context;
use crate::diagnostics;
use crate::error::{ApiError, DecodeError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, QueryParams};

/// Path prefix for every resource path.
pub const API_VERSION: &str = "v1";

/// Media type sent in both `Accept` and `Content-Type`.
pub const CONTENT_TYPE: &str = "application/vnd.Form3+json";

/// One call's worth of request data. Built per call and never retained.
#[derive(Debug, Clone)]
pub struct RequestSpec<'a, B: ?Sized = ()> {
    pub method: HttpMethod,
    /// Resource path below the version prefix, starting with `/`.
    pub path: String,
    pub query: QueryParams,
    pub body: Option<&'a B>,
}

impl RequestSpec<'static, ()> {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryParams::new(),
            body: None,
        }
    }
}

impl<'a, B: ?Sized> RequestSpec<'a, B> {
    pub fn query(mut self, query: QueryParams) -> Self {
        self.query.extend(query);
        self
    }

    pub fn body<'b, T: Serialize + ?Sized>(self, body: &'b T) -> RequestSpec<'b, T> {
        RequestSpec {
            method: self.method,
            path: self.path,
            query: self.query,
            body: Some(body),
        }
    }
}

/// Client for the accounts API.
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<Config>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn accounts(&self) -> AccountsService<'_> {
        AccountsService::new(self)
    }

    /// Build the fully qualified URL for `path` and `query`.
    pub fn url(&self, path: &str, query: &QueryParams) -> Result<Url, ApiError> {
        let raw = format!("{}/{API_VERSION}{path}", self.config.base_url());
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    /// Turn a `RequestSpec` into the plain request handed to the transport.
    pub fn build_request<B>(&self, spec: &RequestSpec<'_, B>) -> Result<HttpRequest, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(&spec.path, &spec.query)?;
        let body = match spec.body {
            None => None,
            Some(value) => match serde_json::to_vec(value) {
                Ok(bytes) => Some(bytes),
                Err(e) if self.config.empty_body_on_encode_error => {
                    self.config.diagnostics.error(&diagnostics::line(
                        spec.method,
                        url.as_str(),
                        format_args!("body encoding failed, sending empty body: {e}"),
                    ));
                    Some(Vec::new())
                }
                Err(e) => return Err(ApiError::Serialization(e.to_string())),
            },
        };

        Ok(HttpRequest {
            method: spec.method,
            url: url.into(),
            headers: vec![
                ("Accept".to_string(), CONTENT_TYPE.to_string()),
                ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            ],
            body,
        })
    }

    /// Send `spec` and classify the outcome by status code.
    ///
    /// Statuses 200..=299 return the response; anything else returns
    /// `ApiError::Status` carrying the response. The body is left untouched.
    pub fn execute<B>(&self, ctx: &Context, spec: RequestSpec<'_, B>) -> Result<HttpResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let request = self.build_request(&spec)?;
        tracing::debug!(method = %request.method, url = %request.url, "dispatching request");

        if ctx.is_cancelled() {
            return Err(self.report_failure(&request, ApiError::Cancelled));
        }
        if ctx.is_expired() {
            return Err(self.report_failure(&request, ApiError::DeadlineExceeded));
        }

        let response = match self.config.transport.send(&request, ctx) {
            Ok(response) => response,
            Err(TransportError::Cancelled) => {
                return Err(self.report_failure(&request, ApiError::Cancelled));
            }
            Err(TransportError::Timeout) if ctx.has_deadline() => {
                return Err(self.report_failure(&request, ApiError::DeadlineExceeded));
            }
            Err(e) => return Err(self.report_failure(&request, e.into())),
        };

        if ctx.is_cancelled() {
            return Err(self.report_failure(&request, ApiError::Cancelled));
        }

        if !response.is_success() {
            let err = ApiError::Status {
                status: response.status,
                reason: response.reason.clone(),
                response: Box::new(response),
            };
            return Err(self.report_failure(&request, err));
        }

        self.config.diagnostics.info(&diagnostics::line(
            request.method,
            &request.url,
            response.status_line(),
        ));
        Ok(response)
    }

    /// Deserialize the whole body of `response` into `T`.
    ///
    /// The status code is not checked here.
    pub fn decode<T: DeserializeOwned>(&self, response: &HttpResponse) -> Result<T, DecodeError> {
        let bytes = response.bytes()?;
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Json(e.to_string()))
    }

    /// `decode`, attaching the response to any failure.
    pub(crate) fn decode_owned<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<(T, HttpResponse), ApiError> {
        match self.decode(&response) {
            Ok(value) => Ok((value, response)),
            Err(source) => Err(ApiError::Decode {
                source,
                response: Box::new(response),
            }),
        }
    }

    fn report_failure(&self, request: &HttpRequest, err: ApiError) -> ApiError {
        self.config
            .diagnostics
            .error(&diagnostics::line(request.method, &request.url, &err));
        err
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::context::CancelHandle;
    use crate::diagnostics::DiagnosticSink;
    use crate::error::ErrorKind;
    use crate::http::Body;
    use crate::transport::Transport;

    /// Transport returning queued responses and recording what was sent.
    #[derive(Clone, Default)]
    pub(crate) struct StubTransport {
        pub responses: Arc<Mutex<VecDeque<Result<HttpResponse, TransportError>>>>,
        pub sent: Arc<Mutex<Vec<(HttpRequest, Option<Duration>)>>>,
    }

    impl StubTransport {
        pub fn respond(&self, status: u16, body: &str) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(HttpResponse::new(status, body)));
            self
        }

        pub fn fail(&self, err: TransportError) -> &Self {
            self.responses.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn last_request(&self) -> HttpRequest {
            self.sent.lock().unwrap().last().unwrap().0.clone()
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Transport for StubTransport {
        fn send(&self, request: &HttpRequest, ctx: &Context) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push((request.clone(), ctx.remaining()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Io("no stubbed response".to_string())))
        }
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub info: Arc<Mutex<Vec<String>>>,
        pub error: Arc<Mutex<Vec<String>>>,
    }

    impl DiagnosticSink for RecordingSink {
        fn info(&self, line: &str) {
            self.info.lock().unwrap().push(line.to_string());
        }

        fn error(&self, line: &str) {
            self.error.lock().unwrap().push(line.to_string());
        }
    }

    pub(crate) fn stub_client() -> (Client, StubTransport, RecordingSink) {
        let stub = StubTransport::default();
        let sink = RecordingSink::default();
        let client = Client::builder()
            .host("localhost:8080")
            .transport(stub.clone())
            .diagnostics(sink.clone())
            .build()
            .unwrap();
        (client, stub, sink)
    }

    #[test]
    fn url_has_version_prefix_and_encoded_query() {
        let (client, _, _) = stub_client();
        let mut query = QueryParams::new();
        query.add("page[size]", "10");
        query.add("page[number]", "0");
        let url = client.url("/organisation/accounts", &query).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/v1/organisation/accounts?page%5Bnumber%5D=0&page%5Bsize%5D=10"
        );
    }

    #[test]
    fn url_without_query_has_no_question_mark() {
        let (client, _, _) = stub_client();
        let url = client.url("/organisation/accounts", &QueryParams::new()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/organisation/accounts");
    }

    #[test]
    fn sets_vendor_content_negotiation_headers() {
        let (client, stub, _) = stub_client();
        stub.respond(200, "{}");
        client
            .execute(&Context::background(), RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap();
        let req = stub.last_request();
        assert_eq!(req.header("accept"), Some(CONTENT_TYPE));
        assert_eq!(req.header("content-type"), Some(CONTENT_TYPE));
        assert!(req.body.is_none());
    }

    #[test]
    fn serializes_body_as_json() {
        let (client, stub, _) = stub_client();
        stub.respond(201, "{}");
        let body = serde_json::json!({"data": {"id": "x"}});
        let spec = RequestSpec::new(HttpMethod::Post, "/organisation/accounts").body(&body);
        client.execute(&Context::background(), spec).unwrap();
        let sent: serde_json::Value = serde_json::from_slice(stub.last_request().body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn classifies_2xx_as_success_and_logs_info() {
        let (client, stub, sink) = stub_client();
        stub.respond(204, "");
        let res = client
            .execute(&Context::background(), RequestSpec::new(HttpMethod::Delete, "/organisation/accounts/x"))
            .unwrap();
        assert_eq!(res.status, 204);
        assert_eq!(
            sink.info.lock().unwrap().as_slice(),
            ["DELETE -> http://localhost:8080/v1/organisation/accounts/x -> 204 No Content".to_string()]
        );
        assert!(sink.error.lock().unwrap().is_empty());
    }

    #[test]
    fn classifies_non_2xx_as_status_error_keeping_response() {
        let (client, stub, sink) = stub_client();
        stub.respond(409, r#"{"error_message":"duplicate"}"#);
        let err = client
            .execute(&Context::background(), RequestSpec::new(HttpMethod::Post, "/organisation/accounts"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Status);
        assert_eq!(err.to_string(), "409 Conflict");
        let response = err.response().unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(response.body, Body::Bytes(br#"{"error_message":"duplicate"}"#.to_vec()));
        assert_eq!(
            sink.error.lock().unwrap().as_slice(),
            ["POST -> http://localhost:8080/v1/organisation/accounts -> 409 Conflict".to_string()]
        );
        assert!(sink.info.lock().unwrap().is_empty());
    }

    #[test]
    fn transport_failure_is_returned_without_response() {
        let (client, stub, sink) = stub_client();
        stub.fail(TransportError::Io("connection refused".to_string()));
        let err = client
            .execute(&Context::background(), RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.response().is_none());
        assert_eq!(sink.error.lock().unwrap().len(), 1);
    }

    #[test]
    fn encode_failure_fails_closed_by_default() {
        let (client, stub, _) = stub_client();
        let mut unencodable = HashMap::new();
        unencodable.insert((1, 2), "tuple keys are not JSON object keys");
        let spec = RequestSpec::new(HttpMethod::Post, "/organisation/accounts").body(&unencodable);
        let err = client.execute(&Context::background(), spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert_eq!(stub.sent_count(), 0);
    }

    #[test]
    fn encode_failure_sends_empty_body_when_enabled() {
        let stub = StubTransport::default();
        let sink = RecordingSink::default();
        let client = Client::builder()
            .transport(stub.clone())
            .diagnostics(sink.clone())
            .empty_body_on_encode_error(true)
            .build()
            .unwrap();
        stub.respond(400, "");
        let mut unencodable = HashMap::new();
        unencodable.insert((1, 2), "x");
        let spec = RequestSpec::new(HttpMethod::Post, "/organisation/accounts").body(&unencodable);
        let err = client.execute(&Context::background(), spec).unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(stub.last_request().body, Some(Vec::new()));
        assert_eq!(sink.error.lock().unwrap().len(), 2);
    }

    #[test]
    fn cancelled_context_never_dispatches() {
        let (client, stub, _) = stub_client();
        let (ctx, handle) = Context::cancellable();
        handle.cancel();
        let err = client
            .execute(&ctx, RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert_eq!(stub.sent_count(), 0);
    }

    /// Cancels the paired context from inside `send`.
    struct CancelDuringSend {
        handle: CancelHandle,
        cancelled_in_flight: bool,
    }

    impl Transport for CancelDuringSend {
        fn send(&self, _request: &HttpRequest, _ctx: &Context) -> Result<HttpResponse, TransportError> {
            self.handle.cancel();
            if self.cancelled_in_flight {
                Err(TransportError::Cancelled)
            } else {
                Ok(HttpResponse::new(200, r#"{"data":[]}"#))
            }
        }
    }

    fn cancelling_client(cancelled_in_flight: bool) -> (Client, Context, RecordingSink) {
        let (ctx, handle) = Context::cancellable();
        let sink = RecordingSink::default();
        let client = Client::builder()
            .transport(CancelDuringSend {
                handle,
                cancelled_in_flight,
            })
            .diagnostics(sink.clone())
            .build()
            .unwrap();
        (client, ctx, sink)
    }

    #[test]
    fn cancel_after_response_discards_it() {
        let (client, ctx, sink) = cancelling_client(false);
        let err = client
            .execute(&ctx, RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert!(err.response().is_none());
        assert!(sink.info.lock().unwrap().is_empty());
        assert_eq!(sink.error.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancel_in_flight_is_reported_as_cancelled() {
        let (client, ctx, sink) = cancelling_client(true);
        let err = client
            .execute(&ctx, RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(sink.info.lock().unwrap().is_empty());
    }

    #[test]
    fn expired_deadline_never_dispatches() {
        let (client, stub, _) = stub_client();
        let ctx = Context::with_timeout(Duration::ZERO);
        let err = client
            .execute(&ctx, RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::DeadlineExceeded));
        assert_eq!(stub.sent_count(), 0);
    }

    #[test]
    fn deadline_becomes_transport_timeout() {
        let (client, stub, _) = stub_client();
        stub.fail(TransportError::Timeout);
        let ctx = Context::with_timeout(Duration::from_secs(30));
        let err = client
            .execute(&ctx, RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::DeadlineExceeded));
        let timeout = stub.sent.lock().unwrap()[0].1.unwrap();
        assert!(timeout <= Duration::from_secs(30));
        assert!(timeout > Duration::from_secs(25));
    }

    #[test]
    fn timeout_without_deadline_is_a_transport_error() {
        let (client, stub, _) = stub_client();
        stub.fail(TransportError::Timeout);
        let err = client
            .execute(&Context::background(), RequestSpec::new(HttpMethod::Get, "/organisation/accounts"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Timeout)));
        assert_eq!(stub.sent.lock().unwrap()[0].1, None);
    }

    #[test]
    fn decode_reads_typed_value() {
        let (client, _, _) = stub_client();
        let response = HttpResponse::new(200, r#"{"data":{"n":1}}"#);
        let value: serde_json::Value = client.decode(&response).unwrap();
        assert_eq!(value["data"]["n"], 1);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let (client, _, _) = stub_client();
        let response = HttpResponse::new(200, "{\"data\": {}\n}\n}");
        let err = client.decode::<serde_json::Value>(&response).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn decode_reports_unreadable_body_as_io() {
        let (client, _, _) = stub_client();
        let mut response = HttpResponse::new(200, "");
        response.body = Body::Unreadable("unexpected eof".to_string());
        let err = client.decode::<serde_json::Value>(&response).unwrap_err();
        assert_eq!(err, DecodeError::Io("unexpected eof".to_string()));
    }
}
