//! Typed, blocking client for the organisation accounts API.
//!
//! # Overview
//! `Client` owns an immutable transport configuration (scheme, host, network
//! client, diagnostic sink). `Client::execute` is the request pipeline:
//! URL and query construction, JSON body encoding, vendor content
//! negotiation, and status classification. `Client::decode` turns a body into
//! a typed value. `AccountsService` composes the two into fetch, list, create
//! and delete over `/v1/organisation/accounts`.
//!
//! # Design
//! - Configuration happens once, through `ClientBuilder`; the first invalid
//!   setting aborts `build`.
//! - Pagination is a `Page` value passed to each list call, never state on
//!   the service.
//! - Errors always carry the raw response when one was received.
//! - The network sits behind the `Transport` trait; the default is a `ureq`
//!   agent.
//!
//! ```no_run
//! use accounts_client::{Client, Context, Page};
//!
//! let client = Client::builder().host("localhost:8080").build()?;
//! let listed = client.accounts().list(&Context::background(), Page::default())?;
//! println!("{} accounts", listed.data.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod accounts;
pub mod client;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod pagination;
pub mod transport;
pub mod types;

pub use accounts::{AccountsService, ApiResponse};
pub use client::{Client, RequestSpec, API_VERSION, CONTENT_TYPE};
pub use config::{ClientBuilder, Config};
pub use context::{CancelHandle, Context};
pub use diagnostics::{DiagnosticSink, NoopSink, TracingSink};
pub use error::{ApiError, ConfigError, DecodeError, ErrorKind, TransportError};
pub use http::{Body, HttpMethod, HttpRequest, HttpResponse, QueryParams};
pub use pagination::{ListOptions, Page};
pub use transport::{Transport, UreqTransport};
pub use types::{Account, AccountAttributes, Envelope, Links, ListEnvelope};
