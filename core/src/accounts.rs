//! Accounts resource service.
//!
//! Every operation runs through `Client::execute`; read paths then decode the
//! envelope. Errors keep the raw response wherever one arrived, so a caller
//! can tell a 404 from a 409 with `ApiError::status`.

use uuid::Uuid;

use crate::client::{Client, RequestSpec};
use crate::context::Context;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse, QueryParams};
use crate::pagination::{ListOptions, Page};
use crate::types::{Account, Envelope, Links, ListEnvelope};

pub const ACCOUNTS_PATH: &str = "/organisation/accounts";

/// A decoded payload together with the response it came from.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub links: Option<Links>,
    pub response: HttpResponse,
}

impl<T> ApiResponse<T> {
    pub fn status(&self) -> u16 {
        self.response.status
    }
}

/// Fetch, list, create and delete accounts.
///
/// Borrowed from a `Client`; holds no state of its own.
#[derive(Debug, Clone, Copy)]
pub struct AccountsService<'a> {
    client: &'a Client,
}

impl<'a> AccountsService<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// `GET /v1/organisation/accounts/{id}`
    pub fn fetch(&self, ctx: &Context, id: Uuid) -> Result<ApiResponse<Account>, ApiError> {
        let spec = RequestSpec::new(HttpMethod::Get, format!("{ACCOUNTS_PATH}/{id}"));
        let response = self.client.execute(ctx, spec)?;
        let (envelope, response): (Envelope<Account>, _) = self.client.decode_owned(response)?;
        Ok(ApiResponse {
            data: envelope.data,
            links: envelope.links,
            response,
        })
    }

    /// `GET /v1/organisation/accounts?page[number]=..&page[size]=..`
    ///
    /// Accounts come back in server order.
    pub fn list(&self, ctx: &Context, page: Page) -> Result<ApiResponse<Vec<Account>>, ApiError> {
        self.list_with(ctx, &ListOptions::new(page))
    }

    /// `list` with `filter[{attribute}]` constraints.
    pub fn list_with(&self, ctx: &Context, options: &ListOptions) -> Result<ApiResponse<Vec<Account>>, ApiError> {
        let spec = RequestSpec::new(HttpMethod::Get, ACCOUNTS_PATH).query(options.params());
        let response = self.client.execute(ctx, spec)?;
        let (envelope, response): (ListEnvelope<Account>, _) = self.client.decode_owned(response)?;
        Ok(ApiResponse {
            data: envelope.data,
            links: envelope.links,
            response,
        })
    }

    /// `POST /v1/organisation/accounts`
    ///
    /// The id is the caller's; reusing one yields a 409 status error. The
    /// server may fill in attributes such as the account number or IBAN.
    pub fn create(&self, ctx: &Context, account: &Account) -> Result<ApiResponse<Account>, ApiError> {
        let payload = Envelope::new(account);
        let spec = RequestSpec::new(HttpMethod::Post, ACCOUNTS_PATH).body(&payload);
        let response = self.client.execute(ctx, spec)?;
        let (envelope, response): (Envelope<Account>, _) = self.client.decode_owned(response)?;
        Ok(ApiResponse {
            data: envelope.data,
            links: envelope.links,
            response,
        })
    }

    /// `DELETE /v1/organisation/accounts/{id}?version={version}`
    ///
    /// `data` is `true` on every `Ok`. A stale version (409) or unknown id
    /// (404) comes back as `ApiError::Status`. The body is not read.
    pub fn delete(&self, ctx: &Context, id: Uuid, version: i64) -> Result<ApiResponse<bool>, ApiError> {
        let mut query = QueryParams::new();
        query.add("version", version.to_string());
        let spec = RequestSpec::new(HttpMethod::Delete, format!("{ACCOUNTS_PATH}/{id}")).query(query);
        let response = self.client.execute(ctx, spec)?;
        Ok(ApiResponse {
            data: true,
            links: None,
            response,
        })
    }
}
