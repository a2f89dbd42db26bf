//! In-memory stand-in for the organisation accounts API.
//!
//! Speaks the same wire format as the real service for
//! `/v1/organisation/accounts`, with just enough rules to exercise a client:
//! duplicate ids conflict, deletes check the version, lists are paged and
//! carry HATEOAS links.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ACCOUNTS_PATH: &str = "/v1/organisation/accounts";
pub const CONTENT_TYPE: &str = "application/vnd.Form3+json";

/// Page size used when the request does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub organisation_id: Uuid,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub version: i64,
    pub attributes: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct CreatePayload {
    pub data: Account,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Links {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(rename = "self")]
    pub self_: String,
}

/// Accounts in creation order.
pub type Db = Arc<RwLock<Vec<Account>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route(ACCOUNTS_PATH, get(list_accounts).post(create_account))
        .route(
            &format!("{ACCOUNTS_PATH}/{{id}}"),
            get(fetch_account).delete(delete_account),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn vnd_json(status: StatusCode, body: Value) -> Response {
    (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body.to_string()).into_response()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    vnd_json(status, json!({ "error_message": message }))
}

fn page_link(number: usize, size: usize) -> String {
    format!("{ACCOUNTS_PATH}?page%5Bnumber%5D={number}&page%5Bsize%5D={size}")
}

fn parse_param(params: &HashMap<String, String>, key: &str) -> Result<Option<i64>, Response> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| error_body(StatusCode::BAD_REQUEST, &format!("invalid {key}: {raw}"))),
    }
}

async fn list_accounts(State(db): State<Db>, Query(params): Query<HashMap<String, String>>) -> Response {
    let number = match parse_param(&params, "page[number]") {
        Ok(n) => n.unwrap_or(0).max(0) as usize,
        Err(resp) => return resp,
    };
    let size = match parse_param(&params, "page[size]") {
        Ok(Some(s)) if s > 0 => s as usize,
        Ok(_) => DEFAULT_PAGE_SIZE,
        Err(resp) => return resp,
    };

    let accounts = db.read().await;
    let filters: Vec<(&str, Vec<&str>)> = params
        .iter()
        .filter_map(|(k, v)| {
            let attribute = k.strip_prefix("filter[")?.strip_suffix(']')?;
            Some((attribute, v.split(',').collect()))
        })
        .collect();
    let matching: Vec<&Account> = accounts
        .iter()
        .filter(|a| filters.iter().all(|(attr, values)| matches_filter(a, attr, values)))
        .collect();

    let total = matching.len();
    let page: Vec<&Account> = matching.into_iter().skip(number.saturating_mul(size)).take(size).collect();
    let last = total.saturating_sub(1) / size;
    let links = Links {
        first: Some(page_link(0, size)),
        last: Some(page_link(last, size)),
        next: (number < last).then(|| page_link(number + 1, size)),
        prev: (number > 0).then(|| page_link(number.min(last + 1) - 1, size)),
        self_: page_link(number, size),
    };
    vnd_json(StatusCode::OK, json!({ "data": page, "links": links }))
}

fn matches_filter(account: &Account, attribute: &str, values: &[&str]) -> bool {
    let field = match attribute {
        "id" => Some(account.id.to_string()),
        "organisation_id" => Some(account.organisation_id.to_string()),
        _ => account
            .attributes
            .get(attribute)
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    field.is_some_and(|f| values.contains(&f.as_str()))
}

async fn create_account(State(db): State<Db>, payload: Result<Json<CreatePayload>, JsonRejection>) -> Response {
    let Json(CreatePayload { data: mut account }) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_body(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let has_country = account
        .attributes
        .get("country")
        .and_then(Value::as_str)
        .is_some_and(|c| !c.is_empty());
    if !has_country {
        return error_body(StatusCode::BAD_REQUEST, "validation failure: country is required");
    }

    let mut accounts = db.write().await;
    if accounts.iter().any(|a| a.id == account.id) {
        return error_body(
            StatusCode::CONFLICT,
            "Account cannot be created as it violates a duplicate constraint",
        );
    }
    account.version = 0;
    account
        .attributes
        .entry("account_number")
        .or_insert_with(|| Value::String(generated_account_number(accounts.len())));
    accounts.push(account.clone());
    tracing::info!(id = %account.id, "account created");

    vnd_json(
        StatusCode::CREATED,
        json!({ "data": account, "links": { "self": format!("{ACCOUNTS_PATH}/{}", account.id) } }),
    )
}

fn generated_account_number(seq: usize) -> String {
    format!("{:08}", 10_000_000 + seq)
}

async fn fetch_account(State(db): State<Db>, Path(id): Path<Uuid>) -> Response {
    let accounts = db.read().await;
    match accounts.iter().find(|a| a.id == id) {
        Some(account) => vnd_json(
            StatusCode::OK,
            json!({ "data": account, "links": { "self": format!("{ACCOUNTS_PATH}/{id}") } }),
        ),
        None => error_body(
            StatusCode::NOT_FOUND,
            &format!("record {id} does not exist"),
        ),
    }
}

#[derive(Deserialize)]
pub struct DeleteParams {
    pub version: Option<String>,
}

async fn delete_account(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> Response {
    let Some(version) = params.version.as_deref().and_then(|v| v.parse::<i64>().ok()) else {
        return error_body(StatusCode::BAD_REQUEST, "invalid version number");
    };

    let mut accounts = db.write().await;
    let Some(index) = accounts.iter().position(|a| a.id == id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if accounts[index].version != version {
        return error_body(StatusCode::CONFLICT, "invalid version");
    }
    accounts.remove(index);
    tracing::info!(%id, version, "account deleted");
    StatusCode::NO_CONTENT.into_response()
}
