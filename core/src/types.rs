//! Wire DTOs for the accounts API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently;
//! integration tests catch drift. Optional attributes are `Option` and are
//! left out of the payload when `None`.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Resource discriminator carried in `Account::resource_type`.
pub const ACCOUNT_TYPE: &str = "accounts";

/// A bank account registered with the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Caller-supplied identifier; fixed once the account exists.
    pub id: Uuid,
    pub organisation_id: Uuid,
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Optimistic-concurrency counter. Deletes must quote the current value.
    pub version: i64,
    pub attributes: AccountAttributes,
    /// Set by the server; ignored on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<String>,
}

impl Account {
    /// New account at version 0 with the `accounts` resource type.
    pub fn new(id: Uuid, organisation_id: Uuid, attributes: AccountAttributes) -> Self {
        Self {
            id,
            organisation_id,
            resource_type: ACCOUNT_TYPE.to_string(),
            version: 0,
            attributes,
            created_on: None,
            modified_on: None,
        }
    }
}

/// Banking attributes of an account. Which optional fields apply depends on
/// the country; the server validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountAttributes {
    /// ISO 3166-1 alpha-2 code.
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_id_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_bank_account_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_classification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joint_account: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_matching_opt_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_identification: Option<String>,
}

impl AccountAttributes {
    pub fn new(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Self::default()
        }
    }
}

/// HATEOAS navigation links attached to a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(rename = "self", default)]
    pub self_: Option<String>,
}

/// Single-resource envelope: `{"data": T, "links": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data, links: None }
    }
}

/// Collection envelope. A `null` or missing `data` decodes as empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub data: Vec<T>,
    #[serde(default)]
    pub links: Option<Links>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
