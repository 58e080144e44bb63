//! CRM abstraction for cdr-sync.
//!
//! The [`CrmApi`] trait is the narrow surface the sync engine needs from the
//! CRM: contact and call searches, object reads, call create/patch, and the
//! three association endpoint shapes. The HTTP implementation lives in the
//! `cdr-sync` crate; [`memory::InMemoryCrm`] backs the tests.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`search_contacts_by_phone`](CrmApi::search_contacts_by_phone) | `phone` OR `mobilephone` contains token, first match |
//! | [`search_calls_by_body`](CrmApi::search_calls_by_body) | calls whose body contains a token |
//! | [`get_contact`](CrmApi::get_contact) | contact read with company association |
//! | [`get_company`](CrmApi::get_company) | company read |
//! | [`create_call`](CrmApi::create_call) | create a call engagement |
//! | [`update_call_body`](CrmApi::update_call_body) | patch a call's notes |
//! | [`associate_typed_batch`](CrmApi::associate_typed_batch) | batch create with explicit type ids |
//! | [`associate_default_batch`](CrmApi::associate_default_batch) | batch create, default type |
//! | [`associate_default`](CrmApi::associate_default) | single pair, default type |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{CallObject, CallProperties, Company, Contact, ObjectType};

/// Error raised by a CRM call.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CrmError {
    #[error("CRM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("CRM transport error: {0}")]
    Transport(String),

    #[error("invalid CRM response: {0}")]
    Decode(String),

    #[error("CRM configuration error: {0}")]
    Config(String),
}

impl CrmError {
    /// Upstream response body, when the CRM answered with an error status.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            CrmError::Api { body, .. } => Some(body),
            _ => None,
        }
    }
}

pub type CrmResult<T> = std::result::Result<T, CrmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationCategory {
    HubspotDefined,
    UserDefined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSpec {
    pub association_category: AssociationCategory,
    pub association_type_id: u32,
}

/// One input of a typed batch-create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedAssociationInput {
    pub from: ObjectRef,
    pub to: ObjectRef,
    pub types: Vec<AssociationSpec>,
}

/// One input of a default-type batch request. Cannot carry a type id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAssociationInput {
    pub from: ObjectRef,
    pub to: ObjectRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Success,
    Error,
}

/// Per-pair result reported by a batch association endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResult {
    pub status: LinkStatus,
    pub from_id: String,
    pub to_id: String,
}

impl LinkResult {
    pub fn success(from_id: impl Into<String>, to_id: impl Into<String>) -> Self {
        Self {
            status: LinkStatus::Success,
            from_id: from_id.into(),
            to_id: to_id.into(),
        }
    }
}

/// The CRM operations the sync engine depends on.
///
/// "Not found" is `Ok(None)` / an empty list; only transport and API
/// failures are errors.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// First contact whose `phone` or `mobilephone` contains `token`.
    async fn search_contacts_by_phone(&self, token: &str) -> CrmResult<Option<Contact>>;

    /// Calls whose body contains `token`.
    async fn search_calls_by_body(&self, token: &str) -> CrmResult<Vec<CallObject>>;

    /// Contact by id, with its first associated company id filled in.
    async fn get_contact(&self, id: &str) -> CrmResult<Option<Contact>>;

    async fn get_company(&self, id: &str) -> CrmResult<Option<Company>>;

    /// Create a call engagement and return its CRM id.
    async fn create_call(&self, props: &CallProperties) -> CrmResult<String>;

    async fn update_call_body(&self, call_id: &str, body: &str) -> CrmResult<()>;

    async fn associate_typed_batch(
        &self,
        from: ObjectType,
        to: ObjectType,
        inputs: &[TypedAssociationInput],
    ) -> CrmResult<Vec<LinkResult>>;

    async fn associate_default_batch(
        &self,
        from: ObjectType,
        to: ObjectType,
        inputs: &[DefaultAssociationInput],
    ) -> CrmResult<Vec<LinkResult>>;

    async fn associate_default(
        &self,
        from: ObjectType,
        from_id: &str,
        to: ObjectType,
        to_id: &str,
    ) -> CrmResult<()>;
}
