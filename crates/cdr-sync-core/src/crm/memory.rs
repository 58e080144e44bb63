//! In-memory [`CrmApi`] implementation for tests and dry runs.
//!
//! Holds contacts, companies, calls, and associations behind
//! `std::sync::RwLock`. Token searches split field values on whitespace and
//! common separators and compare whole tokens. Individual endpoints can be
//! made to fail, and every request is counted per [`Endpoint`], so tests can
//! assert which fallback path ran.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::{CallObject, CallProperties, Company, Contact, ObjectType};

use super::{
    CrmApi, CrmError, CrmResult, DefaultAssociationInput, LinkResult, TypedAssociationInput,
};

/// CRM endpoints, for request counting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ContactSearch,
    CallSearch,
    ContactRead,
    CompanyRead,
    CallCreate,
    CallUpdate,
    TypedBatch,
    DefaultBatch,
    DefaultSingle,
}

/// A call engagement stored by [`InMemoryCrm`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCall {
    pub id: String,
    pub props: CallProperties,
}

/// An association stored by [`InMemoryCrm`]. `type_id` is `None` when a
/// default-type endpoint created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAssociation {
    pub from: ObjectType,
    pub from_id: String,
    pub to: ObjectType,
    pub to_id: String,
    pub type_id: Option<u32>,
}

#[derive(Default)]
struct Faults {
    failing: HashSet<Endpoint>,
    failing_single_targets: HashSet<String>,
    failing_create_tokens: Vec<String>,
}

/// In-memory CRM for tests.
pub struct InMemoryCrm {
    contacts: RwLock<Vec<Contact>>,
    companies: RwLock<HashMap<String, Company>>,
    calls: RwLock<Vec<StoredCall>>,
    associations: RwLock<Vec<StoredAssociation>>,
    faults: RwLock<Faults>,
    requests: RwLock<HashMap<Endpoint, usize>>,
    next_id: RwLock<u64>,
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self {
            contacts: RwLock::new(Vec::new()),
            companies: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            associations: RwLock::new(Vec::new()),
            faults: RwLock::new(Faults::default()),
            requests: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1000),
        }
    }

    pub fn add_contact(&self, contact: Contact) {
        self.contacts.write().unwrap().push(contact);
    }

    pub fn add_company(&self, company: Company) {
        self.companies
            .write()
            .unwrap()
            .insert(company.id.clone(), company);
    }

    /// Make every request to `endpoint` fail with an API error.
    pub fn fail(&self, endpoint: Endpoint) {
        self.faults.write().unwrap().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.faults.write().unwrap().failing.remove(&endpoint);
    }

    /// Make single-pair associations targeting `to_id` fail.
    pub fn fail_single_association_to(&self, to_id: impl Into<String>) {
        self.faults
            .write()
            .unwrap()
            .failing_single_targets
            .insert(to_id.into());
    }

    /// Make call creation fail when the body contains `token`.
    pub fn fail_create_when_body_contains(&self, token: impl Into<String>) {
        self.faults
            .write()
            .unwrap()
            .failing_create_tokens
            .push(token.into());
    }

    pub fn calls(&self) -> Vec<StoredCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn associations(&self) -> Vec<StoredAssociation> {
        self.associations.read().unwrap().clone()
    }

    /// Number of requests made to `endpoint`, including failed ones.
    pub fn request_count(&self, endpoint: Endpoint) -> usize {
        self.requests
            .read()
            .unwrap()
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, endpoint: Endpoint) -> CrmResult<()> {
        *self.requests.write().unwrap().entry(endpoint).or_insert(0) += 1;
        if self.faults.read().unwrap().failing.contains(&endpoint) {
            return Err(CrmError::Api {
                status: 500,
                body: format!("{{\"message\":\"injected failure: {:?}\"}}", endpoint),
            });
        }
        Ok(())
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.write().unwrap();
        *next += 1;
        next.to_string()
    }

    fn record_association(&self, from: ObjectType, from_id: &str, to: ObjectType, to_id: &str, type_id: Option<u32>) {
        self.associations.write().unwrap().push(StoredAssociation {
            from,
            from_id: from_id.to_string(),
            to,
            to_id: to_id.to_string(),
            type_id,
        });
    }
}

impl Default for InMemoryCrm {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `field` contains `token` as a whole token.
pub fn contains_token(field: &str, token: &str) -> bool {
    !token.is_empty()
        && field
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '/'))
            .any(|t| t == token)
}

#[async_trait]
impl CrmApi for InMemoryCrm {
    async fn search_contacts_by_phone(&self, token: &str) -> CrmResult<Option<Contact>> {
        self.enter(Endpoint::ContactSearch)?;
        let contacts = self.contacts.read().unwrap();
        Ok(contacts
            .iter()
            .find(|c| {
                c.phone.as_deref().is_some_and(|p| contains_token(p, token))
                    || c.mobile_phone
                        .as_deref()
                        .is_some_and(|p| contains_token(p, token))
            })
            .cloned())
    }

    async fn search_calls_by_body(&self, token: &str) -> CrmResult<Vec<CallObject>> {
        self.enter(Endpoint::CallSearch)?;
        let calls = self.calls.read().unwrap();
        Ok(calls
            .iter()
            .filter(|c| contains_token(&c.props.body, token))
            .map(|c| CallObject {
                id: c.id.clone(),
                body: Some(c.props.body.clone()),
            })
            .collect())
    }

    async fn get_contact(&self, id: &str) -> CrmResult<Option<Contact>> {
        self.enter(Endpoint::ContactRead)?;
        let contacts = self.contacts.read().unwrap();
        Ok(contacts.iter().find(|c| c.id == id).cloned())
    }

    async fn get_company(&self, id: &str) -> CrmResult<Option<Company>> {
        self.enter(Endpoint::CompanyRead)?;
        Ok(self.companies.read().unwrap().get(id).cloned())
    }

    async fn create_call(&self, props: &CallProperties) -> CrmResult<String> {
        self.enter(Endpoint::CallCreate)?;
        let blocked = self
            .faults
            .read()
            .unwrap()
            .failing_create_tokens
            .iter()
            .any(|t| props.body.contains(t.as_str()));
        if blocked {
            return Err(CrmError::Api {
                status: 502,
                body: "{\"message\":\"bad gateway\"}".to_string(),
            });
        }
        let id = self.allocate_id();
        self.calls.write().unwrap().push(StoredCall {
            id: id.clone(),
            props: props.clone(),
        });
        Ok(id)
    }

    async fn update_call_body(&self, call_id: &str, body: &str) -> CrmResult<()> {
        self.enter(Endpoint::CallUpdate)?;
        let mut calls = self.calls.write().unwrap();
        match calls.iter_mut().find(|c| c.id == call_id) {
            Some(call) => {
                call.props.body = body.to_string();
                Ok(())
            }
            None => Err(CrmError::Api {
                status: 404,
                body: format!("{{\"message\":\"call {} not found\"}}", call_id),
            }),
        }
    }

    async fn associate_typed_batch(
        &self,
        from: ObjectType,
        to: ObjectType,
        inputs: &[TypedAssociationInput],
    ) -> CrmResult<Vec<LinkResult>> {
        self.enter(Endpoint::TypedBatch)?;
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let type_id = input.types.first().map(|t| t.association_type_id);
            self.record_association(from, &input.from.id, to, &input.to.id, type_id);
            results.push(LinkResult::success(&input.from.id, &input.to.id));
        }
        Ok(results)
    }

    async fn associate_default_batch(
        &self,
        from: ObjectType,
        to: ObjectType,
        inputs: &[DefaultAssociationInput],
    ) -> CrmResult<Vec<LinkResult>> {
        self.enter(Endpoint::DefaultBatch)?;
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            self.record_association(from, &input.from.id, to, &input.to.id, None);
            results.push(LinkResult::success(&input.from.id, &input.to.id));
        }
        Ok(results)
    }

    async fn associate_default(
        &self,
        from: ObjectType,
        from_id: &str,
        to: ObjectType,
        to_id: &str,
    ) -> CrmResult<()> {
        self.enter(Endpoint::DefaultSingle)?;
        if self
            .faults
            .read()
            .unwrap()
            .failing_single_targets
            .contains(to_id)
        {
            return Err(CrmError::Api {
                status: 400,
                body: format!("{{\"message\":\"cannot associate {}\"}}", to_id),
            });
        }
        self.record_association(from, from_id, to, to_id, None);
        Ok(())
    }
}
