//! HubSpot CRM client.
//!
//! Implements [`CrmApi`] over the HubSpot REST API with a private-app
//! bearer token:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | contact search | `POST /crm/v3/objects/contacts/search` |
//! | call search | `POST /crm/v3/objects/calls/search` |
//! | contact read | `GET /crm/v3/objects/contacts/{id}?associations=companies` |
//! | company read | `GET /crm/v3/objects/companies/{id}` |
//! | call create / patch | `POST /crm/v3/objects/calls`, `PATCH .../calls/{id}` |
//! | typed batch | `POST /crm/v4/associations/{from}/{to}/batch/create` |
//! | default batch | `POST /crm/v4/associations/{from}/{to}/batch/associate/default` |
//! | single default | `PUT /crm/v4/objects/{from}/{id}/associations/default/{to}/{id}` |
//!
//! Non-2xx answers become [`CrmError::Api`] carrying the response body. A
//! 404 on an object read is `Ok(None)`.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use cdr_sync_core::crm::{
    CrmApi, CrmError, CrmResult, DefaultAssociationInput, LinkResult, LinkStatus,
    TypedAssociationInput,
};
use cdr_sync_core::models::{CallObject, CallProperties, Company, Contact, ObjectType};

use crate::config::HubspotConfig;

const CONTACT_PROPERTIES: &[&str] = &["firstname", "lastname", "phone", "mobilephone", "company"];

#[derive(Debug, Serialize)]
struct SearchRequest {
    #[serde(rename = "filterGroups")]
    filter_groups: Vec<FilterGroup>,
    properties: Vec<String>,
    limit: u32,
}

#[derive(Debug, Serialize)]
struct FilterGroup {
    filters: Vec<Filter>,
}

#[derive(Debug, Serialize)]
struct Filter {
    #[serde(rename = "propertyName")]
    property_name: String,
    operator: String,
    value: String,
}

impl Filter {
    fn contains_token(property: &str, value: &str) -> Self {
        Self {
            property_name: property.to_string(),
            operator: "CONTAINS_TOKEN".to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<HubspotObject>,
}

#[derive(Debug, Deserialize, Clone)]
struct HubspotObject {
    id: String,
    #[serde(default)]
    properties: Value,
    #[serde(default)]
    associations: Value,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Serialize)]
struct BatchInputs<'a, T> {
    inputs: &'a [T],
}

#[derive(Clone)]
pub struct HubSpotClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HubSpotClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &HubspotConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.access_token()?,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder) -> CrmResult<reqwest::Response> {
        let response = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| CrmError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CrmError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> CrmResult<T> {
        self.send(req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CrmError::Decode(e.to_string()))
    }

    async fn get_object(&self, path: &str, query: &[(&str, &str)]) -> CrmResult<Option<HubspotObject>> {
        match self.send_json(self.client.get(self.url(path)).query(query)).await {
            Ok(obj) => Ok(Some(obj)),
            Err(CrmError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search(&self, object: &str, request: &SearchRequest) -> CrmResult<Vec<HubspotObject>> {
        let url = self.url(&format!("/crm/v3/objects/{}/search", object));
        let response: SearchResponse = self.send_json(self.client.post(url).json(request)).await?;
        Ok(response.results)
    }

    async fn batch_associate<T: Serialize + Sync>(
        &self,
        path: String,
        inputs: &[T],
        pairs: Vec<(String, String)>,
    ) -> CrmResult<Vec<LinkResult>> {
        let body: Value = self
            .send_json(self.client.post(self.url(&path)).json(&BatchInputs { inputs }))
            .await?;
        parse_link_results(&body, &pairs)
    }
}

#[async_trait]
impl CrmApi for HubSpotClient {
    #[instrument(level = "debug", skip(self))]
    async fn search_contacts_by_phone(&self, token: &str) -> CrmResult<Option<Contact>> {
        let request = SearchRequest {
            filter_groups: vec![
                FilterGroup {
                    filters: vec![Filter::contains_token("phone", token)],
                },
                FilterGroup {
                    filters: vec![Filter::contains_token("mobilephone", token)],
                },
            ],
            properties: CONTACT_PROPERTIES.iter().map(|s| s.to_string()).collect(),
            limit: 1,
        };
        let results = self.search("contacts", &request).await?;
        Ok(results.first().map(contact_from_object))
    }

    #[instrument(level = "debug", skip(self))]
    async fn search_calls_by_body(&self, token: &str) -> CrmResult<Vec<CallObject>> {
        let request = SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter::contains_token("hs_call_body", token)],
            }],
            properties: vec!["hs_call_body".to_string()],
            limit: 10,
        };
        let results = self.search("calls", &request).await?;
        Ok(results
            .into_iter()
            .map(|obj| CallObject {
                body: prop(&obj.properties, "hs_call_body"),
                id: obj.id,
            })
            .collect())
    }

    async fn get_contact(&self, id: &str) -> CrmResult<Option<Contact>> {
        let properties = CONTACT_PROPERTIES.join(",");
        let obj = self
            .get_object(
                &format!("/crm/v3/objects/contacts/{}", id),
                &[("associations", "companies"), ("properties", properties.as_str())],
            )
            .await?;
        Ok(obj.as_ref().map(contact_from_object))
    }

    async fn get_company(&self, id: &str) -> CrmResult<Option<Company>> {
        let obj = self
            .get_object(
                &format!("/crm/v3/objects/companies/{}", id),
                &[("properties", "name")],
            )
            .await?;
        Ok(obj.map(|o| Company {
            name: prop(&o.properties, "name"),
            id: o.id,
        }))
    }

    async fn create_call(&self, props: &CallProperties) -> CrmResult<String> {
        let body = json!({ "properties": call_properties(props) });
        let created: CreatedObject = self
            .send_json(self.client.post(self.url("/crm/v3/objects/calls")).json(&body))
            .await?;
        debug!(call_id = created.id.as_str(), "call object created");
        Ok(created.id)
    }

    async fn update_call_body(&self, call_id: &str, body: &str) -> CrmResult<()> {
        let payload = json!({ "properties": { "hs_call_body": body } });
        let url = self.url(&format!("/crm/v3/objects/calls/{}", call_id));
        self.send(self.client.patch(url).json(&payload)).await?;
        Ok(())
    }

    async fn associate_typed_batch(
        &self,
        from: ObjectType,
        to: ObjectType,
        inputs: &[TypedAssociationInput],
    ) -> CrmResult<Vec<LinkResult>> {
        let pairs = inputs
            .iter()
            .map(|i| (i.from.id.clone(), i.to.id.clone()))
            .collect();
        self.batch_associate(
            format!("/crm/v4/associations/{}/{}/batch/create", from, to),
            inputs,
            pairs,
        )
        .await
    }

    async fn associate_default_batch(
        &self,
        from: ObjectType,
        to: ObjectType,
        inputs: &[DefaultAssociationInput],
    ) -> CrmResult<Vec<LinkResult>> {
        let pairs = inputs
            .iter()
            .map(|i| (i.from.id.clone(), i.to.id.clone()))
            .collect();
        self.batch_associate(
            format!("/crm/v4/associations/{}/{}/batch/associate/default", from, to),
            inputs,
            pairs,
        )
        .await
    }

    async fn associate_default(
        &self,
        from: ObjectType,
        from_id: &str,
        to: ObjectType,
        to_id: &str,
    ) -> CrmResult<()> {
        let url = self.url(&format!(
            "/crm/v4/objects/{}/{}/associations/default/{}/{}",
            from, from_id, to, to_id
        ));
        self.send(self.client.put(url)).await?;
        Ok(())
    }
}

fn call_properties(props: &CallProperties) -> Value {
    json!({
        "hs_call_direction": props.direction.as_str(),
        "hs_call_duration": props.duration_secs.to_string(),
        "hs_call_from_number": props.from_number,
        "hs_call_to_number": props.to_number,
        "hs_call_recording_url": props.recording_url,
        "hs_call_status": props.status.as_str(),
        "hs_call_title": props.title,
        "hs_timestamp": props.timestamp_ms.to_string(),
        "hs_call_body": props.body,
    })
}

fn prop(properties: &Value, name: &str) -> Option<String> {
    properties
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn contact_from_object(obj: &HubspotObject) -> Contact {
    // v3 reads key the expansion by the plural object name.
    let company_id = ["companies", "company"]
        .iter()
        .find_map(|key| obj.associations.get(*key))
        .and_then(|a| a.get("results"))
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|r| r.get("id"))
        .and_then(id_string);

    Contact {
        id: obj.id.clone(),
        first_name: prop(&obj.properties, "firstname"),
        last_name: prop(&obj.properties, "lastname"),
        phone: prop(&obj.properties, "phone"),
        mobile_phone: prop(&obj.properties, "mobilephone"),
        company: prop(&obj.properties, "company"),
        company_id,
    }
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Batch endpoints answer with `results` for created links (either
// `fromObjectId`/`toObjectId` or `from.id`/`to.id`) and `errors` for the
// rest. A response with errors and no results counts as a failed request.
fn parse_link_results(body: &Value, requested: &[(String, String)]) -> CrmResult<Vec<LinkResult>> {
    let results = body
        .get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let errors = body
        .get("errors")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    if results.is_empty() && errors > 0 {
        return Err(CrmError::Api {
            status: StatusCode::MULTI_STATUS.as_u16(),
            body: body.to_string(),
        });
    }

    let linked: HashSet<(String, String)> = results
        .iter()
        .filter_map(|r| {
            let from = r
                .get("fromObjectId")
                .or_else(|| r.get("from").and_then(|f| f.get("id")))
                .and_then(id_string)?;
            let to = r
                .get("toObjectId")
                .or_else(|| r.get("to").and_then(|t| t.get("id")))
                .and_then(id_string)?;
            Some((from, to))
        })
        .collect();

    Ok(requested
        .iter()
        .map(|(from, to)| LinkResult {
            status: if linked.contains(&(from.clone(), to.clone())) {
                LinkStatus::Success
            } else {
                LinkStatus::Error
            },
            from_id: from.clone(),
            to_id: to.clone(),
        })
        .collect())
}
