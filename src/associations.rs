//! Association pipeline with tiered fallback.
//!
//! Links between CRM objects are created in batches grouped by
//! `(from type, to type)` and chunked to the CRM's per-request limit. Each
//! chunk goes through up to three endpoint shapes:
//!
//! 1. **Typed batch**: batch create carrying explicit association type ids.
//! 2. **Default batch**: batch create using the CRM's default type.
//! 3. **Individual**: one default-type request per pair.
//!
//! A tier that fails hands the whole chunk to the next one. A failure in the
//! individual tier is fatal for the run of `link_objects`. Each outcome
//! records the tier that produced it.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use cdr_sync_core::crm::{
    AssociationCategory, AssociationSpec, CrmApi, CrmResult, DefaultAssociationInput, LinkResult,
    LinkStatus, ObjectRef, TypedAssociationInput,
};
use cdr_sync_core::models::{AssociationKind, ObjectType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationTier {
    TypedBatch,
    DefaultBatch,
    Individual,
}

impl AssociationTier {
    const BATCH_TIERS: [AssociationTier; 2] =
        [AssociationTier::TypedBatch, AssociationTier::DefaultBatch];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationTier::TypedBatch => "typed_batch",
            AssociationTier::DefaultBatch => "default_batch",
            AssociationTier::Individual => "individual",
        }
    }
}

/// One requested link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationPair {
    pub from_id: String,
    pub to_id: String,
    pub type_id: u32,
}

/// A link request tagged with the object types it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRequest {
    pub from_type: ObjectType,
    pub to_type: ObjectType,
    pub pair: AssociationPair,
}

impl AssociationRequest {
    pub fn new(kind: AssociationKind, from_id: &str, to_id: &str) -> Self {
        Self {
            from_type: kind.from_type(),
            to_type: kind.to_type(),
            pair: AssociationPair {
                from_id: from_id.to_string(),
                to_id: to_id.to_string(),
                type_id: kind.type_id(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkOutcome {
    pub status: LinkStatus,
    pub from_id: String,
    pub to_id: String,
    #[serde(skip)]
    pub to_type: ObjectType,
    pub tier: AssociationTier,
}

impl LinkOutcome {
    pub fn is_success(&self) -> bool {
        self.status == LinkStatus::Success
    }
}

/// Per-kind outcomes of linking one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLinks {
    pub contact: Option<LinkOutcome>,
    pub company: Option<LinkOutcome>,
}

impl CallLinks {
    pub fn all(&self) -> Vec<LinkOutcome> {
        self.contact.iter().chain(self.company.iter()).cloned().collect()
    }
}

// Request payload for one tier. Each shape only admits the fields its
// endpoint accepts.
enum TierRequest<'a> {
    Typed(Vec<TypedAssociationInput>),
    Default(Vec<DefaultAssociationInput>),
    Individual(&'a [AssociationPair]),
}

impl<'a> TierRequest<'a> {
    fn build(tier: AssociationTier, pairs: &'a [AssociationPair]) -> Self {
        match tier {
            AssociationTier::TypedBatch => TierRequest::Typed(
                pairs
                    .iter()
                    .map(|p| TypedAssociationInput {
                        from: ObjectRef::new(&p.from_id),
                        to: ObjectRef::new(&p.to_id),
                        types: vec![AssociationSpec {
                            association_category: AssociationCategory::HubspotDefined,
                            association_type_id: p.type_id,
                        }],
                    })
                    .collect(),
            ),
            AssociationTier::DefaultBatch => TierRequest::Default(
                pairs
                    .iter()
                    .map(|p| DefaultAssociationInput {
                        from: ObjectRef::new(&p.from_id),
                        to: ObjectRef::new(&p.to_id),
                    })
                    .collect(),
            ),
            AssociationTier::Individual => TierRequest::Individual(pairs),
        }
    }
}

#[derive(Clone)]
pub struct AssociationPipeline {
    crm: Arc<dyn CrmApi>,
    batch_size: usize,
}

impl AssociationPipeline {
    pub fn new(crm: Arc<dyn CrmApi>, batch_size: usize) -> Self {
        Self {
            crm,
            batch_size: batch_size.max(1),
        }
    }

    /// Link `pairs` from `from_type` objects to `to_type` objects.
    pub async fn link_objects(
        &self,
        from_type: ObjectType,
        to_type: ObjectType,
        pairs: &[AssociationPair],
    ) -> Result<Vec<LinkOutcome>> {
        let mut outcomes = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(self.batch_size) {
            outcomes.extend(self.link_chunk(from_type, to_type, chunk).await?);
        }
        Ok(outcomes)
    }

    /// Link a mixed set of requests, grouped by object-type pair.
    pub async fn link_all(&self, requests: &[AssociationRequest]) -> Result<Vec<LinkOutcome>> {
        let mut groups: BTreeMap<(ObjectType, ObjectType), Vec<AssociationPair>> = BTreeMap::new();
        for req in requests {
            groups
                .entry((req.from_type, req.to_type))
                .or_default()
                .push(req.pair.clone());
        }

        let mut outcomes = Vec::with_capacity(requests.len());
        for ((from_type, to_type), pairs) in groups {
            outcomes.extend(self.link_objects(from_type, to_type, &pairs).await?);
        }
        Ok(outcomes)
    }

    /// Link a call to its contact and company.
    pub async fn link_call(
        &self,
        call_id: &str,
        contact_id: Option<&str>,
        company_id: Option<&str>,
    ) -> Result<CallLinks> {
        let mut requests = Vec::new();
        if let Some(id) = contact_id {
            requests.push(AssociationRequest::new(AssociationKind::CallToContact, call_id, id));
        }
        if let Some(id) = company_id {
            requests.push(AssociationRequest::new(AssociationKind::CallToCompany, call_id, id));
        }
        if requests.is_empty() {
            return Ok(CallLinks::default());
        }

        let outcomes = self.link_all(&requests).await?;
        let pick = |to_type: ObjectType, to_id: Option<&str>| {
            to_id.and_then(|id| {
                outcomes
                    .iter()
                    .find(|o| o.to_type == to_type && o.to_id == id)
                    .cloned()
            })
        };

        Ok(CallLinks {
            contact: pick(ObjectType::Contacts, contact_id),
            company: pick(ObjectType::Companies, company_id),
        })
    }

    async fn link_chunk(
        &self,
        from_type: ObjectType,
        to_type: ObjectType,
        pairs: &[AssociationPair],
    ) -> Result<Vec<LinkOutcome>> {
        for tier in AssociationTier::BATCH_TIERS {
            match self.send(from_type, to_type, TierRequest::build(tier, pairs)).await {
                Ok(results) => return Ok(tag(results, from_type, to_type, tier)),
                Err(e) => warn!(
                    from = %from_type,
                    to = %to_type,
                    tier = tier.as_str(),
                    error = %e,
                    "association tier failed, falling back"
                ),
            }
        }

        let tier = AssociationTier::Individual;
        let results = self
            .send(from_type, to_type, TierRequest::build(tier, pairs))
            .await
            .with_context(|| format!("failed to associate {} with {}", from_type, to_type))?;
        Ok(tag(results, from_type, to_type, tier))
    }

    async fn send(
        &self,
        from_type: ObjectType,
        to_type: ObjectType,
        request: TierRequest<'_>,
    ) -> CrmResult<Vec<LinkResult>> {
        match request {
            TierRequest::Typed(inputs) => {
                self.crm
                    .associate_typed_batch(from_type, to_type, &inputs)
                    .await
            }
            TierRequest::Default(inputs) => {
                self.crm
                    .associate_default_batch(from_type, to_type, &inputs)
                    .await
            }
            TierRequest::Individual(pairs) => {
                let mut results = Vec::with_capacity(pairs.len());
                for p in pairs {
                    self.crm
                        .associate_default(from_type, &p.from_id, to_type, &p.to_id)
                        .await?;
                    results.push(LinkResult::success(&p.from_id, &p.to_id));
                }
                Ok(results)
            }
        }
    }
}

fn tag(
    results: Vec<LinkResult>,
    from_type: ObjectType,
    to_type: ObjectType,
    tier: AssociationTier,
) -> Vec<LinkOutcome> {
    debug!(
        from = %from_type,
        to = %to_type,
        tier = tier.as_str(),
        count = results.len(),
        "associations created"
    );
    results
        .into_iter()
        .map(|r| LinkOutcome {
            status: r.status,
            from_id: r.from_id,
            to_id: r.to_id,
            to_type,
            tier,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdr_sync_core::crm::memory::{Endpoint, InMemoryCrm};

    fn pairs(n: usize) -> Vec<AssociationPair> {
        (0..n)
            .map(|i| AssociationPair {
                from_id: format!("c{}", i),
                to_id: format!("p{}", i),
                type_id: 219,
            })
            .collect()
    }

    #[tokio::test]
    async fn typed_batch_carries_type_ids() {
        let crm = Arc::new(InMemoryCrm::new());
        let pipeline = AssociationPipeline::new(crm.clone(), 100);

        let outcomes = pipeline
            .link_objects(ObjectType::Calls, ObjectType::Contacts, &pairs(2))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.tier == AssociationTier::TypedBatch));
        assert!(crm.associations().iter().all(|a| a.type_id == Some(219)));
        assert_eq!(crm.request_count(Endpoint::DefaultBatch), 0);
    }

    #[tokio::test]
    async fn chunks_respect_batch_size() {
        let crm = Arc::new(InMemoryCrm::new());
        let pipeline = AssociationPipeline::new(crm.clone(), 2);

        let outcomes = pipeline
            .link_objects(ObjectType::Calls, ObjectType::Contacts, &pairs(5))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 5);
        assert_eq!(crm.request_count(Endpoint::TypedBatch), 3);
    }

    #[tokio::test]
    async fn falls_back_to_default_batch() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.fail(Endpoint::TypedBatch);
        let pipeline = AssociationPipeline::new(crm.clone(), 100);

        let outcomes = pipeline
            .link_objects(ObjectType::Calls, ObjectType::Contacts, &pairs(3))
            .await
            .unwrap();

        assert!(outcomes.iter().all(|o| o.tier == AssociationTier::DefaultBatch));
        assert_eq!(crm.request_count(Endpoint::DefaultBatch), 1);
        assert_eq!(crm.request_count(Endpoint::DefaultSingle), 0);
    }

    #[tokio::test]
    async fn falls_back_to_individual_requests() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.fail(Endpoint::TypedBatch);
        crm.fail(Endpoint::DefaultBatch);
        let pipeline = AssociationPipeline::new(crm.clone(), 100);

        let outcomes = pipeline
            .link_objects(ObjectType::Calls, ObjectType::Contacts, &pairs(3))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.tier == AssociationTier::Individual));
        assert_eq!(crm.request_count(Endpoint::DefaultSingle), 3);
        assert_eq!(crm.associations().len(), 3);
    }

    #[tokio::test]
    async fn individual_failure_is_fatal() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.fail(Endpoint::TypedBatch);
        crm.fail(Endpoint::DefaultBatch);
        crm.fail_single_association_to("p1");
        let pipeline = AssociationPipeline::new(crm.clone(), 100);

        let err = pipeline
            .link_objects(ObjectType::Calls, ObjectType::Contacts, &pairs(3))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed to associate calls with contacts"));
        // p0 was linked before p1 failed; p2 was never attempted.
        assert_eq!(crm.request_count(Endpoint::DefaultSingle), 2);
    }

    #[tokio::test]
    async fn link_call_matches_by_type_and_id() {
        let crm = Arc::new(InMemoryCrm::new());
        let pipeline = AssociationPipeline::new(crm.clone(), 100);

        // Contact and company sharing an id must not be confused.
        let links = pipeline.link_call("900", Some("42"), Some("42")).await.unwrap();

        let contact = links.contact.unwrap();
        let company = links.company.unwrap();
        assert_eq!(contact.to_type, ObjectType::Contacts);
        assert_eq!(company.to_type, ObjectType::Companies);
        assert!(contact.is_success() && company.is_success());
        assert_eq!(crm.request_count(Endpoint::TypedBatch), 2);

        let types: Vec<Option<u32>> = crm.associations().iter().map(|a| a.type_id).collect();
        assert!(types.contains(&Some(219)) && types.contains(&Some(220)));
    }

    #[tokio::test]
    async fn link_call_without_targets_is_a_no_op() {
        let crm = Arc::new(InMemoryCrm::new());
        let pipeline = AssociationPipeline::new(crm.clone(), 100);
        let links = pipeline.link_call("900", None, None).await.unwrap();
        assert_eq!(links, CallLinks::default());
        assert_eq!(crm.request_count(Endpoint::TypedBatch), 0);
    }
}
