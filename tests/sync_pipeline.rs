//! End-to-end pipeline tests against the in-memory CRM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use cdr_sync::client::{ClientSettings, CrmClient};
use cdr_sync::engagement::{EngagementOutcome, EngagementParams};
use cdr_sync::sync::{SyncOrchestrator, SyncSettings};
use cdr_sync::traits::{CallFetcher, CallFilter, CallPage};
use cdr_sync_core::crm::memory::{Endpoint, InMemoryCrm};
use cdr_sync_core::models::{CallRecord, CallStatus, Company, Contact, ObjectType};

struct StaticFetcher(Vec<CallRecord>);

#[async_trait]
impl CallFetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_calls(&self, _filter: &CallFilter) -> Result<CallPage> {
        Ok(CallPage {
            records: self.0.clone(),
            ..Default::default()
        })
    }
}

struct FailingFetcher;

#[async_trait]
impl CallFetcher for FailingFetcher {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_calls(&self, _filter: &CallFilter) -> Result<CallPage> {
        anyhow::bail!("rate limit of 5 requests per minute exceeded; retry in 30s")
    }
}

fn client(crm: &Arc<InMemoryCrm>) -> CrmClient {
    let settings = ClientSettings {
        search_delay: Duration::ZERO,
        ..Default::default()
    };
    CrmClient::new(crm.clone(), &settings)
}

fn record(uuid: &str, destination: &str) -> CallRecord {
    CallRecord::new(
        uuid,
        "05318865036",
        destination,
        "2024-11-05 11:34:51 +0300",
        "00:02:02",
        "Cevaplandı",
        false,
    )
}

fn crm_with_contact(phone: &str) -> Arc<InMemoryCrm> {
    let crm = Arc::new(InMemoryCrm::new());
    crm.add_company(Company {
        id: "55".into(),
        name: Some("Acme".into()),
    });
    crm.add_contact(Contact {
        id: "7".into(),
        first_name: Some("Ayşe".into()),
        last_name: Some("Yılmaz".into()),
        phone: Some(phone.into()),
        company_id: Some("55".into()),
        ..Default::default()
    });
    crm
}

#[tokio::test]
async fn end_to_end_single_record() {
    let crm = crm_with_contact("+905382752273");
    let abc = CallRecord::new(
        "abc-1",
        "1002 (905318865036)",
        "05382752273",
        "2024-11-05 11:34:51 +0300",
        "00:02:02",
        "Cevaplandı",
        true,
    );
    let settings = SyncSettings {
        recording_base_url: "https://santral.test".into(),
        ..Default::default()
    };
    let orchestrator =
        SyncOrchestrator::new(client(&crm), Arc::new(StaticFetcher(vec![abc])), settings);

    let stats = orchestrator.run_sync(None, None).await.unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.contact_matched, 1);
    assert_eq!(stats.company_matched, 1);
    assert_eq!(stats.success_rate(), 100.0);

    let calls = crm.calls();
    assert_eq!(calls.len(), 1);
    let props = &calls[0].props;
    assert!(props.body.contains("abc-1"));
    assert_eq!(props.duration_secs, 122);
    assert_eq!(props.status, CallStatus::Completed);
    assert_eq!(props.title, "Call with Ayşe Yılmaz - Santral");
    assert_eq!(props.from_number, "1002");
    assert_eq!(props.to_number, "+905382752273");
    assert_eq!(props.timestamp_ms, 1_730_795_691_000);
    assert_eq!(props.recording_url, "https://santral.test/recording/abc-1");
    assert!(props.body.contains("• Recording available"));

    let links = crm.associations();
    assert!(links.iter().any(|a| a.to == ObjectType::Contacts && a.to_id == "7"));
    assert!(links.iter().any(|a| a.to == ObjectType::Companies && a.to_id == "55"));
}

#[tokio::test]
async fn engagement_write_is_idempotent() {
    let crm = crm_with_contact("05382752273");
    let client = client(&crm);
    let params = EngagementParams {
        from_number: "05318865036".into(),
        to_number: "05382752273".into(),
        duration_secs: 122,
        status_text: "Cevaplandı".into(),
        timestamp_ms: 1_730_795_691_000,
        call_uuid: "abc-1".into(),
        ..Default::default()
    };

    let first = client.writer.create_engagement(&params).await.unwrap();
    let second = client.writer.create_engagement(&params).await.unwrap();

    assert!(first.is_success());
    assert_eq!(second, EngagementOutcome::Duplicate);
    assert_eq!(crm.calls().len(), 1);
    assert_eq!(crm.request_count(Endpoint::CallCreate), 1);
}

#[tokio::test]
async fn rerun_skips_synced_records() {
    let crm = crm_with_contact("+905382752273");
    let orchestrator = SyncOrchestrator::new(
        client(&crm),
        Arc::new(StaticFetcher(vec![
            record("abc-1", "05382752273"),
            record("abc-2", "05382752273"),
        ])),
        SyncSettings::default(),
    );

    let first = orchestrator.run_sync(None, None).await.unwrap();
    let second = orchestrator.run_sync(None, None).await.unwrap();

    assert_eq!(first.success, 2);
    assert_eq!(second.success, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(crm.calls().len(), 2);
}

#[tokio::test]
async fn association_falls_back_through_tiers() {
    let crm = crm_with_contact("+905382752273");
    crm.fail(Endpoint::TypedBatch);
    crm.fail(Endpoint::DefaultBatch);
    let client = client(&crm);

    let outcome = client
        .writer
        .create_engagement(&EngagementParams {
            to_number: "05382752273".into(),
            status_text: "Cevaplandı".into(),
            call_uuid: "abc-9".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let EngagementOutcome::Created(created) = outcome else {
        panic!("expected a created engagement");
    };
    assert_eq!(created.associations.len(), 2);
    assert!(created.associations.iter().all(|a| a.is_success()));
    assert_eq!(crm.request_count(Endpoint::TypedBatch), 2);
    assert_eq!(crm.request_count(Endpoint::DefaultBatch), 2);
    assert_eq!(crm.request_count(Endpoint::DefaultSingle), 2);
    assert!(crm.associations().iter().all(|a| a.type_id.is_none()));
}

#[tokio::test]
async fn one_failing_record_does_not_stop_the_batch() {
    let crm = Arc::new(InMemoryCrm::new());
    let destinations = [
        "05382752271",
        "05382752272",
        "05382752273",
        "05382752274",
        "05382752275",
    ];
    for (i, phone) in destinations.iter().enumerate() {
        crm.add_contact(Contact {
            id: format!("{}", 10 + i),
            phone: Some(phone.to_string()),
            ..Default::default()
        });
    }
    crm.fail_create_when_body_contains("uuid-3");

    let records: Vec<CallRecord> = destinations
        .iter()
        .enumerate()
        .map(|(i, d)| record(&format!("uuid-{}", i + 1), d))
        .collect();
    let orchestrator = SyncOrchestrator::new(
        client(&crm),
        Arc::new(StaticFetcher(records)),
        SyncSettings::default(),
    );

    let stats = orchestrator.run_sync(None, None).await.unwrap();

    assert_eq!(stats.total, 5);
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.success, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].uuid, "uuid-3");
    assert_eq!(stats.errors[0].number, "05382752273");
    assert!(stats.errors[0].error.contains("502"));
    assert_eq!(crm.calls().len(), 4);

    let log = orchestrator.client().error_log();
    assert!(log.entries().iter().any(|e| e.method == "create_engagement"));
}

#[tokio::test]
async fn unmatched_and_malformed_records() {
    let crm = crm_with_contact("+905382752273");
    let mut malformed = record("bad-1", "05382752273");
    malformed.duration = "two minutes".into();
    let mut overflowing = record("bad-2", "05382752273");
    overflowing.duration = "9999999999999999:00:00".into();

    let orchestrator = SyncOrchestrator::new(
        client(&crm),
        Arc::new(StaticFetcher(vec![
            record("none-1", "05009999999"),
            record("junk-1", "not-a-number"),
            malformed,
            overflowing,
            record("ok-1", "05382752273"),
        ])),
        SyncSettings::default(),
    );

    let stats = orchestrator.run_sync(None, None).await.unwrap();

    assert_eq!(stats.processed, 5);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.success, 1);
    assert!(stats.errors[0].error.contains("invalid duration"));
    assert_eq!(stats.errors[1].uuid, "bad-2");
    assert!(stats.errors[1].error.contains("invalid duration"));
    assert_eq!(crm.calls().len(), 1);
    assert!(crm.calls()[0].props.body.contains("ok-1"));
    assert_eq!(stats.match_rate(), 20.0);
}

#[tokio::test]
async fn fetch_failure_aborts_the_run() {
    let crm = Arc::new(InMemoryCrm::new());
    let orchestrator =
        SyncOrchestrator::new(client(&crm), Arc::new(FailingFetcher), SyncSettings::default());

    let err = orchestrator.run_sync(None, None).await.unwrap_err();
    assert!(format!("{:#}", err).contains("rate limit"));
}

#[tokio::test]
async fn duplicate_check_fails_open() {
    let crm = crm_with_contact("+905382752273");
    crm.fail(Endpoint::CallSearch);
    let orchestrator = SyncOrchestrator::new(
        client(&crm),
        Arc::new(StaticFetcher(vec![record("abc-1", "05382752273")])),
        SyncSettings::default(),
    );

    let stats = orchestrator.run_sync(None, None).await.unwrap();

    assert_eq!(stats.success, 1);
    assert_eq!(crm.calls().len(), 1);
    assert!(orchestrator
        .client()
        .error_log()
        .entries()
        .iter()
        .all(|e| e.method == "has_existing_engagement"));
}
