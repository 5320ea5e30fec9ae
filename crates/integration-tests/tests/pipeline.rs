//! End-to-end ingestion: enqueue → claim → handler → fiscal API (scripted) →
//! storage organizer → filesystem, with job state in SQLite.

mod common;

use common::{xml_doc, Harness, CNPJ, MINUTE_MS, TENANT_ID};
use nfse_core::application::EnqueueRequest;
use nfse_core::domain::{JobKind, JobStatus, Period, Tenant};
use nfse_core::port::{TenantRegistry, TimeProvider};
use serde_json::json;

fn period(s: &str) -> Period {
    s.parse().unwrap()
}

async fn enqueue(h: &Harness, kind: JobKind, payload: serde_json::Value) -> String {
    h.ingest
        .enqueue_request(EnqueueRequest {
            tenant_id: TENANT_ID.to_string(),
            kind,
            payload,
            priority: None,
            not_before: None,
            max_retries: None,
        })
        .await
        .unwrap()
        .into_job()
        .id
}

#[tokio::test]
async fn test_consult_period_stores_documents_on_disk() {
    let h = Harness::new().await;
    h.source.add_documents(
        TENANT_ID,
        period("2025-08"),
        vec![
            xml_doc("101", "<nfse><numero>101</numero></nfse>"),
            xml_doc("102", "<nfse><numero>102</numero></nfse>"),
        ],
    );

    let id = enqueue(&h, JobKind::ConsultPeriod, json!({"period": "2025-08"})).await;
    assert_eq!(h.processor().tick().await.unwrap(), 1);

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.unwrap();
    assert_eq!(result["fetched"], 2);
    assert_eq!(result["created"], 2);

    let expected = h
        .storage_root()
        .join(CNPJ)
        .join("2025")
        .join("08")
        .join(CNPJ)
        .join("xml")
        .join("nfse_101_20250810.xml");
    assert_eq!(
        std::fs::read_to_string(expected).unwrap(),
        "<nfse><numero>101</numero></nfse>"
    );

    let tenant = h.tenants.find(TENANT_ID).await.unwrap().unwrap();
    assert_eq!(tenant.last_sync_at, Some(h.clock.now_millis()));
}

#[tokio::test]
async fn test_reconsult_dedups_and_versions_changed_documents() {
    let h = Harness::new().await;
    let p = period("2025-08");
    h.source
        .add_documents(TENANT_ID, p, vec![xml_doc("7", "<nfse><n>7</n></nfse>")]);

    enqueue(&h, JobKind::ConsultPeriod, json!({"period": "2025-08"})).await;
    h.processor().tick().await.unwrap();

    // Same document again plus a corrected version of it
    h.source.add_documents(
        TENANT_ID,
        p,
        vec![xml_doc("7", "<nfse><n>7</n><retificada/></nfse>")],
    );
    let id = enqueue(&h, JobKind::ConsultPeriod, json!({"period": "2025-08"})).await;
    h.processor().tick().await.unwrap();

    let result = h.job(&id).await.result.unwrap();
    assert_eq!(result["fetched"], 2);
    assert_eq!(result["created"], 0);
    assert_eq!(result["duplicates"], 1);
    assert_eq!(result["versioned"], 1);
    assert_eq!(
        result["superseded"][0],
        format!("{}/2025/08/{}/xml/nfse_7_20250810.xml", CNPJ, CNPJ)
    );

    let current = h
        .organizer
        .fetch(CNPJ, p, "7", nfse_core::domain::DocumentKind::Xml)
        .await
        .unwrap();
    assert_eq!(current, b"<nfse><n>7</n><retificada/></nfse>");

    // Both versions are kept; the audit marker is not a document
    let documents = h.organizer.list_documents(CNPJ, p).await.unwrap();
    let keys: Vec<&str> = documents.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            format!("{}/2025/08/{}/xml/nfse_7_20250810.xml", CNPJ, CNPJ),
            format!("{}/2025/08/{}/xml/nfse_7_20250810_v2.xml", CNPJ, CNPJ),
        ]
    );
}

#[tokio::test]
async fn test_sync_now_runs_policy_periods_ahead_of_scheduled_work() {
    let h = Harness::new().await;
    h.source.add_documents(
        TENANT_ID,
        period("2025-06"),
        vec![xml_doc("60", "<nfse>60</nfse>")],
    );

    let scheduled = enqueue(&h, JobKind::ConsultPeriod, json!({"period": "2025-01"})).await;
    let sync = h
        .ingest
        .sync_now(TENANT_ID, vec![], false)
        .await
        .unwrap()
        .into_job();

    // Batch of one: the operator sync is claimed first
    let processor = h.processor_with(h.handlers.clone(), 1);
    processor.tick().await.unwrap();
    assert_eq!(h.job(&sync.id).await.status, JobStatus::Completed);
    assert_eq!(h.job(&scheduled).await.status, JobStatus::Pending);

    let result = h.job(&sync.id).await.result.unwrap();
    let periods: Vec<&str> = result["periods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["period"].as_str().unwrap())
        .collect();
    assert_eq!(periods, vec!["2025-08", "2025-07", "2025-06", "2025-05"]);
    assert_eq!(result["periods"][2]["created"], 1);
}

#[tokio::test]
async fn test_process_and_report_after_ingest() {
    let h = Harness::new().await;
    h.source.add_documents(
        TENANT_ID,
        period("2025-08"),
        vec![xml_doc("55", "<nfse><numero>55</numero></nfse>")],
    );
    enqueue(&h, JobKind::ConsultPeriod, json!({"period": "2025-08"})).await;
    h.processor().tick().await.unwrap();

    let process = enqueue(
        &h,
        JobKind::ProcessDocument,
        json!({"period": "2025-08", "document_number": "55"}),
    )
    .await;
    let report = enqueue(
        &h,
        JobKind::GenerateReport,
        json!({"period": "2025-08", "batch_id": "weekly"}),
    )
    .await;
    assert_eq!(h.processor().tick().await.unwrap(), 2);

    let processed = h.job(&process).await;
    assert_eq!(processed.status, JobStatus::Completed);
    let processed = processed.result.unwrap();
    assert_eq!(processed["size"], 32);
    assert_eq!(processed["sha256"].as_str().unwrap().len(), 64);

    let reported = h.job(&report).await;
    assert_eq!(reported.status, JobStatus::Completed);
    let bytes = h
        .organizer
        .fetch_report(CNPJ, period("2025-08"), "weekly")
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["document_count"], 1);
    assert_eq!(body["tenant_id"], TENANT_ID);
}

#[tokio::test]
async fn test_process_missing_document_fails_without_retry() {
    let h = Harness::new().await;
    let id = enqueue(
        &h,
        JobKind::ProcessDocument,
        json!({"period": "2025-08", "document_number": "404"}),
    )
    .await;
    h.processor().tick().await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert!(job.error_message.unwrap().contains("404"));
}

#[tokio::test]
async fn test_missing_credential_is_permanent_failure() {
    let h = Harness::new().await;
    h.add_tenant(Tenant::new("tenant-b", "98765432000100"), false)
        .await;

    let id = h
        .ingest
        .enqueue_request(EnqueueRequest {
            tenant_id: "tenant-b".to_string(),
            kind: JobKind::ConsultPeriod,
            payload: json!({"period": "2025-08"}),
            priority: None,
            not_before: None,
            max_retries: None,
        })
        .await
        .unwrap()
        .into_job()
        .id;
    h.processor().tick().await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 0);
    assert_eq!(h.source.call_count(), 0);
}

#[tokio::test]
async fn test_transient_fetch_failure_is_retried_with_backoff() {
    let h = Harness::new().await;
    h.source
        .add_documents(TENANT_ID, period("2025-08"), vec![xml_doc("1", "<nfse>1</nfse>")]);
    h.source.fail_next(1);

    let id = enqueue(&h, JobKind::ConsultPeriod, json!({"period": "2025-08"})).await;
    let processor = h.processor();
    processor.tick().await.unwrap();

    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.scheduled_at, h.clock.now_millis() + MINUTE_MS);
    assert!(job.error_message.is_some());

    // Not due yet
    assert_eq!(processor.tick().await.unwrap(), 0);

    h.clock.advance_millis(MINUTE_MS);
    assert_eq!(processor.tick().await.unwrap(), 1);
    let job = h.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.unwrap()["created"], 1);
}

#[tokio::test]
async fn test_inactive_tenant_is_skipped_unless_forced() {
    let h = Harness::new().await;
    let mut tenant = Tenant::new("tenant-off", "11111111000111");
    tenant.active = false;
    h.add_tenant(tenant, true).await;
    h.source
        .add_documents("tenant-off", period("2025-08"), vec![xml_doc("1", "<nfse>1</nfse>")]);

    let skipped = h
        .ingest
        .enqueue_request(EnqueueRequest {
            tenant_id: "tenant-off".to_string(),
            kind: JobKind::ConsultPeriod,
            payload: json!({"period": "2025-08"}),
            priority: None,
            not_before: None,
            max_retries: None,
        })
        .await
        .unwrap()
        .into_job();
    h.processor().tick().await.unwrap();

    let job = h.job(&skipped.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.unwrap()["skipped"], "tenant inactive");
    assert_eq!(h.source.call_count(), 0);

    let forced = h
        .ingest
        .enqueue_request(EnqueueRequest {
            tenant_id: "tenant-off".to_string(),
            kind: JobKind::ConsultPeriod,
            payload: json!({"period": "2025-08", "force_refresh": true}),
            priority: None,
            not_before: None,
            max_retries: None,
        })
        .await
        .unwrap()
        .into_job();
    h.processor().tick().await.unwrap();
    assert_eq!(h.job(&forced.id).await.result.unwrap()["created"], 1);
}
