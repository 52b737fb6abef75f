//! End-to-end upload tests against the mock service.

use std::sync::Arc;

use axum::http::Method;
use serde_json::json;

use super::test_utils::{
    assert_progress_complete, contains_bytes, mrxs_slide, pattern, recorder, single_file_slide,
    test_options, MockConfig, MockService, MIB,
};
use wsi_transfer::upload::block_id;
use wsi_transfer::{
    upload_slide, BackendKind, CoreClient, NoProgress, TransferError, TransferManifest,
    TransferOptions, TransferOrchestrator, TransferOutcome, TransferState, UploadRequest,
};

fn request(svc: &MockService, slide: &std::path::Path) -> UploadRequest {
    UploadRequest::new(&svc.base_url, "test-session", slide, "/Incoming")
}

fn multipart_plan(file_path: &str) -> serde_json::Value {
    let ranges = [(0, 4194303), (4194304, 8388607), (8388608, 10485759)];
    let parts: Vec<serde_json::Value> = ranges
        .iter()
        .enumerate()
        .map(|(i, (start, end))| {
            json!({
                "PartNumber": i + 1,
                "Url": format!("{{BASE}}s3/{}?partNumber={}&uploadId=up-1", file_path, i + 1),
                "RangeStart": start,
                "RangeEnd": end,
            })
        })
        .collect();
    json!({"FilePath": file_path, "UploadId": "up-1", "Parts": parts})
}

// =============================================================================
// Direct
// =============================================================================

#[tokio::test]
async fn test_direct_single_file() {
    let svc = MockService::start(MockConfig {
        register_body: json!({"Id": 17, "UploadType": 0, "Urls": []}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);
    let (events, sink) = recorder();

    let outcome = upload_slide(request(&svc, &slide), test_options(), sink, None).await;

    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());
    let report = outcome.report().unwrap();
    assert_eq!(report.backend, BackendKind::Direct);
    assert_eq!(report.transfer_id.as_str(), "17");

    let register = &svc.requests_under(Method::POST, "/transfer/Upload")[0];
    assert_eq!(register.path, "/transfer/Upload");
    assert_eq!(register.query_param("sessionId").as_deref(), Some("test-session"));
    assert_eq!(
        register.json(),
        json!({"Path": "Incoming", "Files": [{"Path": "CMU-1.svs", "Length": 10 * MIB, "IsMain": true}]})
    );

    let uploads: Vec<_> = svc
        .requests()
        .into_iter()
        .filter(|r| r.is(Method::POST, "/transfer/Upload/17"))
        .collect();
    assert_eq!(uploads.len(), 1);
    let upload = &uploads[0];
    assert_eq!(upload.query_param("path").as_deref(), Some("CMU-1.svs"));
    assert_eq!(upload.query_param("sessionId").as_deref(), Some("test-session"));
    assert!(upload.header("content-type").unwrap().starts_with("multipart/form-data"));
    assert!(contains_bytes(&upload.body, b"name=\"file\""));
    assert!(contains_bytes(&upload.body, b"filename=\"CMU-1.svs\""));
    assert!(contains_bytes(&upload.body, b"application/octet-stream"));
    assert!(upload.body.len() > 10 * MIB);

    assert_eq!(svc.requests_under(Method::GET, "/transfer/Upload/17").len(), 1);
    assert_progress_complete(&events.lock().unwrap(), "CMU-1.svs", (10 * MIB) as u64);
}

#[tokio::test]
async fn test_legacy_fallback_uploads_through_service() {
    // Cloud storage type without URLs: older deployments expect direct uploads.
    let svc = MockService::start(MockConfig {
        register_body: json!({"Id": 3, "UploadType": "Azure", "Urls": null}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = mrxs_slide(dir.path());

    let outcome = upload_slide(
        request(&svc, &slide),
        test_options(),
        Arc::new(NoProgress),
        None,
    )
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());
    assert_eq!(outcome.report().unwrap().backend, BackendKind::Direct);

    let paths: Vec<String> = svc
        .requests()
        .into_iter()
        .filter(|r| r.is(Method::POST, "/transfer/Upload/3"))
        .filter_map(|r| r.query_param("path"))
        .collect();
    assert_eq!(
        paths,
        vec!["CMU-1/Data0000.dat", "CMU-1/Slidedat.ini", "CMU-1.mrxs"]
    );
    assert!(svc.requests_under(Method::PUT, "/blob/").is_empty());
}

// =============================================================================
// Presigned single PUT
// =============================================================================

#[tokio::test]
async fn test_presigned_multi_file_slide() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 5,
            "UploadType": "AmazonS3",
            "Urls": [
                "{BASE}s3/CMU-1/Data0000.dat?X-Amz-Signature=a",
                "{BASE}s3/CMU-1/Slidedat.ini?X-Amz-Signature=b",
                "{BASE}s3/CMU-1.mrxs?X-Amz-Signature=c"
            ]
        }),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = mrxs_slide(dir.path());
    let (events, sink) = recorder();

    let outcome = upload_slide(request(&svc, &slide), test_options(), sink, None).await;
    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());
    assert_eq!(outcome.report().unwrap().backend, BackendKind::PresignedSingle);

    // The empty companion file is not part of the manifest.
    let files = svc.requests_under(Method::POST, "/transfer/Upload")[0].json()["Files"].clone();
    assert_eq!(files.as_array().unwrap().len(), 3);
    assert_eq!(files[2]["IsMain"], true);

    let puts = svc.requests_under(Method::PUT, "/s3/");
    let paths: Vec<&str> = puts.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["/s3/CMU-1/Data0000.dat", "/s3/CMU-1/Slidedat.ini", "/s3/CMU-1.mrxs"]
    );
    assert_eq!(puts[0].body.as_ref(), pattern(5000, 2).as_slice());
    assert_eq!(puts[0].header("content-length"), Some("5000"));
    assert_eq!(puts[2].body.as_ref(), pattern(300, 1).as_slice());

    assert_eq!(svc.requests_under(Method::GET, "/transfer/Upload/5").len(), 3);

    let events = events.lock().unwrap();
    assert_progress_complete(&events, "CMU-1/Data0000.dat", 5000);
    assert_progress_complete(&events, "CMU-1/Slidedat.ini", 120);
    assert_progress_complete(&events, "CMU-1.mrxs", 300);
}

#[tokio::test]
async fn test_presigned_buffer_limit() {
    let svc = MockService::start(MockConfig {
        register_body: json!({"Id": 5, "UploadType": 1, "Urls": ["{BASE}s3/big.svs?sig=a"]}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "big.svs", 4096);

    let options = TransferOptions {
        presigned_buffer_limit: 1024,
        ..test_options()
    };
    let outcome = upload_slide(request(&svc, &slide), options, Arc::new(NoProgress), None).await;

    assert!(!outcome.is_success());
    assert!(outcome.failure_reason().unwrap().contains("big.svs"));
    assert!(svc.requests_under(Method::PUT, "/s3/").is_empty());
}

#[tokio::test]
async fn test_storage_failure_stops_transfer() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 5,
            "UploadType": "AmazonS3",
            "Urls": [
                "{BASE}s3/CMU-1/Data0000.dat?sig=a",
                "{BASE}s3/CMU-1/Slidedat.ini?sig=b",
                "{BASE}s3/CMU-1.mrxs?sig=c"
            ]
        }),
        fail_put_suffix: Some("Slidedat.ini".to_string()),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = mrxs_slide(dir.path());

    let outcome = upload_slide(request(&svc, &slide), test_options(), Arc::new(NoProgress), None).await;

    let error = outcome.error().unwrap();
    assert_eq!(error.status(), Some(500));
    let reason = outcome.failure_reason().unwrap();
    assert!(reason.contains("CMU-1/Slidedat.ini"));
    assert!(reason.contains("SlowDown"));

    // First file finalized, nothing after the failure.
    assert_eq!(svc.requests_under(Method::GET, "/transfer/Upload/5").len(), 1);
    assert_eq!(svc.requests_under(Method::PUT, "/s3/").len(), 2);
}

// =============================================================================
// S3 multipart
// =============================================================================

#[tokio::test]
async fn test_multipart_three_parts() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 8,
            "UploadType": "AmazonS3",
            "Urls": [],
            "MultipartFiles": [multipart_plan("CMU-1.svs")]
        }),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);
    let (events, sink) = recorder();

    let outcome = upload_slide(request(&svc, &slide), test_options(), sink, None).await;
    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());

    let puts = svc.requests_under(Method::PUT, "/s3/CMU-1.svs");
    let numbers: Vec<String> = puts.iter().filter_map(|r| r.query_param("partNumber")).collect();
    assert_eq!(numbers, vec!["1", "2", "3"]);

    let content = pattern(10 * MIB, 7);
    assert_eq!(puts[0].body.as_ref(), &content[..4 * MIB]);
    assert_eq!(puts[1].body.as_ref(), &content[4 * MIB..8 * MIB]);
    assert_eq!(puts[2].body.as_ref(), &content[8 * MIB..]);
    for put in &puts {
        assert_eq!(put.header("content-type"), Some("binary/octet-stream"));
    }

    let completions = svc.requests_under(Method::POST, "/transfer/Upload/CompleteMultipart");
    assert_eq!(completions.len(), 1);
    assert_eq!(
        completions[0].json(),
        json!({
            "FilePath": "CMU-1.svs",
            "UploadId": "up-1",
            "Parts": [
                {"PartNumber": 1, "ETag": "etag-1"},
                {"PartNumber": 2, "ETag": "etag-2"},
                {"PartNumber": 3, "ETag": "etag-3"}
            ]
        })
    );

    // Completion happens before finalization.
    let requests = svc.requests();
    let complete_at = requests
        .iter()
        .position(|r| r.path == "/transfer/Upload/CompleteMultipart")
        .unwrap();
    let finalize_at = requests
        .iter()
        .position(|r| r.is(Method::GET, "/transfer/Upload/8"))
        .unwrap();
    assert!(complete_at < finalize_at);

    let events = events.lock().unwrap();
    assert_progress_complete(&events, "CMU-1.svs", (10 * MIB) as u64);
    let parts: Vec<u32> = events.iter().map(|e| e.part_number).collect();
    assert!(parts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(parts.last(), Some(&3));
}

#[tokio::test]
async fn test_multipart_concurrent_parts_commit_sorted() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 8,
            "UploadType": "AmazonS3",
            "MultipartFiles": [multipart_plan("CMU-1.svs")]
        }),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);

    let options = TransferOptions {
        part_concurrency: 3,
        ..test_options()
    };
    let outcome = upload_slide(request(&svc, &slide), options, Arc::new(NoProgress), None).await;
    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());

    assert_eq!(svc.requests_under(Method::PUT, "/s3/").len(), 3);
    let completion = &svc.requests_under(Method::POST, "/transfer/Upload/CompleteMultipart")[0];
    let numbers: Vec<u64> = completion.json()["Parts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["PartNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let parts = &outcome.report().unwrap().files[0].parts;
    assert!(parts.windows(2).all(|w| w[0].part_number < w[1].part_number));
}

#[tokio::test]
async fn test_multipart_parts_overlap() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 8,
            "UploadType": "AmazonS3",
            "MultipartFiles": [multipart_plan("CMU-1.svs")]
        }),
        hold_first_part: true,
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);

    let options = TransferOptions {
        part_concurrency: 2,
        ..test_options()
    };
    let outcome = upload_slide(request(&svc, &slide), options, Arc::new(NoProgress), None).await;
    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());

    // Part 2 was sent while part 1 was still waiting for its answer.
    assert!(svc.parts_overlapped());
    let mut numbers: Vec<String> = svc
        .requests_under(Method::PUT, "/s3/")
        .iter()
        .filter_map(|r| r.query_param("partNumber"))
        .collect();
    numbers.sort();
    assert_eq!(numbers, vec!["1", "2", "3"]);

    let completion = &svc.requests_under(Method::POST, "/transfer/Upload/CompleteMultipart")[0];
    assert_eq!(completion.json()["Parts"][0]["ETag"], "etag-1");
    assert_eq!(completion.json()["Parts"][2]["ETag"], "etag-3");
}

#[tokio::test]
async fn test_multipart_missing_etag() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 8,
            "UploadType": "AmazonS3",
            "MultipartFiles": [multipart_plan("CMU-1.svs")]
        }),
        omit_etag: true,
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);

    let outcome = upload_slide(request(&svc, &slide), test_options(), Arc::new(NoProgress), None).await;

    assert!(matches!(
        outcome.error().map(TransferError::root),
        Some(TransferError::InvalidResponse { .. })
    ));
    assert!(outcome.failure_reason().unwrap().contains("ETag"));
    assert!(svc
        .requests_under(Method::POST, "/transfer/Upload/CompleteMultipart")
        .is_empty());
}

#[tokio::test]
async fn test_multipart_plan_mismatch_sends_nothing() {
    let mut plan = multipart_plan("CMU-1.svs");
    plan["Parts"][2]["RangeEnd"] = json!(9_000_000);
    let svc = MockService::start(MockConfig {
        register_body: json!({"Id": 8, "UploadType": "AmazonS3", "MultipartFiles": [plan]}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);

    let outcome = upload_slide(request(&svc, &slide), test_options(), Arc::new(NoProgress), None).await;

    assert!(matches!(
        outcome.error(),
        Some(TransferError::InvalidDescriptor(_))
    ));
    assert_eq!(svc.requests().len(), 1);
}

// =============================================================================
// Azure block blob
// =============================================================================

#[tokio::test]
async fn test_azure_blocks_and_commit() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 11,
            "UploadType": 2,
            "Urls": ["{BASE}blob/slides/CMU-1.svs?sv=2021-08-06&sig=abc"]
        }),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 10 * MIB);
    let (events, sink) = recorder();

    let outcome = upload_slide(request(&svc, &slide), test_options(), sink, None).await;
    assert!(outcome.is_success(), "{:?}", outcome.failure_reason());
    assert_eq!(outcome.report().unwrap().backend, BackendKind::AzureBlockBlob);

    let puts = svc.requests_under(Method::PUT, "/blob/slides/CMU-1.svs");
    assert_eq!(puts.len(), 4);

    let blocks = &puts[..3];
    let expected_ids: Vec<String> = (0..3).map(block_id).collect();
    for (block, id) in blocks.iter().zip(&expected_ids) {
        assert_eq!(block.query_param("comp").as_deref(), Some("block"));
        assert_eq!(block.query_param("blockid").as_ref(), Some(id));
        assert_eq!(block.query_param("sig").as_deref(), Some("abc"));
    }
    let sizes: Vec<usize> = blocks.iter().map(|b| b.body.len()).collect();
    assert_eq!(sizes, vec![4 * MIB, 4 * MIB, 2 * MIB]);

    let commit = &puts[3];
    assert_eq!(commit.query_param("comp").as_deref(), Some("blocklist"));
    assert_eq!(commit.header("content-type"), Some("application/xml"));
    assert_eq!(
        commit.header("x-ms-blob-content-type"),
        Some("application/octet-stream")
    );
    let xml = String::from_utf8(commit.body.to_vec()).unwrap();
    assert_eq!(
        xml,
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList><Latest>{}</Latest><Latest>{}</Latest><Latest>{}</Latest></BlockList>",
            expected_ids[0], expected_ids[1], expected_ids[2]
        )
    );

    assert_progress_complete(&events.lock().unwrap(), "CMU-1.svs", (10 * MIB) as u64);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_finalize_failure_stops_remaining_files() {
    let svc = MockService::start(MockConfig {
        register_body: json!({
            "Id": 21,
            "UploadType": "Azure",
            "Urls": [
                "{BASE}blob/c/CMU-1/Data0000.dat?sig=a",
                "{BASE}blob/c/CMU-1/Slidedat.ini?sig=b",
                "{BASE}blob/c/CMU-1.mrxs?sig=c"
            ]
        }),
        fail_finalize_at: Some(0),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = mrxs_slide(dir.path());

    let outcome = upload_slide(request(&svc, &slide), test_options(), Arc::new(NoProgress), None).await;

    assert!(!outcome.is_success());
    let reason = outcome.failure_reason().unwrap();
    assert!(reason.contains("CMU-1/Data0000.dat"));
    assert!(reason.contains("Finalization failed."));
    assert!(reason.contains("Storage offline"));
    assert!(matches!(
        outcome,
        TransferOutcome::Failed {
            state: TransferState::Finalizing { index: 0 },
            ..
        }
    ));

    // The first file was fully staged and committed; no other file was touched.
    let puts = svc.requests_under(Method::PUT, "/blob/");
    assert!(puts.iter().all(|r| r.path == "/blob/c/CMU-1/Data0000.dat"));
    assert_eq!(puts.last().unwrap().query_param("comp").as_deref(), Some("blocklist"));
    assert_eq!(svc.requests_under(Method::GET, "/transfer/Upload/21").len(), 1);
}

#[tokio::test]
async fn test_register_failure_reports_service_message() {
    let svc = MockService::start(MockConfig {
        register_body: json!({"Code": "403", "Message": "Access denied to Incoming"}),
        register_status: Some(403),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 100);

    let outcome = upload_slide(request(&svc, &slide), test_options(), Arc::new(NoProgress), None).await;

    assert!(outcome.failure_reason().unwrap().contains("Access denied to Incoming"));
    assert_eq!(outcome.error().unwrap().status(), Some(403));
    assert!(matches!(
        outcome,
        TransferOutcome::Failed {
            state: TransferState::AwaitingManifest,
            ..
        }
    ));
    assert_eq!(svc.requests().len(), 1);
}

#[tokio::test]
async fn test_descriptor_url_count_mismatch() {
    let svc = MockService::start(MockConfig {
        register_body: json!({"Id": 4, "UploadType": "AmazonS3", "Urls": ["{BASE}s3/only-one?sig=a"]}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = mrxs_slide(dir.path());

    let outcome = upload_slide(request(&svc, &slide), test_options(), Arc::new(NoProgress), None).await;

    assert!(matches!(
        outcome.error(),
        Some(TransferError::InvalidDescriptor(_))
    ));
    assert_eq!(svc.requests().len(), 1);
}

#[tokio::test]
async fn test_invalid_input_makes_no_request() {
    let svc = MockService::start(MockConfig::default()).await;
    let dir = tempfile::tempdir().unwrap();

    let outcome = upload_slide(
        request(&svc, &dir.path().join("missing.mrxs")),
        test_options(),
        Arc::new(NoProgress),
        None,
    )
    .await;

    let reason = outcome.failure_reason().unwrap();
    assert!(reason.contains("slide_path"));
    assert!(reason.contains("does not exist"));
    assert!(svc.requests().is_empty());
}

#[tokio::test]
async fn test_cancelled_session_sends_nothing() {
    let svc = MockService::start(MockConfig {
        register_body: json!({"Id": 1, "UploadType": 0}),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let slide = single_file_slide(dir.path(), "CMU-1.svs", 100);
    let manifest = TransferManifest::for_slide(&slide).await.unwrap();

    let ctx = svc.context();
    ctx.cancellation_token().cancel();
    let outcome = TransferOrchestrator::new(CoreClient::new(ctx.clone()), ctx)
        .with_options(TransferOptions::default())
        .transfer(&manifest, "Incoming")
        .await;

    assert!(outcome.error().unwrap().is_cancelled());
    assert_eq!(outcome.failure_reason().as_deref(), Some("Transfer cancelled"));
    assert!(svc.requests().is_empty());
}
