//! End-to-end download tests against the mock service.

use axum::http::Method;
use serde_json::json;

use super::test_utils::{pattern, recorder, MockConfig, MockService};
use wsi_transfer::{CoreClient, DownloadEngine, DownloadOptions, TransferError};

fn mrxs_remote_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("Slides/CMU-1.mrxs".to_string(), pattern(300, 1)),
        ("Slides/CMU-1/Data0000.dat".to_string(), pattern(5000, 2)),
        ("Slides/CMU-1/Index/Slidedat.ini".to_string(), pattern(120, 3)),
    ]
}

fn engine(svc: &MockService) -> DownloadEngine<CoreClient> {
    DownloadEngine::new(CoreClient::new(svc.context())).with_options(DownloadOptions {
        chunk_size: 512,
    })
}

#[tokio::test]
async fn test_download_overwrites_and_keeps_sizes() {
    let files = vec![
        ("Slides/a.svs".to_string(), pattern(4096, 4)),
        ("Slides/b.svs".to_string(), pattern(1000, 5)),
    ];
    let svc = MockService::start(MockConfig {
        remote_files: files.clone(),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.svs"), b"stale content that is longer than nothing").unwrap();

    let report = engine(&svc)
        .download("Slides/a.svs", dir.path())
        .await
        .unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.total_bytes(), 5096);
    for (path, data) in &files {
        let name = path.rsplit('/').next().unwrap();
        let written = std::fs::read(dir.path().join(name)).unwrap();
        assert_eq!(&written, data);
    }

    let list = &svc.requests_under(Method::GET, "/api/json/getfilenames")[0];
    assert_eq!(list.query_param("sessionID").as_deref(), Some("test-session"));
    assert_eq!(list.query_param("pathOrUid").as_deref(), Some("Slides/a.svs"));

    let downloads = svc.requests_under(Method::GET, "/transfer/Download/");
    assert_eq!(downloads.len(), 2);
    assert_eq!(downloads[1].query_param("image").as_deref(), Some("Slides/a.svs"));
    assert_eq!(downloads[1].query_param("path").as_deref(), Some("b.svs"));
}

#[tokio::test]
async fn test_download_preserves_nested_layout() {
    let svc = MockService::start(MockConfig {
        remote_files: mrxs_remote_files(),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let (events, sink) = recorder();

    let report = engine(&svc)
        .with_progress(sink)
        .download("Slides/CMU-1.mrxs", dir.path())
        .await
        .unwrap();

    let relative: Vec<&str> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(
        relative,
        vec!["CMU-1.mrxs", "CMU-1/Data0000.dat", "CMU-1/Index/Slidedat.ini"]
    );
    assert_eq!(
        std::fs::read(dir.path().join("CMU-1").join("Index").join("Slidedat.ini")).unwrap(),
        pattern(120, 3)
    );

    let events = events.lock().unwrap();
    let last = events
        .iter()
        .filter(|e| e.file_path == "CMU-1/Data0000.dat")
        .last()
        .unwrap();
    assert_eq!(last.bytes_sent, 5000);
    assert_eq!(last.percent, 100.0);
}

#[tokio::test]
async fn test_download_wrapped_listing() {
    let svc = MockService::start(MockConfig {
        remote_files: mrxs_remote_files(),
        list_body: Some(json!({"d": [
            {"Path": "Slides/CMU-1.mrxs", "Size": 300},
            {"Path": "Slides/CMU-1/Data0000.dat", "Size": 5000}
        ]})),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();

    let report = engine(&svc)
        .download("Slides/CMU-1.mrxs", dir.path())
        .await
        .unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[1].bytes, 5000);
}

#[tokio::test]
async fn test_download_listing_error_object() {
    let svc = MockService::start(MockConfig {
        list_body: Some(json!({"Code": "404", "Message": "Slide Slides/missing.svs not found"})),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();

    let err = engine(&svc)
        .download("Slides/missing.svs", dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("Slides/missing.svs not found"));
    assert!(svc.requests_under(Method::GET, "/transfer/Download/").is_empty());
}

#[tokio::test]
async fn test_download_empty_listing_is_not_found() {
    let svc = MockService::start(MockConfig::default()).await;
    let dir = tempfile::tempdir().unwrap();

    let err = engine(&svc)
        .download("Slides/none.svs", dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::NotFound(_)));
}

#[tokio::test]
async fn test_download_missing_remote_file() {
    let svc = MockService::start(MockConfig {
        remote_files: vec![("Slides/a.svs".to_string(), pattern(10, 1))],
        list_body: Some(json!([
            {"Path": "Slides/a.svs", "Size": 10},
            {"Path": "Slides/gone.dat", "Size": 10}
        ])),
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();

    let err = engine(&svc)
        .download("Slides/a.svs", dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().starts_with("gone.dat: "));
    assert!(dir.path().join("a.svs").exists());
}

#[tokio::test]
async fn test_download_requires_content_length() {
    let svc = MockService::start(MockConfig {
        remote_files: vec![("Slides/a.svs".to_string(), pattern(2048, 1))],
        chunked_downloads: true,
        ..Default::default()
    })
    .await;
    let dir = tempfile::tempdir().unwrap();

    let err = engine(&svc)
        .download("Slides/a.svs", dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err.root(), TransferError::InvalidResponse { .. }));
    assert!(err.to_string().contains("Content-Length"));
}

#[tokio::test]
async fn test_download_rejects_missing_directory() {
    let svc = MockService::start(MockConfig::default()).await;
    let dir = tempfile::tempdir().unwrap();

    let err = engine(&svc)
        .download("Slides/a.svs", &dir.path().join("nope"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Validation(_)));
    assert!(svc.requests().is_empty());
}
