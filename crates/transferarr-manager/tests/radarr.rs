use std::time::Duration;

use transferarr_manager::{MediaManagerAdapter, RadarrAdapter, RadarrConfig};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> RadarrAdapter {
    RadarrAdapter::new(RadarrConfig {
        base_url: server.uri(),
        api_key: "test-key".to_string(),
        timeout: Duration::from_secs(5),
    })
}

#[tokio::test]
async fn queue_maps_records_with_a_download_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [
                {"id": 42, "title": "Some.Movie.2020", "downloadId": "AB".repeat(20), "trackedDownloadState": "downloading"},
                {"id": 43, "title": "No.Hash.Yet", "downloadId": null, "trackedDownloadState": null}
            ],
            "totalRecords": 2
        })))
        .mount(&server)
        .await;

    let queue = adapter(&server).queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].queue_id, "42");
    assert_eq!(queue[0].name, "Some.Movie.2020");
}

#[tokio::test]
async fn ready_to_remove_is_true_once_imported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "title": "Some.Movie.2020",
            "downloadId": "AB".repeat(20),
            "trackedDownloadState": "imported"
        })))
        .mount(&server)
        .await;

    assert!(adapter(&server).ready_to_remove("42").await.unwrap());
}

#[tokio::test]
async fn ready_to_remove_is_true_once_dequeued() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue/99"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(adapter(&server).ready_to_remove("99").await.unwrap());
}

#[tokio::test]
async fn ready_to_remove_is_false_while_still_downloading() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "title": "Some.Movie.2020",
            "downloadId": "AB".repeat(20),
            "trackedDownloadState": "importPending"
        })))
        .mount(&server)
        .await;

    assert!(!adapter(&server).ready_to_remove("42").await.unwrap());
}
