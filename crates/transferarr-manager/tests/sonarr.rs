use std::time::Duration;

use transferarr_manager::{MediaManagerAdapter, SonarrAdapter, SonarrConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> SonarrAdapter {
    SonarrAdapter::new(SonarrConfig {
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
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [
                {"id": 7, "title": "Show.S01E01", "downloadId": "CD".repeat(20), "trackedDownloadState": "downloading"}
            ],
            "totalRecords": 1
        })))
        .mount(&server)
        .await;

    let queue = adapter(&server).queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].queue_id, "7");
    assert_eq!(adapter(&server).kind(), "series");
}

#[tokio::test]
async fn ready_to_remove_is_false_until_imported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/queue/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7,
            "title": "Show.S01E01",
            "downloadId": "CD".repeat(20),
            "trackedDownloadState": "downloading"
        })))
        .mount(&server)
        .await;

    assert!(!adapter(&server).ready_to_remove("7").await.unwrap());
}
