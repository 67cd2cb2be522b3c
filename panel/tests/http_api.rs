use std::time::Duration;

use comms::specs::preset::PresetUpload;
use panel::api::{ApiClient, ApiError, HttpApi};
use serde_json::{Map, json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bag(entries: serde_json::Value) -> Map<String, serde_json::Value> {
    match entries {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object literal, got {other}"),
    }
}

#[tokio::test]
async fn start_training_posts_the_config() {
    let server = MockServer::start().await;
    let config = bag(json!({
        "base_model": "meta-llama/Llama-3.2-1B",
        "model_type": "lora",
        "learning_rate": 2e-4,
    }));

    Mock::given(method("POST"))
        .and(path("/api/train"))
        .and(body_json(&config))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-801" })))
        .mount(&server)
        .await;

    let api = HttpApi::new(server.uri());
    let id = api.start_training(&config).await.unwrap();

    assert_eq!(id, "job-801");
}

#[tokio::test]
async fn training_status_decodes_progress() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/train/job-801/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_training": true,
            "progress": {
                "current_step": 120,
                "total_steps": 480,
                "current_epoch": 1,
                "total_epochs": 3,
                "loss": 1.87,
                "learning_rate": 1.9e-4,
            },
        })))
        .mount(&server)
        .await;

    let api = HttpApi::new(server.uri());
    let reply = api.training_status("job-801").await.unwrap();

    assert!(reply.is_training);
    let progress = reply.progress.unwrap();
    assert_eq!(progress.current_step, Some(120));
    assert_eq!(progress.ratio(), Some(0.25));
}

#[tokio::test]
async fn server_errors_carry_the_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/train"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "error": "cuda out of memory" })),
        )
        .mount(&server)
        .await;

    let api = HttpApi::new(server.uri());
    let err = api.start_training(&Map::new()).await.unwrap_err();

    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "cuda out of memory");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_preset_reads_as_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/presets/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = HttpApi::new(server.uri());

    assert!(api.fetch_preset("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_a_missing_preset_reports_false() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/presets/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = HttpApi::new(server.uri());

    assert!(!api.delete_preset("ghost").await.unwrap());
}

#[tokio::test]
async fn listing_and_saving_presets_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/presets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "srv-1", "name": "baseline", "is_builtin": true },
            { "id": "srv-2", "name": "my tune", "config": { "epochs": 2 } },
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/presets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "srv-3",
            "name": "fresh",
            "config": { "epochs": 4 },
        })))
        .mount(&server)
        .await;

    let api = HttpApi::new(server.uri());

    let listed = api.list_presets().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].is_builtin);
    assert_eq!(listed[1].config["epochs"], json!(2));

    let saved = api
        .save_preset(&PresetUpload {
            name: "fresh".into(),
            description: String::new(),
            model_type: "lora".into(),
            config: bag(json!({ "epochs": 4 })),
        })
        .await
        .unwrap();
    assert_eq!(saved.id, "srv-3");
}

#[tokio::test]
async fn refused_connections_surface_as_network_errors() {
    // Bind then drop to find a port with nothing listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let api = HttpApi::new(format!("http://127.0.0.1:{port}"));
    let err = api.training_status("job-x").await.unwrap_err();

    assert!(matches!(err, ApiError::Network(_)));
}

#[tokio::test]
async fn a_stalled_server_hits_the_request_deadline() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/train/job-slow/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "is_training": true }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let api = HttpApi::with_timeout(server.uri(), Duration::from_millis(100));
    let err = api.training_status("job-slow").await.unwrap_err();

    assert!(matches!(&err, ApiError::Network(e) if e.is_timeout()));
}
