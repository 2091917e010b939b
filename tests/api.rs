use serde_json::json;
use wiremock::matchers::{body_json, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kling_video::error::{ProbeError, SubmissionError, ValidationError};
use kling_video::params::{ExtensionParams, GenerationParams, Mode, VideoDuration};
use kling_video::{Config, Job, KlingClient, OperationKind, StatusProber, TaskState, VideoService};

fn client_for(server: &MockServer) -> KlingClient {
    let cfg = Config {
        access_key: "ak-test".into(),
        secret_key: "sk-test".into(),
        base_url: server.uri(),
        ..Config::default()
    };
    KlingClient::with_client(reqwest::Client::new(), &cfg).unwrap()
}

fn accepted(task_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 0,
        "message": "SUCCEED",
        "request_id": "req-1",
        "data": {
            "task_id": task_id,
            "task_status": "submitted",
            "created_at": 1722769557708i64
        }
    }))
}

#[tokio::test]
async fn creation_sends_signed_request_with_all_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/videos/text2video"))
        .and(header_regex("authorization", r"^Bearer [\w-]+\.[\w-]+\.[\w-]+$"))
        .and(body_json(json!({
            "prompt": "a fox in the snow",
            "model_name": "kling-v2-master",
            "aspect_ratio": "9:16",
            "mode": "pro",
            "duration": "10"
        })))
        .respond_with(accepted("task-42"))
        .expect(1)
        .mount(&server)
        .await;

    let params = GenerationParams {
        mode: Mode::Professional,
        duration: VideoDuration::Ten,
        ..GenerationParams::new("a fox in the snow")
    };
    let job = client_for(&server).submit_creation(&params).await.unwrap();

    assert_eq!(job.id, "task-42");
    assert_eq!(job.kind, OperationKind::Creation);
}

#[tokio::test]
async fn extension_without_prompt_omits_the_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/videos/video-extend"))
        .and(body_json(json!({ "video_id": "vid-7" })))
        .respond_with(accepted("ext-1"))
        .expect(1)
        .mount(&server)
        .await;

    let job = client_for(&server)
        .submit_extension(&ExtensionParams::new("vid-7", None))
        .await
        .unwrap();
    assert_eq!(job.kind, OperationKind::Extension);
}

#[tokio::test]
async fn overlong_prompt_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(accepted("never"))
        .expect(0)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit_creation(&GenerationParams::new("x".repeat(3001)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Validation(ValidationError::PromptTooLong { len: 3001, max: 2500 })
    ));
}

#[tokio::test]
async fn remote_rejection_surfaces_code_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/videos/text2video"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 1201,
            "message": "model not supported",
            "request_id": "req-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit_creation(&GenerationParams::new("hello"))
        .await
        .unwrap_err();
    match err {
        SubmissionError::Rejected { code, message } => {
            assert_eq!(code, 1201);
            assert_eq!(message, "model not supported");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn probe_uses_the_endpoint_of_the_job_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos/video-extend/ext-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "SUCCEED",
            "data": {
                "task_id": "ext-9",
                "task_status": "succeed",
                "task_result": {
                    "videos": [{ "id": "v1", "url": "https://cdn.example/v1.mp4", "duration": "9.9" }]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = client_for(&server)
        .probe(&Job::new("ext-9", OperationKind::Extension))
        .await
        .unwrap();
    assert_eq!(snapshot.state, TaskState::Succeeded);
    assert_eq!(snapshot.artifacts.len(), 1);
    assert_eq!(snapshot.artifacts[0].url, "https://cdn.example/v1.mp4");
}

#[tokio::test]
async fn probe_classifies_missing_task_as_fatal_and_outage_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos/text2video/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/videos/text2video/busy"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let gone = client
        .probe(&Job::new("gone", OperationKind::Creation))
        .await
        .unwrap_err();
    assert!(matches!(gone, ProbeError::Fatal(_)));

    let busy = client
        .probe(&Job::new("busy", OperationKind::Creation))
        .await
        .unwrap_err();
    assert!(busy.is_transient());
}

#[test]
fn client_refuses_missing_credentials() {
    let cfg = Config::default();
    assert!(KlingClient::with_client(reqwest::Client::new(), &cfg).is_err());
}
