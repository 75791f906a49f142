use std::time::Duration;

use pretty_assertions::assert_eq;
use tracker_engine::{
    GenerationClient, GenerationKind, GenerationRequest, HttpStatusProbe, JobRef, PollError,
    PollOutcome, SourceImage, StatusProbe, SubmitError, SubmittedJob,
};
use wiremock::matchers::{body_partial_json, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn probe_reads_file_and_project_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/file/f-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "f-1",
            "url": "https://cdn/f-1.png",
            "status": "completed"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/project/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "p-1",
            "status": "in_progress",
            "progress": 55,
            "files": []
        })))
        .mount(&server)
        .await;

    let probe = HttpStatusProbe::new(&server.uri(), TIMEOUT).unwrap();
    assert_eq!(
        probe.check(&JobRef::file("f-1")).await.unwrap(),
        PollOutcome::Ready {
            url: "https://cdn/f-1.png".into()
        }
    );
    assert_eq!(
        probe.check(&JobRef::project("p-1")).await.unwrap(),
        PollOutcome::Pending { progress: Some(55) }
    );
    assert_eq!(
        probe.resolve_file_url("f-1").await.unwrap().as_deref(),
        Some("https://cdn/f-1.png")
    );
}

#[tokio::test]
async fn probe_maps_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/file/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let probe = HttpStatusProbe::new(&server.uri(), TIMEOUT).unwrap();
    assert_eq!(
        probe.check(&JobRef::file("gone")).await,
        Err(PollError::HttpStatus(404))
    );
}

#[tokio::test]
async fn text_prompt_is_posted_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate/image"))
        .and(body_partial_json(serde_json::json!({
            "prompt": "a red fox",
            "generationType": "text-to-image"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "fileId": "f-9",
            "projectId": "p-9",
            "requestId": "r-9"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GenerationClient::new(&server.uri(), TIMEOUT).unwrap();
    let submitted = client
        .submit(&GenerationRequest::text(GenerationKind::Image, "a red fox"))
        .await
        .unwrap();

    assert_eq!(
        submitted,
        SubmittedJob {
            kind: GenerationKind::Image,
            prompt: "a red fox".into(),
            file_id: "f-9".into(),
            project_id: Some("p-9".into()),
            request_id: Some("r-9".into()),
        }
    );
}

#[tokio::test]
async fn source_image_is_posted_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate/video"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": "f-2" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GenerationClient::new(&server.uri(), TIMEOUT).unwrap();
    let mut request = GenerationRequest::text(GenerationKind::Video, "make it move");
    request.source_image = Some(SourceImage {
        file_name: "still.png".into(),
        mime: "image/png".into(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    });

    let submitted = client.submit(&request).await.unwrap();
    assert_eq!(submitted.file_id, "f-2");
    assert_eq!(submitted.project_id, None);
}

#[tokio::test]
async fn submission_errors_are_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate/image"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate/video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "prompt rejected"
        })))
        .mount(&server)
        .await;

    let client = GenerationClient::new(&server.uri(), TIMEOUT).unwrap();
    assert_eq!(
        client
            .submit(&GenerationRequest::text(GenerationKind::Image, "x"))
            .await,
        Err(SubmitError::Http {
            status: 502,
            body: "upstream down".into()
        })
    );
    assert_eq!(
        client
            .submit(&GenerationRequest::text(GenerationKind::Video, "x"))
            .await,
        Err(SubmitError::Rejected("prompt rejected".into()))
    );
}
