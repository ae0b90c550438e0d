// Integration tests for the recognition client
//
// A small axum server stands in for the generateContent endpoint so the
// full request/response path is exercised without network access.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tunegem::config::RecognitionConfig;
use tunegem::{AudioClip, GeminiClient, RecognitionError, Recognizer};

struct CapturedRequest {
    path: String,
    api_key: Option<String>,
    body: serde_json::Value,
}

struct MockGemini {
    status: StatusCode,
    body: String,
    requests: Mutex<Vec<CapturedRequest>>,
}

async fn generate_content(
    State(mock): State<Arc<MockGemini>>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    mock.requests.lock().unwrap().push(CapturedRequest {
        path: uri.path().to_string(),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    (
        mock.status,
        [("content-type", "application/json")],
        mock.body.clone(),
    )
}

/// Serve `body` with `status` for every request; returns the API base URL
async fn spawn_mock(status: StatusCode, body: String) -> (String, Arc<MockGemini>) {
    let mock = Arc::new(MockGemini {
        status,
        body,
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .fallback(generate_content)
        .with_state(Arc::clone(&mock));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), mock)
}

fn recognition_config(api_base: &str) -> RecognitionConfig {
    RecognitionConfig {
        api_base: api_base.to_string(),
        model: "gemini-test".to_string(),
        temperature: 0.4,
        timeout_secs: 5,
        api_key: None,
    }
}

fn client(api_base: &str) -> GeminiClient {
    GeminiClient::new(&recognition_config(api_base), "test-key".to_string()).unwrap()
}

fn clip() -> AudioClip {
    AudioClip::from_encoded(b"RIFF fake wav".to_vec(), "audio/wav", Duration::from_secs(1))
}

/// A generateContent reply whose first candidate says `text`
fn reply_with_text(text: &str, uris: &[&str]) -> String {
    let chunks: Vec<serde_json::Value> = uris
        .iter()
        .map(|uri| serde_json::json!({ "web": { "uri": uri, "title": "source" } }))
        .collect();

    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "groundingMetadata": { "groundingChunks": chunks }
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_identifies_song_and_dedupes_sources() {
    let text = r#"{"artist":"Daft Punk","title":"Get Lucky","genre":"Disco","funFact":"Features Nile Rodgers","confidence":92}"#;
    let body = reply_with_text(
        text,
        &[
            "https://en.wikipedia.org/wiki/Get_Lucky",
            "https://en.wikipedia.org/wiki/Get_Lucky",
        ],
    );
    let (base, _mock) = spawn_mock(StatusCode::OK, body).await;

    let song = client(&base)
        .identify(&clip())
        .await
        .expect("request should succeed")
        .expect("a song should be identified");

    assert_eq!(song.artist, "Daft Punk");
    assert_eq!(song.title, "Get Lucky");
    assert_eq!(song.genre, "Disco");
    assert_eq!(song.fun_fact, "Features Nile Rodgers");
    assert_eq!(song.confidence, 92.0);
    assert_eq!(
        song.source_links,
        vec!["https://en.wikipedia.org/wiki/Get_Lucky".to_string()]
    );
}

#[tokio::test]
async fn test_request_carries_prompt_audio_and_search_tool() {
    let body = reply_with_text("null", &[]);
    let (base, mock) = spawn_mock(StatusCode::OK, body).await;

    let clip = clip();
    client(&base).identify(&clip).await.unwrap();

    let requests = mock.requests.lock().unwrap();
    assert_eq!(requests.len(), 1, "Exactly one request per clip");

    let request = &requests[0];
    assert_eq!(request.path, "/models/gemini-test:generateContent");
    assert_eq!(request.api_key.as_deref(), Some("test-key"));

    let parts = &request.body["contents"][0]["parts"];
    assert!(parts[0]["text"].as_str().unwrap().contains("JSON"));
    assert_eq!(parts[1]["inlineData"]["mimeType"], "audio/wav");
    assert_eq!(parts[1]["inlineData"]["data"], clip.to_base64());

    assert!(request.body["tools"][0]["googleSearch"].is_object());
    let temperature = request.body["generationConfig"]["temperature"]
        .as_f64()
        .unwrap();
    assert!((temperature - 0.4).abs() < 1e-6);
}

#[tokio::test]
async fn test_json_wrapped_in_prose_is_recovered() {
    let text = r#"Sure! Here is the result: {"artist":"Queen","title":"Bohemian Rhapsody","genre":"Rock","funFact":"Six minutes long","confidence":97} Hope that helps."#;
    let (base, _mock) = spawn_mock(StatusCode::OK, reply_with_text(text, &[])).await;

    let song = client(&base).identify(&clip()).await.unwrap().unwrap();

    assert_eq!(song.title, "Bohemian Rhapsody");
    assert!(song.source_links.is_empty());
}

#[tokio::test]
async fn test_json_in_code_fence_is_recovered() {
    let text = "```json\n{\"artist\":\"Adele\",\"title\":\"Hello\",\"genre\":\"Pop\",\"funFact\":\"Recorded in 2015\",\"confidence\":\"75\"}\n```";
    let (base, _mock) = spawn_mock(StatusCode::OK, reply_with_text(text, &[])).await;

    let song = client(&base).identify(&clip()).await.unwrap().unwrap();

    assert_eq!(song.artist, "Adele");
    assert_eq!(song.confidence, 75.0);
}

#[tokio::test]
async fn test_null_reply_is_no_result() {
    let (base, _mock) = spawn_mock(StatusCode::OK, reply_with_text("null", &[])).await;

    let result = client(&base).identify(&clip()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_prose_without_json_is_no_result() {
    let body = reply_with_text("I could not hear any music in this recording.", &[]);
    let (base, _mock) = spawn_mock(StatusCode::OK, body).await;

    let result = client(&base).identify(&clip()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_empty_candidates_is_no_result() {
    let (base, _mock) = spawn_mock(StatusCode::OK, r#"{"candidates":[]}"#.to_string()).await;

    let result = client(&base).identify(&clip()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let body = r#"{"error":{"code":500,"message":"Internal error encountered.","status":"INTERNAL"}}"#;
    let (base, _mock) = spawn_mock(StatusCode::INTERNAL_SERVER_ERROR, body.to_string()).await;

    let err = client(&base).identify(&clip()).await.unwrap_err();

    assert_eq!(
        err,
        RecognitionError::Api {
            status: 500,
            message: "Internal error encountered.".to_string()
        }
    );
}

#[tokio::test]
async fn test_unreadable_envelope_is_an_error() {
    let (base, _mock) = spawn_mock(StatusCode::OK, "not json at all".to_string()).await;

    let err = client(&base).identify(&clip()).await.unwrap_err();
    assert!(matches!(err, RecognitionError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    // Reserve a port, then free it so nothing is listening there
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}", addr))
        .identify(&clip())
        .await
        .unwrap_err();

    assert!(matches!(err, RecognitionError::Transport(_)), "got {:?}", err);
}

#[test]
fn test_missing_api_key_is_rejected() {
    let err = GeminiClient::new(&recognition_config("http://localhost"), "  ".to_string())
        .unwrap_err();
    assert_eq!(err, RecognitionError::MissingApiKey);
}
