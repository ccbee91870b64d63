use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use muse_contracts::{normalize, ConversationTurn};
use muse_engine::{Studio, DEFAULT_IMAGE_SIZE};
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

const EMPTY_CHAT_REPLY: &str = "Please type something.";
const DEFAULT_ANIMATION_PROMPT: &str = "A cute Pikachu";
const MAX_ANIMATION_SIZE: u32 = 2048;

pub fn app(studio: Arc<Studio>) -> Router {
    let content_root = studio.store().root().to_path_buf();
    Router::new()
        .route("/health", get(health))
        .route("/history", get(history))
        .route("/chat", post(chat))
        .route("/speak", post(speak))
        .route("/generate_image", post(generate_image))
        .route("/generate_gif", post(generate_gif))
        .nest_service("/static", ServeDir::new(content_root))
        .layer(TraceLayer::new_for_http())
        .with_state(studio)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "muse" }))
}

async fn history(State(studio): State<Arc<Studio>>) -> Json<Vec<ConversationTurn>> {
    Json(studio.log().all())
}

/// POST /chat: never fails; backend errors come back as the reply text.
async fn chat(State(studio): State<Arc<Studio>>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let message = json_string_field(&body, "message").trim().to_string();
    if message.is_empty() {
        return Ok(Json(json!({ "reply": EMPTY_CHAT_REPLY })));
    }
    let reply = run_blocking(&studio, move |studio| Ok(studio.chat(&message))).await?;
    Ok(Json(json!({ "reply": reply })))
}

async fn speak(State(studio): State<Arc<Studio>>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let text = normalize(&json_string_field(&body, "text"));
    if text.is_empty() {
        return Err(ApiError::validation("No text provided"));
    }
    let artifact = run_blocking(&studio, move |studio| studio.speak(&text)).await?;
    Ok(Json(json!({ "audio_url": artifact.url() })))
}

async fn generate_image(
    State(studio): State<Arc<Studio>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let prompt = json_string_field(&body, "prompt").trim().to_string();
    if prompt.is_empty() {
        return Err(ApiError::validation("No prompt"));
    }
    let artifact = run_blocking(&studio, move |studio| studio.still_image(&prompt)).await?;
    Ok(Json(json!({ "url": artifact.url() })))
}

/// POST /generate_gif: urlencoded or multipart form with `prompt` and `size`.
async fn generate_gif(
    State(studio): State<Arc<Studio>>,
    request: Request,
) -> Result<Response, ApiError> {
    let fields = form_fields(request).await?;
    let prompt = fields
        .get("prompt")
        .cloned()
        .unwrap_or_else(|| DEFAULT_ANIMATION_PROMPT.to_string());
    let size = parse_size(fields.get("size").map(String::as_str))?;

    let gif = run_blocking(&studio, move |studio| studio.animation(&prompt, size)).await?;
    Ok(([(header::CONTENT_TYPE, "image/gif")], gif).into_response())
}

async fn run_blocking<T, F>(studio: &Arc<Studio>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Studio) -> anyhow::Result<T> + Send + 'static,
{
    let studio = Arc::clone(studio);
    let result = tokio::task::spawn_blocking(move || work(&studio)).await?;
    Ok(result?)
}

/// Missing, malformed or non-string values read as "".
fn json_string_field(body: &[u8], key: &str) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|value| value.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn form_fields(request: Request) -> Result<HashMap<String, String>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        // A bodiless request falls back to the defaults.
        return Ok(Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map(|Form(fields)| fields)
            .unwrap_or_default());
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| ApiError::validation(format!("Invalid form: {}", err.body_text())))?;
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::validation(format!("Invalid form: {}", err.body_text())))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|err| ApiError::validation(format!("Invalid form: {}", err.body_text())))?;
        fields.insert(name, value);
    }
    Ok(fields)
}

fn parse_size(raw: Option<&str>) -> Result<u32, ApiError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_IMAGE_SIZE);
    };
    match raw.trim().parse::<u32>() {
        Ok(size) if (1..=MAX_ANIMATION_SIZE).contains(&size) => Ok(size),
        _ => Err(ApiError::validation("Invalid size")),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgba, RgbaImage};
    use muse_contracts::{ArtifactStore, Role};
    use muse_engine::animation::gif_loop_count;
    use muse_engine::providers::{ImageBackend, ImageModel, SpeechEngine, TextProvider};
    use muse_engine::{ComputeDevice, ModelPlacement, Studio};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::{app, parse_size};

    #[derive(Default)]
    struct Counters {
        text: AtomicUsize,
        loads: AtomicUsize,
        images: AtomicUsize,
        speech: AtomicUsize,
    }

    struct CountingText {
        counters: Arc<Counters>,
        fail: bool,
    }

    impl TextProvider for CountingText {
        fn name(&self) -> &str {
            "counting"
        }

        fn generate(&self, prompt: &str) -> Result<String> {
            self.counters.text.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("quota exhausted");
            }
            Ok(format!("You said **{prompt}**"))
        }
    }

    struct CountingBackend {
        counters: Arc<Counters>,
        fail: bool,
    }

    struct CountingModel {
        counters: Arc<Counters>,
        placement: ModelPlacement,
        fail: bool,
    }

    impl ImageBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn load(&self, placement: ModelPlacement) -> Result<Arc<dyn ImageModel>> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingModel {
                counters: Arc::clone(&self.counters),
                placement,
                fail: self.fail,
            }))
        }
    }

    impl ImageModel for CountingModel {
        fn placement(&self) -> ModelPlacement {
            self.placement
        }

        fn generate(&self, _prompt: &str) -> Result<RgbaImage> {
            self.counters.images.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("CUDA out of memory");
            }
            Ok(RgbaImage::from_fn(32, 32, |x, y| {
                Rgba([(x * 8) as u8, (y * 8) as u8, 128, 255])
            }))
        }
    }

    struct CountingSpeech {
        counters: Arc<Counters>,
    }

    impl SpeechEngine for CountingSpeech {
        fn name(&self) -> &str {
            "counting"
        }

        fn save_to_file(&self, _text: &str, path: &Path) -> Result<()> {
            self.counters.speech.fetch_add(1, Ordering::SeqCst);
            std::fs::write(path, b"ID3")?;
            Ok(())
        }
    }

    struct Harness {
        studio: Arc<Studio>,
        counters: Arc<Counters>,
        _temp: TempDir,
    }

    impl Harness {
        fn new() -> Result<Self> {
            Self::build(false)
        }

        fn failing() -> Result<Self> {
            Self::build(true)
        }

        fn build(fail: bool) -> Result<Self> {
            let temp = tempfile::tempdir()?;
            let store = ArtifactStore::open(temp.path().join("static"))?;
            let counters = Arc::new(Counters::default());
            let studio = Studio::from_parts(
                Box::new(CountingText {
                    counters: Arc::clone(&counters),
                    fail,
                }),
                Box::new(CountingBackend {
                    counters: Arc::clone(&counters),
                    fail,
                }),
                Box::new(CountingSpeech {
                    counters: Arc::clone(&counters),
                }),
                store,
                ModelPlacement::for_device(ComputeDevice::Cpu),
            );
            Ok(Self {
                studio: Arc::new(studio),
                counters,
                _temp: temp,
            })
        }

        fn router(&self) -> Router {
            app(Arc::clone(&self.studio))
        }

        fn count(&self, pick: fn(&Counters) -> &AtomicUsize) -> usize {
            pick(&self.counters).load(Ordering::SeqCst)
        }
    }

    async fn send(router: Router, request: Request<Body>) -> Result<(StatusCode, String, Vec<u8>)> {
        let response = router.oneshot(request).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, content_type, body.to_vec()))
    }

    fn post_json(uri: &str, body: &str) -> Result<Request<Body>> {
        Ok(Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?)
    }

    fn post_multipart(uri: &str, fields: &[(&str, &str)]) -> Result<Request<Body>> {
        let boundary = "muse-test-boundary";
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        Ok(Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?)
    }

    fn json(body: &[u8]) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(body)?)
    }

    #[tokio::test]
    async fn health_reports_service() -> Result<()> {
        let harness = Harness::new()?;
        let request = Request::builder().uri("/health").body(Body::empty())?;
        let (status, _, body) = send(harness.router(), request).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)?, serde_json::json!({ "status": "ok", "service": "muse" }));
        Ok(())
    }

    #[tokio::test]
    async fn empty_chat_message_is_answered_without_touching_the_log() -> Result<()> {
        let harness = Harness::new()?;
        for body in [r#"{"message":""}"#, r#"{"message":"   "}"#, "", "not json"] {
            let (status, _, reply) = send(harness.router(), post_json("/chat", body)?).await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json(&reply)?, serde_json::json!({ "reply": "Please type something." }));
        }
        assert!(harness.studio.log().is_empty());
        assert_eq!(harness.count(|c| &c.text), 0);
        Ok(())
    }

    #[tokio::test]
    async fn chat_records_both_turns_in_order() -> Result<()> {
        let harness = Harness::new()?;
        let (status, _, body) =
            send(harness.router(), post_json("/chat", r#"{"message":"  hi there "}"#)?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)?["reply"], "You said hi there");

        let turns = harness.studio.log().all();
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].role, turns[0].text.as_str()), (Role::User, "hi there"));
        assert_eq!((turns[1].role, turns[1].text.as_str()), (Role::Bot, "You said hi there"));

        let request = Request::builder().uri("/history").body(Body::empty())?;
        let (_, _, body) = send(harness.router(), request).await?;
        let history = json(&body)?;
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[1]["role"], "bot");
        assert_eq!(history[1]["text"], "You said hi there");
        Ok(())
    }

    #[tokio::test]
    async fn chat_backend_failure_degrades_to_reply_text() -> Result<()> {
        let harness = Harness::failing()?;
        let (status, _, body) =
            send(harness.router(), post_json("/chat", r#"{"message":"hello"}"#)?).await?;
        assert_eq!(status, StatusCode::OK);
        let reply = json(&body)?["reply"].as_str().unwrap_or_default().to_string();
        assert!(reply.starts_with("⚠️ Error fetching response: "));
        assert!(reply.contains("quota exhausted"));
        assert_eq!(harness.studio.log().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn speak_rejects_text_that_normalizes_to_nothing() -> Result<()> {
        let harness = Harness::new()?;
        let (status, _, body) =
            send(harness.router(), post_json("/speak", r#"{"text":" ** * "}"#)?).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)?, serde_json::json!({ "error": "No text provided" }));
        assert_eq!(harness.count(|c| &c.speech), 0);
        Ok(())
    }

    #[tokio::test]
    async fn speak_returns_servable_audio_url() -> Result<()> {
        let harness = Harness::new()?;
        let (status, _, body) =
            send(harness.router(), post_json("/speak", r#"{"text":"**Read** me"}"#)?).await?;
        assert_eq!(status, StatusCode::OK);
        let url = json(&body)?["audio_url"].as_str().unwrap_or_default().to_string();
        assert!(url.starts_with("/static/audio/") && url.ends_with(".mp3"), "{url}");
        assert_eq!(harness.count(|c| &c.speech), 1);

        let request = Request::builder().uri(url.as_str()).body(Body::empty())?;
        let (status, _, audio) = send(harness.router(), request).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(audio, b"ID3");
        Ok(())
    }

    #[tokio::test]
    async fn empty_prompt_never_reaches_the_image_backend() -> Result<()> {
        let harness = Harness::new()?;
        for body in [r#"{"prompt":""}"#, r#"{"prompt":"  "}"#, "{}", ""] {
            let (status, _, reply) =
                send(harness.router(), post_json("/generate_image", body)?).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json(&reply)?, serde_json::json!({ "error": "No prompt" }));
        }
        assert_eq!(harness.count(|c| &c.loads), 0);
        assert_eq!(harness.count(|c| &c.images), 0);
        Ok(())
    }

    #[tokio::test]
    async fn generate_image_stores_png_and_reuses_model() -> Result<()> {
        let harness = Harness::new()?;
        for _ in 0..2 {
            let (status, _, body) = send(
                harness.router(),
                post_json("/generate_image", r#"{"prompt":"a red fox"}"#)?,
            )
            .await?;
            assert_eq!(status, StatusCode::OK);
            let url = json(&body)?["url"].as_str().unwrap_or_default().to_string();
            assert!(url.starts_with("/static/images/") && url.ends_with(".png"), "{url}");

            let request = Request::builder().uri(url.as_str()).body(Body::empty())?;
            let (status, _, png) = send(harness.router(), request).await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(image::load_from_memory(&png)?.width(), 32);
        }
        assert_eq!(harness.count(|c| &c.loads), 1);
        assert_eq!(harness.count(|c| &c.images), 2);
        Ok(())
    }

    #[tokio::test]
    async fn image_backend_failure_is_plain_text_500() -> Result<()> {
        let harness = Harness::failing()?;
        let (status, content_type, body) = send(
            harness.router(),
            post_json("/generate_image", r#"{"prompt":"a red fox"}"#)?,
        )
        .await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(content_type.starts_with("text/plain"));
        assert!(String::from_utf8(body)?.contains("CUDA out of memory"));
        Ok(())
    }

    #[tokio::test]
    async fn multipart_gif_request_yields_looping_animation() -> Result<()> {
        let harness = Harness::new()?;
        let request = post_multipart("/generate_gif", &[("prompt", "a cat"), ("size", "256")])?;
        let (status, content_type, gif) = send(harness.router(), request).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "image/gif");
        assert_eq!(gif_loop_count(&gif), Some(0));

        let frames = GifDecoder::new(Cursor::new(&gif))?
            .into_frames()
            .collect_frames()?;
        assert_eq!(frames.len(), 8);
        for frame in &frames {
            assert_eq!(frame.buffer().dimensions(), (256, 256));
            assert_eq!(frame.delay().numer_denom_ms(), (200, 1));
        }
        Ok(())
    }

    #[tokio::test]
    async fn urlencoded_gif_request_uses_defaults() -> Result<()> {
        let harness = Harness::new()?;
        let request = Request::builder()
            .method("POST")
            .uri("/generate_gif")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("size=48"))?;
        let (status, _, gif) = send(harness.router(), request).await?;
        assert_eq!(status, StatusCode::OK);
        let frames = GifDecoder::new(Cursor::new(&gif))?
            .into_frames()
            .collect_frames()?;
        assert_eq!(frames[0].buffer().dimensions(), (48, 48));
        assert_eq!(harness.count(|c| &c.images), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_gif_size_is_rejected_before_generation() -> Result<()> {
        let harness = Harness::new()?;
        for size in ["0", "-4", "big", "4096"] {
            let request = post_multipart("/generate_gif", &[("size", size)])?;
            let (status, _, body) = send(harness.router(), request).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST, "size {size}");
            assert_eq!(json(&body)?, serde_json::json!({ "error": "Invalid size" }));
        }
        assert_eq!(harness.count(|c| &c.images), 0);
        Ok(())
    }

    #[test]
    fn size_defaults_and_bounds() {
        assert_eq!(parse_size(None).ok(), Some(512));
        assert_eq!(parse_size(Some(" 256 ")).ok(), Some(256));
        assert_eq!(parse_size(Some("2048")).ok(), Some(2048));
        assert!(parse_size(Some("2049")).is_err());
        assert!(parse_size(Some("")).is_err());
    }
}
