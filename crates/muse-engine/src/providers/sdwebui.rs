use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbaImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{ImageBackend, ImageModel};
use crate::placement::{ModelPlacement, Precision};
use crate::transport::{api_base_from_env, ensure_success, response_json_or_error};

const DEFAULT_API_BASE: &str = "http://127.0.0.1:7860";
const LOAD_TIMEOUT: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const NATIVE_SIZE: u32 = 512;

/// A self-hosted Stable Diffusion web UI (`/sdapi/v1/*`).
pub struct SdWebUiBackend {
    api_base: String,
    checkpoint: String,
    http: HttpClient,
}

impl SdWebUiBackend {
    pub fn new(checkpoint: &str) -> Self {
        Self {
            api_base: api_base_from_env("SDWEBUI_API_BASE", DEFAULT_API_BASE),
            checkpoint: checkpoint.trim().to_string(),
            http: HttpClient::new(),
        }
    }

    /// Options applied when switching the server onto the checkpoint.
    fn load_options(&self, placement: ModelPlacement) -> Value {
        json!({
            "sd_model_checkpoint": self.checkpoint,
            "upcast_attn": placement.precision == Precision::Full,
        })
    }

    fn txt2img_payload(prompt: &str) -> Value {
        json!({
            "prompt": prompt,
            "width": NATIVE_SIZE,
            "height": NATIVE_SIZE,
            "batch_size": 1,
            "n_iter": 1,
        })
    }

    fn first_image(payload: &Value) -> Result<Vec<u8>> {
        let Some(encoded) = payload
            .get("images")
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .and_then(Value::as_str)
        else {
            bail!("Stable Diffusion web UI returned no images");
        };
        // Some builds prefix a data URL header.
        let data = encoded
            .split_once("base64,")
            .map(|(_, data)| data)
            .unwrap_or(encoded);
        BASE64
            .decode(data.trim().as_bytes())
            .context("Stable Diffusion web UI image base64 decode failed")
    }
}

impl ImageBackend for SdWebUiBackend {
    fn name(&self) -> &str {
        "sdwebui"
    }

    fn load(&self, placement: ModelPlacement) -> Result<Arc<dyn ImageModel>> {
        let endpoint = format!("{}/sdapi/v1/options", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .timeout(LOAD_TIMEOUT)
            .json(&self.load_options(placement))
            .send()
            .with_context(|| format!("Stable Diffusion web UI load failed ({endpoint})"))?;
        ensure_success("Stable Diffusion web UI", response)?;
        Ok(Arc::new(SdWebUiModel {
            endpoint: format!("{}/sdapi/v1/txt2img", self.api_base),
            placement,
            http: self.http.clone(),
        }))
    }
}

struct SdWebUiModel {
    endpoint: String,
    placement: ModelPlacement,
    http: HttpClient,
}

impl ImageModel for SdWebUiModel {
    fn placement(&self) -> ModelPlacement {
        self.placement
    }

    fn generate(&self, prompt: &str) -> Result<RgbaImage> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&SdWebUiBackend::txt2img_payload(prompt))
            .send()
            .with_context(|| format!("Stable Diffusion web UI request failed ({})", self.endpoint))?;
        let payload = response_json_or_error("Stable Diffusion web UI", response)?;
        let bytes = SdWebUiBackend::first_image(&payload)?;
        let image = image::load_from_memory(&bytes)
            .context("Stable Diffusion web UI returned an undecodable image")?;
        Ok(image.to_rgba8())
    }
}
