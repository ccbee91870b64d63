use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::RgbaImage;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::ACCEPT;
use serde_json::json;

use super::{ImageBackend, ImageModel};
use crate::placement::ModelPlacement;
use crate::transport::{api_base_from_env, ensure_success, first_non_empty_env};

const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Hosted text-to-image inference (`POST {base}/models/{model_id}`).
pub struct HuggingFaceBackend {
    api_base: String,
    model_id: String,
    http: HttpClient,
}

impl HuggingFaceBackend {
    pub fn new(model_id: &str) -> Self {
        Self {
            api_base: api_base_from_env("HF_API_BASE", DEFAULT_API_BASE),
            model_id: model_id.trim().to_string(),
            http: HttpClient::new(),
        }
    }

    fn api_token() -> Option<String> {
        first_non_empty_env(&["HF_TOKEN", "HUGGINGFACE_API_TOKEN"])
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.api_base, self.model_id)
    }
}

impl ImageBackend for HuggingFaceBackend {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn load(&self, placement: ModelPlacement) -> Result<Arc<dyn ImageModel>> {
        let Some(token) = Self::api_token() else {
            bail!("HF_TOKEN or HUGGINGFACE_API_TOKEN not set");
        };
        if self.model_id.is_empty() {
            bail!("Hugging Face image model id is empty");
        }
        Ok(Arc::new(HuggingFaceModel {
            endpoint: self.endpoint(),
            token,
            placement,
            http: self.http.clone(),
        }))
    }
}

struct HuggingFaceModel {
    endpoint: String,
    token: String,
    placement: ModelPlacement,
    http: HttpClient,
}

impl ImageModel for HuggingFaceModel {
    fn placement(&self) -> ModelPlacement {
        self.placement
    }

    fn generate(&self, prompt: &str) -> Result<RgbaImage> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(ACCEPT, "image/png")
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "inputs": prompt,
                "options": { "wait_for_model": true },
            }))
            .send()
            .with_context(|| format!("Hugging Face request failed ({})", self.endpoint))?;
        let bytes = ensure_success("Hugging Face", response)?
            .bytes()
            .context("failed reading Hugging Face image bytes")?;
        let image = image::load_from_memory(&bytes)
            .context("Hugging Face returned an undecodable image")?;
        Ok(image.to_rgba8())
    }
}
