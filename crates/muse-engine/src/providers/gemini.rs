use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::TextProvider;
use crate::transport::{api_base_from_env, first_non_empty_env, response_json_or_error};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub struct GeminiTextProvider {
    api_base: String,
    model: String,
    http: HttpClient,
}

impl GeminiTextProvider {
    pub fn new(model: &str) -> Self {
        Self {
            api_base: api_base_from_env("GEMINI_API_BASE", DEFAULT_API_BASE),
            model: model.trim().to_string(),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        first_non_empty_env(&["GEMINI_API_KEY", "GOOGLE_API_KEY"])
    }

    fn endpoint(&self) -> String {
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        })
    }

    /// Joins the text parts of the first candidate. An answer without text
    /// (e.g. blocked by safety filters) yields an empty string.
    fn extract_text(payload: &Value) -> String {
        payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

impl TextProvider for GeminiTextProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .json(&Self::build_payload(prompt))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error("Gemini", response)?;
        if let Some(reason) = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the prompt ({reason})");
        }
        Ok(Self::extract_text(&payload))
    }
}
