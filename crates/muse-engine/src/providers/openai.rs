use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::SpeechEngine;
use crate::transport::{
    api_base_from_env, ensure_success, first_non_empty_env, non_empty_env,
};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini-tts";
const DEFAULT_VOICE: &str = "alloy";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiSpeech {
    api_base: String,
    model: String,
    voice: String,
    http: HttpClient,
}

impl OpenAiSpeech {
    pub fn new() -> Self {
        Self {
            api_base: api_base_from_env("OPENAI_API_BASE", DEFAULT_API_BASE),
            model: non_empty_env("OPENAI_TTS_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: non_empty_env("OPENAI_TTS_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            http: HttpClient::new(),
        }
    }

    fn api_key() -> Option<String> {
        first_non_empty_env(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"])
    }

    fn payload(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3",
        })
    }
}

impl Default for OpenAiSpeech {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    fn save_to_file(&self, text: &str, path: &Path) -> Result<()> {
        let Some(api_key) = Self::api_key() else {
            bail!("OPENAI_API_KEY not set");
        };
        let endpoint = format!("{}/audio/speech", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.payload(text))
            .send()
            .with_context(|| format!("OpenAI speech request failed ({endpoint})"))?;
        let audio = ensure_success("OpenAI speech", response)?
            .bytes()
            .context("failed reading OpenAI speech bytes")?;
        fs::write(path, &audio).with_context(|| format!("failed to write {}", path.display()))
    }
}
