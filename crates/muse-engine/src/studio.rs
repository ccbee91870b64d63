use std::path::PathBuf;

use anyhow::{Context, Result};
use muse_contracts::{ArtifactStore, ConversationLog, Role, StoredArtifact};

use crate::animation::AnimationComposer;
use crate::chat::ReplyDispatcher;
use crate::imaging::ImageSynthesizer;
use crate::placement::{DevicePreference, ModelPlacement};
use crate::providers::{
    default_image_backends, default_speech_engines, default_text_providers, ImageBackend,
    SpeechEngine, TextProvider,
};
use crate::speech::SpeechRenderer;

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub content_root: PathBuf,
    pub text_provider: String,
    pub text_model: String,
    pub image_backend: String,
    pub image_model: String,
    pub speech_provider: String,
    pub device: DevicePreference,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("static"),
            text_provider: "gemini".to_string(),
            text_model: "gemini-1.5-flash".to_string(),
            image_backend: "huggingface".to_string(),
            image_model: "runwayml/stable-diffusion-v1-5".to_string(),
            speech_provider: "openai".to_string(),
            device: DevicePreference::Auto,
        }
    }
}

/// Everything a request handler needs, owned in one place.
pub struct Studio {
    log: ConversationLog,
    dispatcher: ReplyDispatcher,
    speech: SpeechRenderer,
    images: ImageSynthesizer,
    composer: AnimationComposer,
    store: ArtifactStore,
}

impl Studio {
    /// Resolves the configured backends and prepares the content directories.
    pub fn from_config(config: &StudioConfig) -> Result<Self> {
        let text = default_text_providers(&config.text_model).select(&config.text_provider, "text")?;
        let image = default_image_backends(&config.image_model)
            .select(&config.image_backend, "image")?;
        let speech = default_speech_engines().select(&config.speech_provider, "speech")?;
        let store = ArtifactStore::open(&config.content_root)
            .context("failed to prepare content directories")?;
        let placement = ModelPlacement::resolve(config.device);
        Ok(Self::from_parts(text, image, speech, store, placement))
    }

    pub fn from_parts(
        text: Box<dyn TextProvider>,
        image: Box<dyn ImageBackend>,
        speech: Box<dyn SpeechEngine>,
        store: ArtifactStore,
        placement: ModelPlacement,
    ) -> Self {
        tracing::info!(
            text = text.name(),
            image = image.name(),
            speech = speech.name(),
            device = %placement.device,
            precision = %placement.precision,
            content_root = %store.root().display(),
            "studio ready"
        );
        Self {
            log: ConversationLog::new(),
            dispatcher: ReplyDispatcher::new(text),
            speech: SpeechRenderer::new(speech, store.clone()),
            images: ImageSynthesizer::new(image, placement),
            composer: AnimationComposer::new(),
            store,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn images(&self) -> &ImageSynthesizer {
        &self.images
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Records the user turn, asks for a reply, records the bot turn.
    pub fn chat(&self, message: &str) -> String {
        self.log.record(Role::User, message);
        let reply = self.dispatcher.get_reply(message);
        self.log.record(Role::Bot, reply.as_str());
        reply
    }

    pub fn speak(&self, text: &str) -> Result<StoredArtifact> {
        self.speech.render(text)
    }

    pub fn still_image(&self, prompt: &str) -> Result<StoredArtifact> {
        self.images.render_still(prompt, &self.store)
    }

    pub fn animation(&self, prompt: &str, size: u32) -> Result<Vec<u8>> {
        let source = self.images.synthesize(prompt, size)?;
        self.composer.compose(&source)
    }
}
