use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use image::RgbaImage;
use muse_contracts::{NamedProvider, ProviderRegistry};

use crate::placement::ModelPlacement;

mod dryrun;
mod gemini;
mod huggingface;
mod openai;
mod sdwebui;

pub use dryrun::{DryrunImageBackend, DryrunSpeech, DryrunText};
pub use gemini::GeminiTextProvider;
pub use huggingface::HuggingFaceBackend;
pub use openai::OpenAiSpeech;
pub use sdwebui::SdWebUiBackend;

/// Conversational text generation.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Factory for a loaded image model; loading is the expensive step.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self, placement: ModelPlacement) -> Result<Arc<dyn ImageModel>>;
}

/// A loaded text-to-image model. Returns one image per call.
pub trait ImageModel: Send + Sync {
    fn placement(&self) -> ModelPlacement;
    fn generate(&self, prompt: &str) -> Result<RgbaImage>;
}

/// Renders text to an audio file at `path`, synchronously.
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;
    fn save_to_file(&self, text: &str, path: &Path) -> Result<()>;
}

impl NamedProvider for Box<dyn TextProvider> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

impl NamedProvider for Box<dyn ImageBackend> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

impl NamedProvider for Box<dyn SpeechEngine> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

pub fn default_text_providers(model: &str) -> ProviderRegistry<Box<dyn TextProvider>> {
    let mut providers: ProviderRegistry<Box<dyn TextProvider>> = ProviderRegistry::default();
    providers.register(Box::new(DryrunText));
    providers.register(Box::new(GeminiTextProvider::new(model)));
    providers
}

pub fn default_image_backends(model_id: &str) -> ProviderRegistry<Box<dyn ImageBackend>> {
    let mut backends: ProviderRegistry<Box<dyn ImageBackend>> = ProviderRegistry::default();
    backends.register(Box::new(DryrunImageBackend::default()));
    backends.register(Box::new(HuggingFaceBackend::new(model_id)));
    backends.register(Box::new(SdWebUiBackend::new(model_id)));
    backends
}

pub fn default_speech_engines() -> ProviderRegistry<Box<dyn SpeechEngine>> {
    let mut engines: ProviderRegistry<Box<dyn SpeechEngine>> = ProviderRegistry::default();
    engines.register(Box::new(DryrunSpeech));
    engines.register(Box::new(OpenAiSpeech::new()));
    engines
}
