use anyhow::{Context, Result};
use muse_contracts::{truncate_chars, ArtifactKind, ArtifactStore, StoredArtifact};

use crate::providers::SpeechEngine;

/// Longest text (in characters) handed to the speech engine.
pub const MAX_SPEECH_CHARS: usize = 5000;

pub struct SpeechRenderer {
    engine: Box<dyn SpeechEngine>,
    store: ArtifactStore,
}

impl SpeechRenderer {
    pub fn new(engine: Box<dyn SpeechEngine>, store: ArtifactStore) -> Self {
        Self { engine, store }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Renders `text` (truncated, otherwise verbatim) to a new audio artifact.
    pub fn render(&self, text: &str) -> Result<StoredArtifact> {
        let text = truncate_chars(text, MAX_SPEECH_CHARS);
        let artifact = self.store.allocate(ArtifactKind::Audio);
        self.engine
            .save_to_file(text, &artifact.path)
            .with_context(|| format!("{} speech synthesis failed", self.engine.name()))?;
        tracing::info!(
            engine = self.engine.name(),
            chars = text.chars().count(),
            path = %artifact.path.display(),
            "speech artifact written"
        );
        Ok(artifact)
    }
}
