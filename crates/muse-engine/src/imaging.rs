use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use muse_contracts::{ArtifactKind, ArtifactStore, StoredArtifact};

use crate::placement::ModelPlacement;
use crate::providers::{ImageBackend, ImageModel};

/// Square edge used when a caller does not ask for a size.
pub const DEFAULT_IMAGE_SIZE: u32 = 512;

/// Owns the image backend and its lazily loaded model handle.
///
/// The handle is built at most once per synthesizer: concurrent first callers
/// wait on the same guard instead of racing to load. A failed load leaves the
/// slot empty, so the next request tries again.
pub struct ImageSynthesizer {
    backend: Box<dyn ImageBackend>,
    placement: ModelPlacement,
    model: Mutex<Option<Arc<dyn ImageModel>>>,
    loads: AtomicUsize,
}

impl ImageSynthesizer {
    pub fn new(backend: Box<dyn ImageBackend>, placement: ModelPlacement) -> Self {
        Self {
            backend,
            placement,
            model: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn placement(&self) -> ModelPlacement {
        self.placement
    }

    /// How many times the backend has been asked to load a model.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn ensure_model(&self) -> Result<Arc<dyn ImageModel>> {
        let mut slot = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        let started = Instant::now();
        self.loads.fetch_add(1, Ordering::SeqCst);
        let model = self
            .backend
            .load(self.placement)
            .with_context(|| format!("failed to load {} image model", self.backend.name()))?;
        tracing::info!(
            backend = self.backend.name(),
            device = %self.placement.device,
            precision = %self.placement.precision,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "image model loaded"
        );
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// One image at the backend's native dimensions.
    pub fn generate(&self, prompt: &str) -> Result<RgbaImage> {
        let model = self.ensure_model()?;
        model
            .generate(prompt)
            .with_context(|| format!("{} image generation failed", self.backend.name()))
    }

    /// One image resized to `size`×`size`.
    pub fn synthesize(&self, prompt: &str, size: u32) -> Result<RgbaImage> {
        let image = self.generate(prompt)?;
        if image.dimensions() == (size, size) {
            return Ok(image);
        }
        Ok(imageops::resize(&image, size, size, FilterType::CatmullRom))
    }

    /// Generates a still image and stores it as PNG without resizing.
    pub fn render_still(&self, prompt: &str, store: &ArtifactStore) -> Result<StoredArtifact> {
        let image = self.generate(prompt)?;
        let artifact = store.allocate(ArtifactKind::Image);
        image
            .save_with_format(&artifact.path, image::ImageFormat::Png)
            .with_context(|| format!("failed to save {}", artifact.path.display()))?;
        tracing::info!(
            width = image.width(),
            height = image.height(),
            path = %artifact.path.display(),
            "image artifact written"
        );
        Ok(artifact)
    }
}
