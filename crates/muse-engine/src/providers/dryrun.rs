use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};

use super::{ImageBackend, ImageModel, SpeechEngine, TextProvider};
use crate::placement::ModelPlacement;

/// Offline text provider; replies deterministically from the prompt.
pub struct DryrunText;

impl TextProvider for DryrunText {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!("**dryrun** reply to:\n{prompt}"))
    }
}

/// Offline image backend producing a prompt-seeded gradient.
pub struct DryrunImageBackend {
    size: u32,
}

impl Default for DryrunImageBackend {
    fn default() -> Self {
        Self { size: 512 }
    }
}

impl DryrunImageBackend {
    pub fn with_size(size: u32) -> Self {
        Self { size: size.max(1) }
    }
}

impl ImageBackend for DryrunImageBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn load(&self, placement: ModelPlacement) -> Result<Arc<dyn ImageModel>> {
        Ok(Arc::new(DryrunImageModel {
            placement,
            size: self.size,
        }))
    }
}

struct DryrunImageModel {
    placement: ModelPlacement,
    size: u32,
}

impl ImageModel for DryrunImageModel {
    fn placement(&self) -> ModelPlacement {
        self.placement
    }

    fn generate(&self, prompt: &str) -> Result<RgbaImage> {
        Ok(dryrun_image(prompt, self.size, self.size))
    }
}

pub(crate) fn dryrun_image(prompt: &str, width: u32, height: u32) -> RgbaImage {
    let (r, g, b) = color_from_prompt(prompt);
    RgbaImage::from_fn(width, height, |x, y| {
        let fx = (x * 255 / width.max(1)) as u8;
        let fy = (y * 255 / height.max(1)) as u8;
        Rgba([r ^ fx, g ^ fy, b.wrapping_add(fx / 2).wrapping_add(fy / 2), 255])
    })
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

/// Offline speech engine writing a silent MP3 whose length follows the text.
pub struct DryrunSpeech;

// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, mono, no CRC.
const SILENT_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];
const SILENT_FRAME_LEN: usize = 417;
const MIN_SILENT_FRAMES: usize = 38;

pub(crate) fn silent_mp3(text: &str) -> Vec<u8> {
    let frames = (text.chars().count() * 5 / 2).max(MIN_SILENT_FRAMES);
    let mut frame = vec![0u8; SILENT_FRAME_LEN];
    frame[..SILENT_FRAME_HEADER.len()].copy_from_slice(&SILENT_FRAME_HEADER);
    frame.repeat(frames)
}

impl SpeechEngine for DryrunSpeech {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn save_to_file(&self, text: &str, path: &Path) -> Result<()> {
        fs::write(path, silent_mp3(text))
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
