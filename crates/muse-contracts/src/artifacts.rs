use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;

/// URL segment under which the content root is served.
pub const PUBLIC_PREFIX: &str = "static";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Audio,
    Image,
}

impl ArtifactKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::Image => "images",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Audio => "mp3",
            ArtifactKind::Image => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub kind: ArtifactKind,
    /// Location on disk.
    pub path: PathBuf,
    /// `static/<kind>/<name>`, the path callers expose to clients.
    pub relative: String,
}

impl StoredArtifact {
    pub fn url(&self) -> String {
        format!("/{}", self.relative)
    }
}

/// Content directory holding generated audio and still images.
///
/// Filenames are the current Unix time in whole seconds; two artifacts of the
/// same kind created within one second share a name and the later write wins.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the store and creates both kind directories if absent.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let store = Self::new(root);
        store.ensure_dirs()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for kind in [ArtifactKind::Audio, ArtifactKind::Image] {
            let dir = self.dir(kind);
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Reserves the artifact slot for the current second.
    pub fn allocate(&self, kind: ArtifactKind) -> StoredArtifact {
        self.allocate_at(kind, Utc::now().timestamp())
    }

    pub fn allocate_at(&self, kind: ArtifactKind, unix_seconds: i64) -> StoredArtifact {
        let file_name = format!("{unix_seconds}.{}", kind.extension());
        StoredArtifact {
            kind,
            path: self.dir(kind).join(&file_name),
            relative: format!("{PUBLIC_PREFIX}/{}/{file_name}", kind.dir_name()),
        }
    }
}
