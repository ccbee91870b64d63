use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use muse_engine::{DevicePreference, StudioConfig};

#[derive(Debug, Clone, Parser)]
#[command(name = "muse", version, about = "Chat, speech and image generation studio")]
pub struct ServerArgs {
    #[arg(long, env = "MUSE_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "MUSE_PORT", default_value_t = 5000)]
    pub port: u16,
    /// Content root; audio and images are written below it and served at /static.
    #[arg(long, env = "MUSE_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,
    #[arg(long, env = "MUSE_TEXT_PROVIDER", default_value = "gemini")]
    pub text_provider: String,
    #[arg(long, env = "MUSE_TEXT_MODEL", default_value = "gemini-1.5-flash")]
    pub text_model: String,
    #[arg(long, env = "MUSE_IMAGE_BACKEND", default_value = "huggingface")]
    pub image_backend: String,
    #[arg(
        long,
        env = "MUSE_IMAGE_MODEL",
        default_value = "runwayml/stable-diffusion-v1-5"
    )]
    pub image_model: String,
    #[arg(long, env = "MUSE_SPEECH_PROVIDER", default_value = "openai")]
    pub speech_provider: String,
    /// auto, cuda or cpu.
    #[arg(long, env = "MUSE_DEVICE", default_value = "auto")]
    pub device: String,
    /// Load the image model before accepting requests.
    #[arg(long, env = "MUSE_PRELOAD_MODEL")]
    pub preload_model: bool,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn studio_config(&self) -> Result<StudioConfig> {
        let device = self
            .device
            .parse::<DevicePreference>()
            .context("invalid --device")?;
        Ok(StudioConfig {
            content_root: self.static_dir.clone(),
            text_provider: self.text_provider.clone(),
            text_model: self.text_model.clone(),
            image_backend: self.image_backend.clone(),
            image_model: self.image_model.clone(),
            speech_provider: self.speech_provider.clone(),
            device,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use muse_engine::DevicePreference;

    use super::ServerArgs;

    #[test]
    fn explicit_flags_flow_into_studio_config() -> anyhow::Result<()> {
        let args = ServerArgs::try_parse_from([
            "muse",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--static-dir",
            "/tmp/muse",
            "--text-provider",
            "dryrun",
            "--image-backend",
            "sdwebui",
            "--image-model",
            "v1-5-pruned.safetensors",
            "--speech-provider",
            "dryrun",
            "--device",
            "gpu",
            "--preload-model",
        ])?;
        assert_eq!(args.bind_addr(), "127.0.0.1:8080");
        assert!(args.preload_model);

        let config = args.studio_config()?;
        assert_eq!(config.content_root, PathBuf::from("/tmp/muse"));
        assert_eq!(config.text_provider, "dryrun");
        assert_eq!(config.image_backend, "sdwebui");
        assert_eq!(config.image_model, "v1-5-pruned.safetensors");
        assert_eq!(config.speech_provider, "dryrun");
        assert_eq!(config.device, DevicePreference::Cuda);
        Ok(())
    }

    #[test]
    fn unknown_device_is_rejected() -> anyhow::Result<()> {
        let args = ServerArgs::try_parse_from(["muse", "--device", "tpu"])?;
        let err = args
            .studio_config()
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(err.contains("invalid --device"));
        assert!(err.contains("tpu"));
        Ok(())
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(ServerArgs::try_parse_from(["muse", "--port", "http"]).is_err());
    }
}
