pub mod animation;
pub mod chat;
pub mod imaging;
pub mod placement;
pub mod providers;
pub mod speech;
pub mod studio;
mod transport;

pub use animation::{AnimationComposer, AnimationFrame, FrameGeometry};
pub use chat::ReplyDispatcher;
pub use imaging::{ImageSynthesizer, DEFAULT_IMAGE_SIZE};
pub use placement::{ComputeDevice, DevicePreference, ModelPlacement, Precision};
pub use speech::{SpeechRenderer, MAX_SPEECH_CHARS};
pub use studio::{Studio, StudioConfig};
pub use transport::error_chain_text;
