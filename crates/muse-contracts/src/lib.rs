pub mod artifacts;
pub mod conversation;
pub mod providers;
pub mod text;

pub use artifacts::{ArtifactKind, ArtifactStore, StoredArtifact};
pub use conversation::{ConversationLog, ConversationTurn, Role};
pub use providers::{NamedProvider, ProviderRegistry};
pub use text::{normalize, truncate_chars};
