use muse_contracts::normalize;

use crate::providers::TextProvider;
use crate::transport::error_chain_text;

const ERROR_REPLY_PREFIX: &str = "⚠️ Error fetching response: ";
const ERROR_DETAIL_MAX_CHARS: usize = 512;

/// Forwards chat messages to the text provider.
///
/// Never fails: provider errors come back as a readable reply so the chat
/// endpoint always answers with a normal response.
pub struct ReplyDispatcher {
    provider: Box<dyn TextProvider>,
}

impl ReplyDispatcher {
    pub fn new(provider: Box<dyn TextProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn get_reply(&self, user_message: &str) -> String {
        match self.provider.generate(user_message) {
            Ok(text) => normalize(&text),
            Err(err) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    error = %format!("{err:#}"),
                    "text generation failed"
                );
                format!(
                    "{ERROR_REPLY_PREFIX}{}",
                    error_chain_text(&err, ERROR_DETAIL_MAX_CHARS)
                )
            }
        }
    }
}
