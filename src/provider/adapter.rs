use async_trait::async_trait;

use crate::config::ProviderConfig;

use super::types::{DispatchResult, ProviderResult};

/// Translates a normalized chat-completion request into the configured wire
/// format and back into a normalized text result.
#[mockall::automock]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Dispatches a system/user message pair to the secondary model.
    ///
    /// Never returns an error: transport failures are folded into the
    /// [`DispatchResult`](super::types::DispatchResult).
    async fn dispatch(
        &self,
        system_text: &str,
        user_text: &str,
        config: &ProviderConfig,
    ) -> DispatchResult;

    /// Model discovery for the settings UI.
    async fn list_models(&self, config: &ProviderConfig) -> ProviderResult<Vec<String>>;

    fn name(&self) -> &str;
}
