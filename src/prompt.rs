//! System prompt for the secondary model.
//!
//! The host usually supplies a user-tuned "smart prompt"; when that
//! collaborator is absent or yields nothing, a fixed backup directive keeps
//! the pipeline functional.

/// Host collaborator supplying the secondary model's system directive.
pub trait SmartPromptSource: Send + Sync {
    fn system_prompt(&self) -> Option<String>;
}

/// Backup directive used when no smart prompt is available.
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a scene-state extraction assistant. \
Read the narrative passage provided by the user and produce a single \
<infobar_data>...</infobar_data> block summarizing the current scene state as \
short `key: value` lines (location, time, characters present, notable conditions). \
Output only the delimited block, with no narrative text before or after it.";

/// Fixed prompt source, mainly for hosts with a static configuration and
/// for tests.
pub struct FixedPrompt(pub String);

impl SmartPromptSource for FixedPrompt {
    fn system_prompt(&self) -> Option<String> {
        if self.0.trim().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}
