//! Restriction directive management.
//!
//! The pipeline registers a standing system-level instruction with the
//! host's prompt assembler while enabled, telling the primary model not to
//! emit annotation blocks itself. Removal disables the registration rather
//! than deleting it; the assembler treats a disabled directive as absent.

use std::sync::Arc;

use dashmap::DashMap;

/// Registry key for the pipeline's restriction directive. A single
/// well-known key guarantees at most one directive from this pipeline is
/// ever live; directives registered by other components are untouched.
pub const RESTRICTION_KEY: &str = "sideband.suppress_annotation";

/// Priority for the restriction directive within the assembled prompt.
pub const RESTRICTION_PRIORITY: i32 = 100;

/// Standing instruction injected into the primary model's prompt.
pub const RESTRICTION_TEXT: &str = "Do not include <infobar_data> blocks or any other \
structured status data in your reply. Narrative prose only; status tracking is \
handled separately.";

/// A named, toggleable instruction registered with the prompt assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub key: String,
    pub text: String,
    pub priority: i32,
    pub disabled: bool,
}

/// Host-side named-directive registry feeding prompt assembly.
#[derive(Default)]
pub struct PromptAssembler {
    directives: DashMap<String, Directive>,
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or overwrites the directive under its key.
    pub fn register(&self, directive: Directive) {
        self.directives.insert(directive.key.clone(), directive);
    }

    pub fn get(&self, key: &str) -> Option<Directive> {
        self.directives.get(key).map(|d| d.clone())
    }

    /// Directives that participate in prompt assembly, priority-ordered.
    pub fn active(&self) -> Vec<Directive> {
        let mut active: Vec<Directive> = self
            .directives
            .iter()
            .filter(|d| !d.disabled)
            .map(|d| d.clone())
            .collect();
        active.sort_by_key(|d| d.priority);
        active
    }

    /// Joins the active directive texts into a prompt preamble.
    pub fn assemble(&self) -> String {
        self.active()
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Owns the pipeline's single restriction directive.
///
/// `install` and `remove` are both idempotent; their lifetime matches the
/// pipeline's enabled state.
pub struct DirectiveManager {
    assembler: Arc<PromptAssembler>,
}

impl DirectiveManager {
    pub fn new(assembler: Arc<PromptAssembler>) -> Self {
        Self { assembler }
    }

    /// Registers the restriction directive, overwriting any previous
    /// registration under the well-known key.
    pub fn install(&self, text: &str) {
        self.assembler.register(Directive {
            key: RESTRICTION_KEY.to_string(),
            text: text.to_string(),
            priority: RESTRICTION_PRIORITY,
            disabled: false,
        });
    }

    /// Disables the directive and clears its text. The registration itself
    /// stays put so the assembler can treat "present but disabled" as
    /// absent. No-op when never installed.
    pub fn remove(&self) {
        if let Some(mut directive) = self.assembler.get(RESTRICTION_KEY) {
            directive.disabled = true;
            directive.text.clear();
            self.assembler.register(directive);
        }
    }

    pub fn is_installed(&self) -> bool {
        self.assembler
            .get(RESTRICTION_KEY)
            .is_some_and(|d| !d.disabled)
    }
}
