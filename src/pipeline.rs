//! Pipeline lifecycle and the request/retry loop.
//!
//! [`Pipeline`] owns everything toggled with enablement: the restriction
//! directive and the content visibility filter install and uninstall
//! together as one logical transition, and the event-bus listener that
//! drives the coordinator lives exactly as long as the enabled state.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, RwLock,
};

use thiserror::Error;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, warn};

use crate::{
    config::PipelineConfig,
    coordinator::GenerationCoordinator,
    directive::{DirectiveManager, PromptAssembler, RESTRICTION_TEXT},
    event_bus::{Event, EventBus, EventError, EventType},
    merger::ResultMerger,
    prompt::{SmartPromptSource, FALLBACK_SYSTEM_PROMPT},
    provider::{ProviderAdapter, ProviderResult},
    stats::FailureStat,
    status::{Status, StatusHub},
    transcript::{FilteredTranscriptView, Transcript, TranscriptView},
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Builder error: {0} is required")]
    BuilderMissing(&'static str),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Settings snapshot shared with the host's settings subsystem; the
/// pipeline clones it once per dispatch.
pub type SharedConfig = Arc<RwLock<PipelineConfig>>;

pub(crate) fn snapshot(config: &SharedConfig) -> PipelineConfig {
    config.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Ephemeral per-run retry state.
#[derive(Debug, Default)]
struct RetrySession {
    attempt: usize,
    max_attempts: usize,
    last_error: Option<String>,
}

impl RetrySession {
    fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

/// Builds the secondary request, dispatches it, and retries on empty or
/// failed responses up to the configured bound with a fixed delay.
///
/// Intentionally simple: fixed delay, fixed bound, no backoff. The
/// operation is user-triggered and infrequent.
pub struct RequestPipeline {
    adapter: Arc<dyn ProviderAdapter>,
    prompt: Option<Arc<dyn SmartPromptSource>>,
    status: Arc<StatusHub>,
    stats: Arc<FailureStat>,
    merger: ResultMerger,
    config: SharedConfig,
}

impl RequestPipeline {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        prompt: Option<Arc<dyn SmartPromptSource>>,
        status: Arc<StatusHub>,
        stats: Arc<FailureStat>,
        merger: ResultMerger,
        config: SharedConfig,
    ) -> Self {
        Self {
            adapter,
            prompt,
            status,
            stats,
            merger,
            config,
        }
    }

    fn system_text(&self) -> String {
        self.prompt
            .as_ref()
            .and_then(|p| p.system_prompt())
            .unwrap_or_else(|| FALLBACK_SYSTEM_PROMPT.to_string())
    }

    /// Runs up to `retry_count + 1` dispatch attempts and reports the
    /// terminal state. Side-effecting only; failures never propagate.
    pub async fn run(&self, narrative: &str) {
        let config = snapshot(&self.config);
        let system_text = self.system_text();

        self.status.report(Status::Generating, None);
        let mut session = RetrySession::new(config.provider.retry_count + 1);

        loop {
            session.attempt += 1;
            debug!(
                attempt = session.attempt,
                max_attempts = session.max_attempts,
                "dispatching secondary request"
            );
            let result = self
                .adapter
                .dispatch(&system_text, narrative, &config.provider)
                .await;

            if result.has_text() {
                if self.merger.merge(&result.text) {
                    self.status.report(Status::Success, None);
                } else {
                    // Nothing to merge into (or disabled mid-flight); the
                    // "generating" indicator must not linger.
                    self.status.clear();
                }
                return;
            }

            // Every failed or empty attempt counts, not just the last.
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| "empty response".to_string());
            self.stats.record(&reason);
            session.last_error = Some(reason);

            if session.attempt >= session.max_attempts {
                let reason = session
                    .last_error
                    .take()
                    .unwrap_or_else(|| "empty response".to_string());
                warn!(
                    attempts = session.attempt,
                    reason, "secondary request exhausted retries"
                );
                self.status.report(Status::Error, Some(&reason));
                return;
            }
            sleep(config.retry_delay).await;
        }
    }
}

/// One pipeline instance: the enable/disable toggle and the hooks it owns.
pub struct Pipeline {
    config: SharedConfig,
    transcript: Arc<Transcript>,
    bus: Arc<EventBus>,
    adapter: Arc<dyn ProviderAdapter>,
    status: Arc<StatusHub>,
    stats: Arc<FailureStat>,
    coordinator: Arc<GenerationCoordinator>,
    directive: DirectiveManager,
    enabled: Arc<AtomicBool>,
    filtered: RwLock<Option<Arc<FilteredTranscriptView>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Installs the restriction directive and the content visibility
    /// filter, then starts listening for generation-end signals. Both hooks
    /// toggle together; a config violation installs nothing.
    ///
    /// Idempotent: enabling while enabled reinstalls the hooks in place.
    pub fn enable(&self) -> PipelineResult<()> {
        let config = snapshot(&self.config);
        if !config.provider.enabled {
            return Err(PipelineError::Configuration(
                "provider is disabled in settings".to_string(),
            ));
        }
        config
            .provider
            .validate_enabled()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        // Directive first, filter second; disable() reverses the order.
        self.directive.install(RESTRICTION_TEXT);
        self.install_filter();
        self.enabled.store(true, Ordering::SeqCst);
        self.spawn_listener();

        let _ = self.bus.sync_publish(Event {
            event_type: EventType::PipelineEnabled,
            ..Default::default()
        });
        debug!("pipeline enabled");
        Ok(())
    }

    /// Tears down the filter and then the directive, restoring direct
    /// transcript access. Idempotent; a dispatch already in flight is not
    /// aborted, but its merge is gated on the enabled flag and will skip.
    pub fn disable(&self) {
        let was_enabled = self.enabled.swap(false, Ordering::SeqCst);

        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }

        *self.filtered.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.directive.remove();

        if was_enabled {
            let _ = self.bus.sync_publish(Event {
                event_type: EventType::PipelineDisabled,
                ..Default::default()
            });
            debug!("pipeline disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Read access for primary-model consumers: the filtering view while
    /// enabled, the raw store otherwise.
    pub fn transcript_view(&self) -> Arc<dyn TranscriptView> {
        match &*self.filtered.read().unwrap_or_else(|e| e.into_inner()) {
            Some(view) => view.clone(),
            None => self.transcript.clone(),
        }
    }

    pub fn coordinator(&self) -> &Arc<GenerationCoordinator> {
        &self.coordinator
    }

    pub fn status(&self) -> &Arc<StatusHub> {
        &self.status
    }

    pub fn stats(&self) -> &Arc<FailureStat> {
        &self.stats
    }

    /// Replaces the settings snapshot; the next dispatch sees the new
    /// values. Enablement hooks only change through enable/disable.
    pub fn update_config(&self, config: PipelineConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Model discovery passthrough for the settings UI.
    pub async fn discover_models(&self) -> ProviderResult<Vec<String>> {
        let config = snapshot(&self.config);
        self.adapter.list_models(&config.provider).await
    }

    fn install_filter(&self) {
        // The filter always wraps the raw store, never a previous filter,
        // so reinstalling cannot nest wrappers.
        *self.filtered.write().unwrap_or_else(|e| e.into_inner()) =
            Some(Arc::new(FilteredTranscriptView::new(self.transcript.clone())));
    }

    fn spawn_listener(&self) {
        let mut guard = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut receiver = self.bus.subscribe();
        let coordinator = self.coordinator.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.event_type == EventType::GenerationEnded => {
                        // Each run gets its own task so tearing down the
                        // listener never aborts an in-flight dispatch; the
                        // coordinator's guard drops overlapping runs.
                        let coordinator = coordinator.clone();
                        tokio::spawn(async move {
                            coordinator.handle_generation_end().await;
                        });
                    }
                    Ok(_) => {}
                    Err(EventError::Lagged { count }) => {
                        warn!(count, "pipeline listener lagged behind the event bus");
                    }
                    Err(_) => break,
                }
            }
        }));
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    transcript: Option<Arc<Transcript>>,
    bus: Option<Arc<EventBus>>,
    assembler: Option<Arc<PromptAssembler>>,
    adapter: Option<Arc<dyn ProviderAdapter>>,
    prompt: Option<Arc<dyn SmartPromptSource>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transcript(mut self, transcript: Arc<Transcript>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn assembler(mut self, assembler: Arc<PromptAssembler>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn SmartPromptSource>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn build(self) -> PipelineResult<Arc<Pipeline>> {
        let config = self.config.unwrap_or_default();
        let transcript = self
            .transcript
            .ok_or(PipelineError::BuilderMissing("transcript"))?;
        let bus = self.bus.ok_or(PipelineError::BuilderMissing("bus"))?;
        let assembler = self
            .assembler
            .ok_or(PipelineError::BuilderMissing("assembler"))?;
        let adapter = self
            .adapter
            .ok_or(PipelineError::BuilderMissing("adapter"))?;

        let status = StatusHub::new(config.status_dismiss);
        let stats = Arc::new(FailureStat::new());
        let enabled = Arc::new(AtomicBool::new(false));
        let shared_config: SharedConfig = Arc::new(RwLock::new(config));

        let merger = ResultMerger::new(transcript.clone(), bus.clone(), enabled.clone());
        let request = RequestPipeline::new(
            adapter.clone(),
            self.prompt,
            status.clone(),
            stats.clone(),
            merger,
            shared_config.clone(),
        );
        let coordinator = Arc::new(GenerationCoordinator::new(
            transcript.clone(),
            stats.clone(),
            enabled.clone(),
            shared_config.clone(),
            request,
        ));

        Ok(Arc::new(Pipeline {
            config: shared_config,
            transcript,
            bus,
            adapter,
            status,
            stats,
            coordinator,
            directive: DirectiveManager::new(assembler),
            enabled,
            filtered: RwLock::new(None),
            listener: Mutex::new(None),
        }))
    }
}
