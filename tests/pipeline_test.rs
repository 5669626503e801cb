//! End-to-end pipeline tests: enable/disable hook pairing, the freshness
//! guard, the retry bound, and the merge-back path, driven through the
//! event bus as the host would drive them.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use sideband::config::{PipelineConfig, ProviderConfig, WireFormat};
use sideband::coordinator::RunState;
use sideband::directive::{PromptAssembler, RESTRICTION_KEY};
use sideband::event_bus::{Event, EventBus, EventType};
use sideband::provider::{DispatchResult, ProviderAdapter, ProviderResult};
use sideband::status::Status;
use sideband::transcript::{Transcript, TranscriptView};
use sideband::Pipeline;
use tokio::time::{sleep, Duration};

const RESULT_BLOCK: &str = "<infobar_data>location: hallway</infobar_data>";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Scripted adapter: counts dispatches and replays a fixed result.
struct ScriptedAdapter {
    calls: Arc<AtomicUsize>,
    result: DispatchResult,
    delay: Duration,
}

impl ScriptedAdapter {
    fn new(result: DispatchResult) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                calls: calls.clone(),
                result,
                delay: Duration::ZERO,
            }),
            calls,
        )
    }

    fn with_delay(result: DispatchResult, delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                calls: calls.clone(),
                result,
                delay,
            }),
            calls,
        )
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn dispatch(
        &self,
        _system_text: &str,
        _user_text: &str,
        _config: &ProviderConfig,
    ) -> DispatchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            sleep(self.delay).await;
        }
        self.result.clone()
    }

    async fn list_models(&self, _config: &ProviderConfig) -> ProviderResult<Vec<String>> {
        Ok(vec!["scripted-model".to_string()])
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        retry_delay: Duration::from_millis(10),
        status_dismiss: Duration::from_millis(200),
        provider: ProviderConfig {
            provider: "test".to_string(),
            wire_format: WireFormat::OpenaiCompatible,
            base_url: "https://api.example.com".to_string(),
            api_key: "key".to_string(),
            model: "model".to_string(),
            retry_count: 3,
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    transcript: Arc<Transcript>,
    bus: Arc<EventBus>,
    assembler: Arc<PromptAssembler>,
}

fn harness(adapter: Arc<dyn ProviderAdapter>) -> Harness {
    init_tracing();
    let transcript = Arc::new(Transcript::new());
    let bus = Arc::new(EventBus::new(16));
    let assembler = Arc::new(PromptAssembler::new());
    let pipeline = Pipeline::builder()
        .config(test_config())
        .transcript(transcript.clone())
        .bus(bus.clone())
        .assembler(assembler.clone())
        .adapter(adapter)
        .build()
        .unwrap();
    Harness {
        pipeline,
        transcript,
        bus,
        assembler,
    }
}

async fn settle(calls: &Arc<AtomicUsize>, expected: usize) {
    for _ in 0..100 {
        if calls.load(Ordering::SeqCst) >= expected {
            // One extra tick for the post-dispatch merge/report to land.
            sleep(Duration::from_millis(20)).await;
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_enable_disable_restores_raw_view_and_disables_directive() {
    let (adapter, _calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    let before: Arc<dyn TranscriptView> = h.transcript.clone();
    assert!(Arc::ptr_eq(&h.pipeline.transcript_view(), &before));

    h.pipeline.enable().unwrap();
    assert!(h.pipeline.is_enabled());
    assert!(!Arc::ptr_eq(&h.pipeline.transcript_view(), &before));
    assert!(!h.assembler.get(RESTRICTION_KEY).unwrap().disabled);

    h.pipeline.disable();
    assert!(!h.pipeline.is_enabled());
    // The raw store reference is restored, no leaked wrapper.
    assert!(Arc::ptr_eq(&h.pipeline.transcript_view(), &before));
    // The directive registration survives, disabled and emptied.
    let directive = h.assembler.get(RESTRICTION_KEY).unwrap();
    assert!(directive.disabled);
    assert_eq!(directive.text, "");
}

#[tokio::test]
async fn test_disable_twice_is_idempotent() {
    let (adapter, _calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    h.pipeline.enable().unwrap();
    h.pipeline.disable();
    h.pipeline.disable();
    assert!(!h.pipeline.is_enabled());
}

#[tokio::test]
async fn test_enable_twice_does_not_double_strip_or_nest() {
    let (adapter, _calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);
    h.transcript
        .push_model("Story.\n\n<infobar_data>hp: 10</infobar_data>");

    h.pipeline.enable().unwrap();
    h.pipeline.enable().unwrap();

    // Same filtered-read behavior as a single install.
    let view = h.pipeline.transcript_view();
    assert_eq!(view.get(0).unwrap().raw_text, "Story.");
}

#[tokio::test]
async fn test_enable_refuses_invalid_config() {
    let (adapter, _calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    let mut config = test_config();
    config.provider.api_key = String::new();
    h.pipeline.update_config(config);

    assert!(h.pipeline.enable().is_err());
    assert!(!h.pipeline.is_enabled());
    // No hooks installed on refusal.
    assert!(h.assembler.get(RESTRICTION_KEY).is_none());
}

#[tokio::test]
async fn test_fresh_reply_is_annotated_end_to_end() {
    let (adapter, calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    h.transcript.push_user("What happens next?");
    h.transcript.push_model("He opens the door.");

    h.pipeline.enable().unwrap();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    settle(&calls, 1).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.transcript.get(1).unwrap().raw_text,
        format!("He opens the door.\n\n{}", RESULT_BLOCK)
    );
    assert_eq!(h.transcript.save_generation(), 1);
    assert_eq!(h.pipeline.coordinator().state(), RunState::Idle);
    // The filtered view still shows pure narrative.
    assert_eq!(
        h.pipeline.transcript_view().get(1).unwrap().raw_text,
        "He opens the door."
    );
}

#[tokio::test]
async fn test_merge_reemits_message_available() {
    let (adapter, calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    h.transcript.push_user("q");
    h.transcript.push_model("a");

    h.pipeline.enable().unwrap();
    let mut rx = h.bus.subscribe();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    settle(&calls, 1).await;

    let mut saw_message_available = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
    {
        if event.event_type == EventType::MessageAvailable {
            assert_eq!(event.entry_index(), Some(1));
            saw_message_available = true;
            break;
        }
    }
    assert!(saw_message_available);
}

#[tokio::test]
async fn test_stale_reply_is_skipped_without_dispatch() {
    let (adapter, calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    h.transcript.push_model("old reply");
    h.transcript.push_user("new question with no reply yet");

    h.pipeline.enable().unwrap();
    let failures_before = h.pipeline.stats().count();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.pipeline.stats().count(), failures_before + 1);
    assert_eq!(
        h.pipeline.stats().snapshot().last.unwrap().reason,
        "stale reply"
    );
    assert_eq!(h.transcript.get(0).unwrap().raw_text, "old reply");
}

#[tokio::test]
async fn test_retry_bound_is_retry_count_plus_one() {
    // Empty text on a 2xx is the retry trigger, not an error.
    let (adapter, calls) = ScriptedAdapter::new(DispatchResult::ok(String::new()));
    let h = harness(adapter);

    h.transcript.push_user("q");
    h.transcript.push_model("a");

    h.pipeline.enable().unwrap();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    settle(&calls, 4).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // Transcript untouched on exhaustion.
    assert_eq!(h.transcript.get(1).unwrap().raw_text, "a");
    let status = h.pipeline.status().current().unwrap();
    assert_eq!(status.status, Status::Error);
    assert_eq!(status.message.as_deref(), Some("empty response"));
}

#[tokio::test]
async fn test_transport_failure_reports_last_error() {
    let (adapter, calls) =
        ScriptedAdapter::new(DispatchResult::failed("503 upstream unavailable".to_string()));
    let h = harness(adapter);

    h.transcript.push_user("q");
    h.transcript.push_model("a");

    h.pipeline.enable().unwrap();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    settle(&calls, 4).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let status = h.pipeline.status().current().unwrap();
    assert_eq!(status.status, Status::Error);
    assert_eq!(status.message.as_deref(), Some("503 upstream unavailable"));
    assert_eq!(
        h.pipeline.stats().snapshot().last.unwrap().reason,
        "503 upstream unavailable"
    );
}

#[tokio::test]
async fn test_stray_block_is_repaired_before_dispatch() {
    let (adapter, calls) = ScriptedAdapter::new(DispatchResult::ok(RESULT_BLOCK.to_string()));
    let h = harness(adapter);

    h.transcript.push_user("q");
    // The primary model emitted a block despite the restriction.
    h.transcript
        .push_model("He opens the door.\n\n<infobar_data>stray</infobar_data>");

    h.pipeline.enable().unwrap();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    settle(&calls, 1).await;

    // The stray block was replaced by the secondary model's result.
    assert_eq!(
        h.transcript.get(1).unwrap().raw_text,
        format!("He opens the door.\n\n{}", RESULT_BLOCK)
    );
}

#[tokio::test]
async fn test_disable_mid_flight_skips_merge() {
    let (adapter, calls) = ScriptedAdapter::with_delay(
        DispatchResult::ok(RESULT_BLOCK.to_string()),
        Duration::from_millis(100),
    );
    let h = harness(adapter);

    h.transcript.push_user("q");
    h.transcript.push_model("He opens the door.");

    h.pipeline.enable().unwrap();
    h.bus.publish(Event::generation_ended()).await.unwrap();
    // Let the dispatch start, then tear the pipeline down under it.
    settle(&calls, 1).await;
    h.pipeline.disable();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(h.transcript.get(1).unwrap().raw_text, "He opens the door.");
    assert_eq!(h.transcript.save_generation(), 0);
    // The skipped merge must not leave a lingering "generating" indicator.
    assert!(h.pipeline.status().current().is_none());
}

#[tokio::test]
async fn test_discover_models_passthrough() {
    let (adapter, _calls) = ScriptedAdapter::new(DispatchResult::ok(String::new()));
    let h = harness(adapter);

    let models = h.pipeline.discover_models().await.unwrap();
    assert_eq!(models, vec!["scripted-model".to_string()]);
}
