//! In-memory collaborators for tests and the demo binary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{ErrorCode, Manifest, PlayerError, Track, TrackId};
use tracing::debug;

use crate::collaborators::{
    Cue, FetchOutcome, MediaSink, StreamingCollaborator, TextRenderer, TextRendererFactory,
};
use crate::generation::Generation;
use crate::retry::AttemptOutcome;
use crate::scheme::SchemeHandler;
use crate::session::StreamingNotifier;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manifest with two English variants, a Spanish variant and English, Spanish
/// and French subtitles.
pub fn demo_manifest(uri: &str) -> Manifest {
    Manifest::new(uri)
        .with_variant(Track::variant(0, "en", 800_000).with_resolution(640, 360))
        .with_variant(Track::variant(1, "en", 2_500_000).with_resolution(1280, 720))
        .with_variant(
            Track::variant(2, "es", 2_400_000)
                .with_resolution(1280, 720)
                .with_role("dub"),
        )
        .with_text_track(Track::text(3, "en"))
        .with_text_track(Track::text(4, "es").with_role("main"))
        .with_text_track(Track::text(5, "fr"))
}

/// Media sink that records what the player asked of it
#[derive(Default)]
pub struct SimulatedSink {
    primed: AtomicBool,
    attached: AtomicBool,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
    prime_calls: AtomicUsize,
    fail_attach: AtomicBool,
    delay: Option<Duration>,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sink operation sleeps for `delay` before completing
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next_attach(&self) {
        self.fail_attach.store(true, Ordering::SeqCst);
    }

    pub fn is_primed(&self) -> bool {
        self.primed.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }

    pub fn prime_calls(&self) -> usize {
        self.prime_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MediaSink for SimulatedSink {
    async fn attach(&self) -> Result<(), PlayerError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_attach.swap(false, Ordering::SeqCst) {
            return Err(PlayerError::critical(
                ErrorCode::SinkAttachFailed,
                "simulated attach failure",
            ));
        }
        self.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_source_primed(&self, primed: bool) -> Result<(), PlayerError> {
        self.prime_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.primed.store(primed, Ordering::SeqCst);
        Ok(())
    }

    async fn detach(&self) {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        self.attached.store(false, Ordering::SeqCst);
        self.primed.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StreamingLog {
    started: Vec<(TrackId, Option<TrackId>)>,
    variant_switches: Vec<TrackId>,
    text_switches: Vec<TrackId>,
    notifier: Option<StreamingNotifier>,
}

/// Streaming engine that completes its initial Period transition on `start`
/// unless told to wait for [`SimulatedStreaming::complete_transition`].
pub struct SimulatedStreaming {
    log: Mutex<StreamingLog>,
    stop_calls: AtomicUsize,
    auto_complete_transition: AtomicBool,
    start_delay: Option<Duration>,
    fail_start: AtomicBool,
}

impl SimulatedStreaming {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(StreamingLog::default()),
            stop_calls: AtomicUsize::new(0),
            auto_complete_transition: AtomicBool::new(true),
            start_delay: None,
            fail_start: AtomicBool::new(false),
        }
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// When false, `start` leaves the initial transition open.
    pub fn set_auto_complete_transition(&self, enabled: bool) {
        self.auto_complete_transition.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Finishes the transition of the most recent `start`.
    pub fn complete_transition(&self) {
        let notifier = lock(&self.log).notifier.clone();
        if let Some(notifier) = notifier {
            notifier.transition_completed();
        }
    }

    /// Starts a new Period transition on the most recent `start`.
    pub fn begin_transition(&self) {
        let notifier = lock(&self.log).notifier.clone();
        if let Some(notifier) = notifier {
            notifier.transition_started();
        }
    }

    pub fn notifier(&self) -> Option<StreamingNotifier> {
        lock(&self.log).notifier.clone()
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.log).started.len()
    }

    /// `(variant, text)` passed to each `start`
    pub fn started(&self) -> Vec<(TrackId, Option<TrackId>)> {
        lock(&self.log).started.clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn variant_switches(&self) -> Vec<TrackId> {
        lock(&self.log).variant_switches.clone()
    }

    pub fn text_switches(&self) -> Vec<TrackId> {
        lock(&self.log).text_switches.clone()
    }
}

impl Default for SimulatedStreaming {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingCollaborator for SimulatedStreaming {
    async fn start(
        &self,
        manifest: &Manifest,
        variant: &Track,
        text: Option<&Track>,
        notifier: StreamingNotifier,
    ) -> Result<(), PlayerError> {
        {
            let mut log = lock(&self.log);
            log.started.push((variant.id, text.map(|t| t.id)));
            log.notifier = Some(notifier.clone());
        }
        debug!("Simulated streaming of {} started ({})", manifest.uri, notifier.generation());

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(PlayerError::critical(
                ErrorCode::StreamingStartFailed,
                "simulated streaming failure",
            ));
        }
        if self.auto_complete_transition.load(Ordering::SeqCst) {
            notifier.transition_completed();
        }
        Ok(())
    }

    fn switch_variant(&self, track: &Track) {
        lock(&self.log).variant_switches.push(track.id);
    }

    fn switch_text(&self, track: &Track) {
        lock(&self.log).text_switches.push(track.id);
    }

    async fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.log).notifier = None;
    }
}

/// Text renderer keeping its cues in memory
#[derive(Default)]
pub struct SimulatedTextRenderer {
    visible: AtomicBool,
    released: AtomicBool,
    cues: Mutex<Vec<Cue>>,
}

impl SimulatedTextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that hands out the same renderer on every load.
    pub fn shared_factory(renderer: Arc<Self>) -> TextRendererFactory {
        Arc::new(move || renderer.clone() as Arc<dyn TextRenderer>)
    }

    /// Factory producing a fresh renderer per load.
    pub fn factory() -> TextRendererFactory {
        Arc::new(|| Arc::new(SimulatedTextRenderer::new()) as Arc<dyn TextRenderer>)
    }

    pub fn cues(&self) -> Vec<Cue> {
        lock(&self.cues).clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextRenderer for SimulatedTextRenderer {
    fn set_visibility(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn append_cues(&self, cues: Vec<Cue>) {
        lock(&self.cues).extend(cues);
    }

    fn remove_cues(&self, start: f64, end: f64) {
        lock(&self.cues).retain(|cue| cue.end_time <= start || cue.start_time >= end);
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Scheme handler serving a fixed manifest
pub struct StaticManifestHandler {
    manifest: Manifest,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticManifestHandler {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemeHandler for StaticManifestHandler {
    async fn request(&self, uri: &str, _generation: Generation) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut manifest = self.manifest.clone();
        manifest.uri = uri.to_string();
        AttemptOutcome::Success(manifest)
    }
}

/// Scheme handler that always fails with the given severity
pub struct FailingHandler {
    error: PlayerError,
    calls: AtomicUsize,
}

impl FailingHandler {
    pub fn recoverable() -> Self {
        Self::new(PlayerError::recoverable(
            ErrorCode::HttpError,
            "simulated network failure",
        ))
    }

    pub fn critical() -> Self {
        Self::new(PlayerError::critical(
            ErrorCode::BadHttpStatus,
            "simulated HTTP 404",
        ))
    }

    pub fn new(error: PlayerError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemeHandler for FailingHandler {
    async fn request(&self, _uri: &str, _generation: Generation) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.error.is_recoverable() {
            AttemptOutcome::Recoverable(self.error.clone())
        } else {
            AttemptOutcome::Fatal(self.error.clone())
        }
    }
}
