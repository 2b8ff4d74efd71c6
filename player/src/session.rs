//! Playback session state machine.
//!
//! `Player` owns the session and drives attach/load/unload/destroy. Session
//! state lives behind a mutex that is never held across an `.await` or while
//! listeners run. Ordering between overlapping operations is enforced with the
//! generation counter: every task re-checks its captured generation after each
//! suspension and exits without side effects once superseded.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Instant;

use common::{
    ErrorCode, EventKind, LanguageRole, PlayerError, PlayerEvent, SessionState, Stats, Track,
    TrackId, TrackType,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{
    Cue, ManifestFetcher, MediaSink, StreamingCollaborator, TextRenderer, TextRendererFactory,
};
use crate::config::{ConfigError, PlayerConfig, PlayerOptions};
use crate::event_bus::{EventBus, ListenerId};
use crate::generation::{Generation, GenerationCounter};
use crate::retry::{RetryController, RetryFailure};
use crate::stats::StatsRecorder;
use crate::track_selector::{SwitchDecision, TrackSelector};

/// External collaborators injected into a [`Player`]
#[derive(Clone)]
pub struct PlayerComponents {
    pub fetcher: Arc<dyn ManifestFetcher>,
    pub streaming: Arc<dyn StreamingCollaborator>,
    pub text_renderer_factory: TextRendererFactory,
}

struct SinkBinding {
    id: u64,
    sink: Arc<dyn MediaSink>,
    source_primed: bool,
}

/// Work handed from a state transition to the async teardown that follows it
struct Teardown {
    stop_streaming: bool,
    text_renderer: Option<Arc<dyn TextRenderer>>,
}

struct Session {
    state: SessionState,
    sink: Option<SinkBinding>,
    next_binding_id: u64,
    uri: Option<String>,
    tracks: Vec<Track>,
    active_variant: Option<TrackId>,
    active_text: Option<TrackId>,
    selector: TrackSelector,
    text_renderer: Option<Arc<dyn TextRenderer>>,
    text_visible: bool,
    streaming_started: bool,
    stats: StatsRecorder,
}

impl Session {
    fn new() -> Self {
        let mut stats = StatsRecorder::new();
        stats.record_state(SessionState::Detached);
        Self {
            state: SessionState::Detached,
            sink: None,
            next_binding_id: 1,
            uri: None,
            tracks: Vec::new(),
            active_variant: None,
            active_text: None,
            selector: TrackSelector::new(),
            text_renderer: None,
            text_visible: false,
            streaming_started: false,
            stats,
        }
    }

    /// Destroyed is never left.
    fn transition(&mut self, to: SessionState, events: &mut Vec<PlayerEvent>) {
        if self.state == to || self.state == SessionState::Destroyed {
            return;
        }
        let from = self.state;
        self.state = to;
        self.stats.record_state(to);
        events.push(PlayerEvent::StateChanged { from, to });
    }

    fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    fn active_track(&self, track_type: TrackType) -> Option<&Track> {
        let id = match track_type {
            TrackType::Variant => self.active_variant,
            TrackType::Text => self.active_text,
        }?;
        self.track(id)
    }

    /// Makes `id` the only active track of its type. Returns the track when
    /// something changed.
    fn activate(&mut self, track_type: TrackType, id: TrackId, from_adaptation: bool) -> Option<Track> {
        let current = match track_type {
            TrackType::Variant => self.active_variant,
            TrackType::Text => self.active_text,
        };
        if current == Some(id) {
            return None;
        }
        if self.track(id).map(|t| t.track_type) != Some(track_type) {
            return None;
        }

        for track in self.tracks.iter_mut().filter(|t| t.track_type == track_type) {
            track.active = track.id == id;
        }
        match track_type {
            TrackType::Variant => self.active_variant = Some(id),
            TrackType::Text => self.active_text = Some(id),
        }

        let track = self.track(id).cloned()?;
        self.stats.record_switch(&track, from_adaptation);
        Some(track)
    }

    fn take_teardown(&mut self) -> Teardown {
        Teardown {
            stop_streaming: std::mem::take(&mut self.streaming_started),
            text_renderer: self.text_renderer.take(),
        }
    }

    fn clear_content(&mut self) {
        self.uri = None;
        self.tracks.clear();
        self.active_variant = None;
        self.active_text = None;
        self.selector.reset();
    }

    fn tracks_of(&self, track_type: TrackType) -> Vec<Track> {
        self.tracks
            .iter()
            .filter(|t| t.track_type == track_type)
            .cloned()
            .collect()
    }
}

struct PlayerInner {
    id: Uuid,
    config: RwLock<PlayerConfig>,
    generations: Arc<GenerationCounter>,
    session: Mutex<Session>,
    events: EventBus,
    fetcher: Arc<dyn ManifestFetcher>,
    streaming: Arc<dyn StreamingCollaborator>,
    text_renderer_factory: TextRendererFactory,
    destroyed: OnceCell<()>,
}

/// Playback session controller. Cloning yields another handle to the same
/// session.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl Player {
    pub fn new(components: PlayerComponents, config: PlayerConfig) -> Self {
        let id = Uuid::new_v4();
        debug!("Created player {}", id);
        Self {
            inner: Arc::new(PlayerInner {
                id,
                config: RwLock::new(config),
                generations: Arc::new(GenerationCounter::new()),
                session: Mutex::new(Session::new()),
                events: EventBus::new(),
                fetcher: components.fetcher,
                streaming: components.streaming,
                text_renderer_factory: components.text_renderer_factory,
                destroyed: OnceCell::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.session().state
    }

    pub fn generation(&self) -> Generation {
        self.inner.generations.current()
    }

    /// Binds the session to `sink`.
    ///
    /// Any previous sink is released first. With `None` the session stays
    /// detached. With `initialize_source_immediately` the sink's source is
    /// primed now rather than on the first load.
    pub async fn attach(
        &self,
        sink: Option<Arc<dyn MediaSink>>,
        initialize_source_immediately: bool,
    ) -> Result<(), PlayerError> {
        let bound = {
            let session = self.session();
            if session.state == SessionState::Destroyed {
                return Err(PlayerError::destroyed());
            }
            session.sink.is_some()
        };
        if bound {
            self.detach().await;
        }

        let Some(sink) = sink else {
            debug!("Player {} attached without a sink", self.inner.id);
            return Ok(());
        };

        let mut events = Vec::new();
        let binding_id = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                return Err(PlayerError::destroyed());
            }
            let id = session.next_binding_id;
            session.next_binding_id += 1;
            session.sink = Some(SinkBinding {
                id,
                sink: sink.clone(),
                source_primed: false,
            });
            session.transition(SessionState::Attaching, &mut events);
            id
        };
        self.emit_all(events);

        let mut result = sink.attach().await;
        if result.is_ok() && initialize_source_immediately {
            result = sink.set_source_primed(true).await;
        }

        let mut events = Vec::new();
        let superseded = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                Some(PlayerError::destroyed())
            } else if let Some(binding) = session.sink.as_mut().filter(|b| b.id == binding_id) {
                match &result {
                    Ok(()) => {
                        binding.source_primed |= initialize_source_immediately;
                        if session.state == SessionState::Attaching {
                            session.transition(SessionState::Attached, &mut events);
                        }
                        events.push(PlayerEvent::Attach);
                    }
                    Err(_) => {
                        session.sink = None;
                        session.transition(SessionState::Detached, &mut events);
                    }
                }
                None
            } else {
                // Replaced or released while the sink was attaching.
                Some(PlayerError::critical(
                    ErrorCode::OperationAborted,
                    "attach superseded",
                ))
            }
        };
        self.emit_all(events);

        if let Some(error) = superseded {
            debug!("Player {} releasing sink of abandoned attach", self.inner.id);
            if result.is_ok() && initialize_source_immediately {
                if let Err(e) = sink.set_source_primed(false).await {
                    warn!("Failed to clear sink source of abandoned attach: {}", e);
                }
            }
            sink.detach().await;
            return Err(error);
        }

        match result {
            Ok(()) => {
                info!("Player {} attached to sink", self.inner.id);
                Ok(())
            }
            Err(error) => {
                warn!("Player {} failed to attach sink: {}", self.inner.id, error);
                sink.detach().await;
                Err(error)
            }
        }
    }

    /// Unloads and releases the sink. No-op when unbound or destroyed.
    pub async fn detach(&self) {
        {
            let session = self.session();
            if session.state == SessionState::Destroyed || session.sink.is_none() {
                return;
            }
        }
        if let Err(e) = self.unload(false).await {
            warn!("Unload during detach failed: {}", e);
        }

        let mut events = Vec::new();
        let binding = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                return;
            }
            let binding = session.sink.take();
            session.transition(SessionState::Detached, &mut events);
            if binding.is_some() {
                events.push(PlayerEvent::Detach);
            }
            binding
        };
        self.emit_all(events);

        if let Some(binding) = binding {
            binding.sink.detach().await;
            info!("Player {} detached from sink", self.inner.id);
        }
    }

    /// Loads `uri`, superseding whatever was loading or loaded.
    ///
    /// Resolves once streaming has started. If a later load/unload/destroy
    /// supersedes this one, resolves with `LoadInterrupted` and emits nothing.
    pub async fn load(&self, uri: &str) -> Result<(), PlayerError> {
        let started = Instant::now();
        let uri = uri.to_string();
        let config = self.get_configuration();

        let mut events = Vec::new();
        let (previous, generation, teardown, prime) = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                return Err(PlayerError::destroyed());
            }
            let Some(binding) = session.sink.as_ref() else {
                return Err(PlayerError::critical(
                    ErrorCode::NoSinkAttached,
                    "attach a media sink before loading",
                ));
            };
            let prime = (!binding.source_primed).then(|| (binding.id, binding.sink.clone()));
            let Some((previous, generation)) = self.inner.generations.advance() else {
                return Err(PlayerError::destroyed());
            };

            let teardown = session.take_teardown();
            session.clear_content();
            session.stats.reset();
            session.uri = Some(uri.clone());
            session.transition(SessionState::Loading, &mut events);
            (previous, generation, teardown, prime)
        };
        self.inner.fetcher.abort(previous);
        events.push(PlayerEvent::Loading { uri: uri.clone() });
        self.emit_all(events);
        info!("Player {} loading {} ({})", self.inner.id, uri, generation);

        self.run_teardown(teardown).await;

        if let Some((binding_id, sink)) = prime {
            if let Err(error) = sink.set_source_primed(true).await {
                return self.fail_load(generation, error).await;
            }
            let mut session = self.session();
            if !self.inner.generations.is_current(generation) {
                return Err(PlayerError::load_interrupted());
            }
            if let Some(binding) = session.sink.as_mut().filter(|b| b.id == binding_id) {
                binding.source_primed = true;
            }
        }

        let controller = RetryController::new(config.manifest_retry.clone(), self.inner.generations.clone());
        let fetcher = self.inner.fetcher.clone();
        let fetched = controller
            .run(generation, |g| {
                let fetcher = fetcher.clone();
                let uri = uri.clone();
                async move { fetcher.fetch(&uri, g).await }
            })
            .await;

        let (manifest, retry_state) = match fetched {
            Ok(fetched) => fetched,
            Err(RetryFailure::Superseded) => {
                debug!("Load of {} superseded ({})", uri, generation);
                return Err(PlayerError::load_interrupted());
            }
            Err(RetryFailure::Failed { error, attempts }) => {
                warn!("Manifest request for {} failed after {} attempt(s)", uri, attempts);
                return self.fail_load(generation, error).await;
            }
        };

        if manifest.variants.is_empty() {
            let error = PlayerError::critical(
                ErrorCode::NoVariants,
                format!("{} has no playable variants", uri),
            );
            return self.fail_load(generation, error).await;
        }

        let (variant, text, visible, renderer) = {
            let mut session = self.session();
            if !self.inner.generations.is_current(generation) {
                return Err(PlayerError::load_interrupted());
            }
            let renderer = (self.inner.text_renderer_factory)();
            session.tracks = manifest
                .variants
                .iter()
                .chain(manifest.text_tracks.iter())
                .cloned()
                .map(|mut track| {
                    track.active = false;
                    track
                })
                .collect();
            session.stats.set_manifest_attempts(retry_state.attempts);

            let variant_id =
                TrackSelector::choose_initial_variant(&session.tracks, &config.preferred_audio_language);
            let text_id =
                TrackSelector::choose_initial_text(&session.tracks, &config.preferred_text_language);
            let variant = variant_id.and_then(|id| session.activate(TrackType::Variant, id, true));
            let text = text_id.and_then(|id| session.activate(TrackType::Text, id, true));

            // Switches wait until the streaming collaborator confirms the
            // initial Period transition.
            session.selector.begin_transition();
            session.text_renderer = Some(renderer.clone());
            (variant, text, session.text_visible, renderer)
        };
        let Some(variant) = variant else {
            let error = PlayerError::critical(ErrorCode::NoVariants, "no initial variant");
            return self.fail_load(generation, error).await;
        };

        if !self.inner.generations.is_current(generation) {
            return Err(PlayerError::load_interrupted());
        }
        renderer.set_visibility(visible);
        self.emit(PlayerEvent::Streaming);

        {
            let mut session = self.session();
            if !self.inner.generations.is_current(generation) {
                return Err(PlayerError::load_interrupted());
            }
            session.streaming_started = true;
        }
        let notifier = StreamingNotifier {
            generation,
            player: Arc::downgrade(&self.inner),
        };
        if let Err(error) = self
            .inner
            .streaming
            .start(&manifest, &variant, text.as_ref(), notifier)
            .await
        {
            return self.fail_load(generation, error).await;
        }

        let mut events = Vec::new();
        let show_text = {
            let mut session = self.session();
            if !self.inner.generations.is_current(generation) {
                return Err(PlayerError::load_interrupted());
            }
            session.transition(SessionState::Loaded, &mut events);
            session.stats.set_load_latency(started.elapsed());

            let show = TrackSelector::auto_text_visible(
                session.active_track(TrackType::Variant),
                session.active_track(TrackType::Text),
                &config.preferred_text_language,
            );
            if show && !session.text_visible {
                session.text_visible = true;
                session.text_renderer.clone()
            } else {
                None
            }
        };
        self.emit_all(events);
        if let Some(renderer) = show_text {
            debug!("Enabling text display for preferred language {}", config.preferred_text_language);
            renderer.set_visibility(true);
            self.emit(PlayerEvent::TextTrackVisibility { visible: true });
        }
        self.emit(PlayerEvent::Loaded { uri: uri.clone() });

        info!(
            "Player {} loaded {} in {:?} ({} manifest attempt(s))",
            self.inner.id,
            uri,
            started.elapsed(),
            retry_state.attempts
        );
        Ok(())
    }

    /// Stops playback and returns to Attached (or Detached when unbound).
    ///
    /// With `reinitialize_media_source` the sink gets a fresh primed source;
    /// otherwise its source is cleared and stays cleared.
    pub async fn unload(&self, reinitialize_media_source: bool) -> Result<(), PlayerError> {
        let mut events = Vec::new();
        let (previous, generation, teardown, sink) = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                return Ok(());
            }
            let Some((previous, generation)) = self.inner.generations.advance() else {
                return Ok(());
            };
            let teardown = session.take_teardown();
            if session.state.has_content() {
                session.transition(SessionState::Unloading, &mut events);
            }
            if let Some(uri) = &session.uri {
                info!("Player {} unloading {} ({})", self.inner.id, uri, generation);
            }
            session.clear_content();
            let sink = session.sink.as_ref().map(|b| (b.id, b.sink.clone()));
            (previous, generation, teardown, sink)
        };
        self.inner.fetcher.abort(previous);
        events.push(PlayerEvent::Unloading);
        self.emit_all(events);

        self.run_teardown(teardown).await;

        let mut primed = false;
        if let Some((_, sink)) = &sink {
            let result = if reinitialize_media_source {
                match sink.set_source_primed(false).await {
                    Ok(()) => sink.set_source_primed(true).await,
                    Err(e) => Err(e),
                }
            } else {
                sink.set_source_primed(false).await
            };
            match result {
                Ok(()) => primed = reinitialize_media_source,
                Err(e) => warn!("Failed to reset sink source during unload: {}", e),
            }
        }

        let mut events = Vec::new();
        {
            let mut session = self.session();
            if self.inner.generations.is_current(generation) {
                let binding_id = sink.as_ref().map(|(id, _)| *id);
                if let Some(binding) = session.sink.as_mut().filter(|b| Some(b.id) == binding_id) {
                    binding.source_primed = primed;
                }
                let to = if session.sink.is_some() {
                    SessionState::Attached
                } else {
                    SessionState::Detached
                };
                session.transition(to, &mut events);
            }
        }
        self.emit_all(events);
        Ok(())
    }

    /// Tears the player down for good.
    ///
    /// Concurrent calls share a single teardown; every caller resolves once it
    /// has finished. Later calls resolve immediately.
    pub async fn destroy(&self) {
        self.inner.destroyed.get_or_init(|| self.destroy_once()).await;
    }

    async fn destroy_once(&self) {
        let mut events = Vec::new();
        let (previous, teardown, binding) = {
            let mut session = self.session();
            let previous = self.inner.generations.retire();
            let teardown = session.take_teardown();
            session.clear_content();
            session.transition(SessionState::Destroyed, &mut events);
            (previous, teardown, session.sink.take())
        };
        if let Some(previous) = previous {
            self.inner.fetcher.abort(previous);
        }
        self.emit_all(events);

        self.run_teardown(teardown).await;
        if let Some(binding) = binding {
            if let Err(e) = binding.sink.set_source_primed(false).await {
                warn!("Failed to clear sink source during destroy: {}", e);
            }
            binding.sink.detach().await;
        }

        self.inner.events.clear();
        info!("Player {} destroyed", self.inner.id);
    }

    /// Applies `options` on top of the current configuration. Takes effect on
    /// the next load.
    pub fn configure(&self, options: PlayerOptions) -> Result<(), ConfigError> {
        let mut config = self
            .inner
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let merged = config.merged(options);
        merged.validate()?;
        *config = merged;
        Ok(())
    }

    pub fn get_configuration(&self) -> PlayerConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn get_stats(&self) -> Stats {
        let session = self.session();
        session.stats.snapshot(session.active_track(TrackType::Variant))
    }

    pub fn get_variant_tracks(&self) -> Vec<Track> {
        self.session().tracks_of(TrackType::Variant)
    }

    pub fn get_text_tracks(&self) -> Vec<Track> {
        self.session().tracks_of(TrackType::Text)
    }

    /// Distinct language/role pairs of the text tracks. Tracks without a role
    /// report an empty role.
    pub fn get_text_languages_and_roles(&self) -> Vec<LanguageRole> {
        let session = self.session();
        let mut pairs: Vec<LanguageRole> = Vec::new();
        for track in session.tracks.iter().filter(|t| t.track_type == TrackType::Text) {
            let roles: Vec<String> = if track.roles.is_empty() {
                vec![String::new()]
            } else {
                track.roles.clone()
            };
            for role in roles {
                let pair = LanguageRole {
                    language: track.language.clone(),
                    role,
                };
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }

    pub fn select_variant_track(&self, track: &Track) -> Result<(), PlayerError> {
        self.request_switch(TrackType::Variant, track.id)
    }

    pub fn select_text_track(&self, track: &Track) -> Result<(), PlayerError> {
        self.request_switch(TrackType::Text, track.id)
    }

    /// Switches to the variant of `language` (and `role`) whose bandwidth is
    /// closest to the active one.
    pub fn select_audio_language(&self, language: &str, role: Option<&str>) -> Result<(), PlayerError> {
        let id = {
            let session = self.session();
            let current = session.active_track(TrackType::Variant).and_then(|t| t.bandwidth);
            TrackSelector::closest_variant(&session.tracks, language, role, current)
        };
        match id {
            Some(id) => self.request_switch(TrackType::Variant, id),
            None => Err(PlayerError::critical(
                ErrorCode::TrackNotFound,
                format!("no variant for language '{}'", language),
            )),
        }
    }

    /// Side-loads a subtitle track for the loaded content and makes it the
    /// active text track.
    pub fn add_text_track(
        &self,
        uri: &str,
        language: &str,
        kind: &str,
        mime_type: &str,
    ) -> Result<Track, PlayerError> {
        let track = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                return Err(PlayerError::destroyed());
            }
            if session.state != SessionState::Loaded {
                return Err(PlayerError::critical(
                    ErrorCode::NoContentLoaded,
                    "text tracks can only be added to loaded content",
                ));
            }
            if !matches!(kind, "subtitles" | "captions") {
                return Err(PlayerError::critical(
                    ErrorCode::InvalidTextTrack,
                    format!("unsupported text track kind '{}'", kind),
                ));
            }

            let id = session.tracks.iter().map(|t| t.id).max().map_or(0, |max| max + 1);
            let mut track = Track::text(id, language);
            track.kind = Some(kind.to_string());
            track.mime_type = Some(mime_type.to_string());
            track.external = true;
            track.uri = Some(uri.to_string());
            session.tracks.push(track.clone());
            track
        };
        debug!("Added external text track {} from {}", track.id, uri);

        self.request_switch(TrackType::Text, track.id)?;
        Ok(self.session().track(track.id).cloned().unwrap_or(track))
    }

    pub fn set_text_track_visibility(&self, visible: bool) {
        let renderer = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed || session.text_visible == visible {
                return;
            }
            session.text_visible = visible;
            session.text_renderer.clone()
        };
        if let Some(renderer) = renderer {
            renderer.set_visibility(visible);
        }
        self.emit(PlayerEvent::TextTrackVisibility { visible });
    }

    pub fn is_text_track_visible(&self) -> bool {
        let session = self.session();
        match &session.text_renderer {
            Some(renderer) => renderer.is_visible(),
            None => session.text_visible,
        }
    }

    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PlayerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.events.add_listener(kind, listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    fn request_switch(&self, track_type: TrackType, id: TrackId) -> Result<(), PlayerError> {
        let applied = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed {
                return Err(PlayerError::destroyed());
            }
            if !session.state.has_content() {
                return Err(PlayerError::critical(
                    ErrorCode::NoContentLoaded,
                    "no content loaded",
                ));
            }
            if session.track(id).map(|t| t.track_type) != Some(track_type) {
                return Err(PlayerError::critical(
                    ErrorCode::TrackNotFound,
                    format!("no {:?} track with id {}", track_type, id),
                ));
            }
            match session.selector.request(track_type, id) {
                SwitchDecision::Deferred => {
                    debug!("Deferring {:?} switch to track {} until the Period transition completes", track_type, id);
                    return Ok(());
                }
                SwitchDecision::ApplyNow => session.activate(track_type, id, false),
            }
        };
        if let Some(track) = applied {
            self.apply_to_streaming(&track);
        }
        Ok(())
    }

    fn apply_to_streaming(&self, track: &Track) {
        match track.track_type {
            TrackType::Variant => {
                self.inner.streaming.switch_variant(track);
                self.emit(PlayerEvent::VariantChanged { track: track.clone() });
            }
            TrackType::Text => {
                self.inner.streaming.switch_text(track);
                self.emit(PlayerEvent::TextChanged { track: track.clone() });
            }
        }
    }

    fn on_transition_started(&self, generation: Generation) {
        let mut session = self.session();
        if self.inner.generations.is_current(generation) && session.state.has_content() {
            session.selector.begin_transition();
        }
    }

    fn on_transition_completed(&self, generation: Generation) {
        let applied: Vec<Track> = {
            let mut session = self.session();
            if !self.inner.generations.is_current(generation) || !session.state.has_content() {
                return;
            }
            let ready = session.selector.complete_transition();
            let mut applied = Vec::with_capacity(ready.len());
            for (track_type, id) in ready {
                applied.extend(session.activate(track_type, id, false));
            }
            applied
        };
        for track in &applied {
            debug!("Applying deferred {:?} switch to track {}", track.track_type, track.id);
            self.apply_to_streaming(track);
        }
    }

    fn current_text_renderer(&self, generation: Generation) -> Option<Arc<dyn TextRenderer>> {
        let session = self.session();
        if !self.inner.generations.is_current(generation) {
            return None;
        }
        session.text_renderer.clone()
    }

    async fn fail_load(&self, generation: Generation, error: PlayerError) -> Result<(), PlayerError> {
        let mut events = Vec::new();
        let teardown = {
            let mut session = self.session();
            if session.state == SessionState::Destroyed
                || !self.inner.generations.is_current(generation)
            {
                return Err(PlayerError::load_interrupted());
            }
            let teardown = session.take_teardown();
            session.clear_content();
            let to = if session.sink.is_some() {
                SessionState::Attached
            } else {
                SessionState::Detached
            };
            session.transition(to, &mut events);
            teardown
        };
        warn!("Player {} load failed: {}", self.inner.id, error);
        events.push(PlayerEvent::Error { error: error.clone() });
        self.emit_all(events);

        self.run_teardown(teardown).await;
        Err(error)
    }

    async fn run_teardown(&self, teardown: Teardown) {
        if teardown.stop_streaming {
            self.inner.streaming.stop().await;
        }
        if let Some(renderer) = teardown.text_renderer {
            renderer.remove_cues(0.0, f64::INFINITY);
            renderer.release().await;
        }
    }

    fn emit(&self, event: PlayerEvent) {
        self.inner.events.dispatch(&event);
    }

    fn emit_all(&self, events: Vec<PlayerEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Channel from the streaming collaborator back to the player.
///
/// Tagged with the generation of the load that started streaming; once that
/// generation is superseded every call is a no-op.
#[derive(Clone)]
pub struct StreamingNotifier {
    generation: Generation,
    player: Weak<PlayerInner>,
}

impl StreamingNotifier {
    fn player(&self) -> Option<Player> {
        self.player.upgrade().map(|inner| Player { inner })
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.player()
            .map_or(false, |p| p.inner.generations.is_current(self.generation))
    }

    /// A Period transition began; switches are deferred until it completes.
    pub fn transition_started(&self) {
        if let Some(player) = self.player() {
            player.on_transition_started(self.generation);
        }
    }

    /// The transition finished; deferred switches are applied now.
    pub fn transition_completed(&self) {
        if let Some(player) = self.player() {
            player.on_transition_completed(self.generation);
        }
    }

    pub fn append_text_cues(&self, cues: Vec<Cue>) {
        if let Some(renderer) = self.player().and_then(|p| p.current_text_renderer(self.generation)) {
            renderer.append_cues(cues);
        }
    }

    pub fn remove_text_cues(&self, start: f64, end: f64) {
        if let Some(renderer) = self.player().and_then(|p| p.current_text_renderer(self.generation)) {
            renderer.remove_cues(start, end);
        }
    }
}

impl fmt::Debug for StreamingNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingNotifier")
            .field("generation", &self.generation)
            .finish()
    }
}
