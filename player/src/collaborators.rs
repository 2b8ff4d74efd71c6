//! Contracts of the components the player drives but does not implement.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Manifest, PlayerError, Track};
use serde::{Deserialize, Serialize};

use crate::generation::Generation;
use crate::retry::AttemptOutcome;
use crate::session::StreamingNotifier;

/// Result of one manifest request
pub type FetchOutcome = AttemptOutcome<Manifest>;

/// Host-provided rendering sink (the media element and its source)
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Binds the sink to the host display surface
    async fn attach(&self) -> Result<(), PlayerError>;

    /// Creates (true) or clears (false) the sink's media source
    async fn set_source_primed(&self, primed: bool) -> Result<(), PlayerError>;

    async fn detach(&self);
}

/// Acquires manifests for the retry controller
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, uri: &str, generation: Generation) -> FetchOutcome;

    /// Aborts requests issued under `generation`. Results that still arrive
    /// are discarded by the caller.
    fn abort(&self, generation: Generation);
}

/// Segment streaming engine
#[async_trait]
pub trait StreamingCollaborator: Send + Sync {
    /// Starts streaming the given tracks.
    ///
    /// Track switches are held back until the collaborator reports through
    /// `notifier` that the initial Period transition completed. `stop` must
    /// also abort a `start` that is still running.
    async fn start(
        &self,
        manifest: &Manifest,
        variant: &Track,
        text: Option<&Track>,
        notifier: StreamingNotifier,
    ) -> Result<(), PlayerError>;

    fn switch_variant(&self, track: &Track);

    fn switch_text(&self, track: &Track);

    async fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub start_time: f64,
    pub end_time: f64,
    pub payload: String,
}

impl Cue {
    pub fn new(start_time: f64, end_time: f64, payload: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            payload: payload.into(),
        }
    }
}

/// Subtitle display surface
#[async_trait]
pub trait TextRenderer: Send + Sync {
    fn set_visibility(&self, visible: bool);

    fn is_visible(&self) -> bool;

    fn append_cues(&self, cues: Vec<Cue>);

    /// Removes cues overlapping `[start, end)`
    fn remove_cues(&self, start: f64, end: f64);

    async fn release(&self);
}

/// Builds a renderer for each load
pub type TextRendererFactory = Arc<dyn Fn() -> Arc<dyn TextRenderer> + Send + Sync>;
