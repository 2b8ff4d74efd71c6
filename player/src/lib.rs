pub mod generation;
pub mod event_bus;
#[cfg(test)]
mod event_bus_test;
pub mod retry;
#[cfg(test)]
mod retry_test;
pub mod track_selector;
pub mod collaborators;
pub mod scheme;
pub mod session;
pub mod stats;
pub mod config;
#[cfg(test)]
mod config_test;
pub mod logging;
pub mod serde_helpers;
pub mod simulated;

pub use collaborators::{
    Cue, FetchOutcome, ManifestFetcher, MediaSink, StreamingCollaborator, TextRenderer,
    TextRendererFactory,
};
pub use config::{ConfigError, LoggingConfig, PlayerConfig, PlayerOptions};
pub use event_bus::{EventBus, ListenerId};
pub use generation::{Generation, GenerationCounter};
pub use retry::{AttemptOutcome, RetryController, RetryFailure, RetryPolicy, RetryState};
pub use scheme::{SchemeFetcher, SchemeHandler, SchemeRegistry};
pub use session::{Player, PlayerComponents, StreamingNotifier};
pub use track_selector::{SwitchDecision, TrackSelector};

pub use common::*;
