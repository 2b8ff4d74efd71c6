//! Track choice heuristics and the switch mailbox.
//!
//! The selector never mutates tracks itself. It decides which track should be
//! active and whether a switch may be applied now; the player applies the
//! result.

use common::{Track, TrackId, TrackType};

/// Lowercase, `_` → `-`, surrounding whitespace removed.
pub fn normalize_language(language: &str) -> String {
    language.trim().to_ascii_lowercase().replace('_', "-")
}

fn primary_subtag(language: &str) -> &str {
    language.split('-').next().unwrap_or(language)
}

/// Exact match after normalization. Empty tags never match.
pub fn language_matches(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_language(a), normalize_language(b));
    !a.is_empty() && a == b
}

fn base_language_matches(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_language(a), normalize_language(b));
    !a.is_empty() && primary_subtag(&a) == primary_subtag(&b)
}

/// Best track of `track_type` for a preferred language: exact match first,
/// then primary-subtag match, then the first track of that type.
fn preferred_or_first(tracks: &[Track], track_type: TrackType, preferred: &str) -> Option<TrackId> {
    let candidates: Vec<&Track> = tracks.iter().filter(|t| t.track_type == track_type).collect();

    candidates
        .iter()
        .find(|t| language_matches(&t.language, preferred))
        .or_else(|| candidates.iter().find(|t| base_language_matches(&t.language, preferred)))
        .or_else(|| candidates.first())
        .map(|t| t.id)
}

/// What to do with an explicit switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    ApplyNow,
    /// Parked in the mailbox until the current Period transition completes
    Deferred,
}

/// Switch serialization against Period transitions.
///
/// While a transition is in flight each track type has a single-slot mailbox;
/// a newer request replaces the parked one.
#[derive(Debug, Default)]
pub struct TrackSelector {
    transition_in_flight: bool,
    pending_variant: Option<TrackId>,
    pending_text: Option<TrackId>,
}

impl TrackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops parked requests and leaves no transition in flight.
    pub fn reset(&mut self) {
        self.transition_in_flight = false;
        self.pending_variant = None;
        self.pending_text = None;
    }

    pub fn begin_transition(&mut self) {
        self.transition_in_flight = true;
    }

    pub fn is_transition_in_flight(&self) -> bool {
        self.transition_in_flight
    }

    pub fn pending(&self, track_type: TrackType) -> Option<TrackId> {
        match track_type {
            TrackType::Variant => self.pending_variant,
            TrackType::Text => self.pending_text,
        }
    }

    pub fn request(&mut self, track_type: TrackType, id: TrackId) -> SwitchDecision {
        if !self.transition_in_flight {
            return SwitchDecision::ApplyNow;
        }
        match track_type {
            TrackType::Variant => self.pending_variant = Some(id),
            TrackType::Text => self.pending_text = Some(id),
        }
        SwitchDecision::Deferred
    }

    /// Ends the transition and hands back the parked requests, variant first.
    /// Each request is returned exactly once.
    pub fn complete_transition(&mut self) -> Vec<(TrackType, TrackId)> {
        self.transition_in_flight = false;
        let mut ready = Vec::with_capacity(2);
        if let Some(id) = self.pending_variant.take() {
            ready.push((TrackType::Variant, id));
        }
        if let Some(id) = self.pending_text.take() {
            ready.push((TrackType::Text, id));
        }
        ready
    }

    pub fn choose_initial_variant(tracks: &[Track], preferred_audio: &str) -> Option<TrackId> {
        preferred_or_first(tracks, TrackType::Variant, preferred_audio)
    }

    pub fn choose_initial_text(tracks: &[Track], preferred_text: &str) -> Option<TrackId> {
        preferred_or_first(tracks, TrackType::Text, preferred_text)
    }

    /// Whether text should be shown automatically after a load.
    ///
    /// True when the active text track is in the preferred text language and
    /// the active variant's language differs from it. Never picks a track.
    pub fn auto_text_visible(
        active_variant: Option<&Track>,
        active_text: Option<&Track>,
        preferred_text: &str,
    ) -> bool {
        match (active_variant, active_text) {
            (Some(variant), Some(text)) => {
                language_matches(&text.language, preferred_text)
                    && !language_matches(&variant.language, &text.language)
            }
            _ => false,
        }
    }

    /// Variant of `language` (and `role`, if given) with the bandwidth closest
    /// to `current_bandwidth`.
    pub fn closest_variant(
        tracks: &[Track],
        language: &str,
        role: Option<&str>,
        current_bandwidth: Option<u64>,
    ) -> Option<TrackId> {
        let target = current_bandwidth.unwrap_or(0);
        tracks
            .iter()
            .filter(|t| t.track_type == TrackType::Variant)
            .filter(|t| language_matches(&t.language, language))
            .filter(|t| role.map_or(true, |r| t.has_role(r)))
            .min_by_key(|t| t.bandwidth.unwrap_or(0).abs_diff(target))
            .map(|t| t.id)
    }
}
