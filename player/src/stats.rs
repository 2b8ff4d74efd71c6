use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{SessionState, StateChange, Stats, Track, TrackChoice};

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}

/// Collects per-load statistics
#[derive(Debug, Default)]
pub struct StatsRecorder {
    load_latency: Option<Duration>,
    manifest_attempts: u32,
    switch_history: Vec<TrackChoice>,
    state_history: Vec<StateChange>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything recorded for the previous load
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record_state(&mut self, state: SessionState) {
        let now = Utc::now();
        if let Some(last) = self.state_history.last_mut() {
            if last.state == state {
                return;
            }
            last.duration = seconds_between(last.timestamp, now);
        }
        self.state_history.push(StateChange {
            state,
            timestamp: now,
            duration: 0.0,
        });
    }

    pub fn record_switch(&mut self, track: &Track, from_adaptation: bool) {
        self.switch_history.push(TrackChoice {
            timestamp: Utc::now(),
            id: track.id,
            track_type: track.track_type,
            from_adaptation,
            bandwidth: track.bandwidth,
        });
    }

    pub fn set_load_latency(&mut self, latency: Duration) {
        self.load_latency = Some(latency);
    }

    pub fn set_manifest_attempts(&mut self, attempts: u32) {
        self.manifest_attempts = attempts;
    }

    pub fn snapshot(&self, active_variant: Option<&Track>) -> Stats {
        let mut state_history = self.state_history.clone();
        if let Some(current) = state_history.last_mut() {
            current.duration = seconds_between(current.timestamp, Utc::now());
        }

        Stats {
            width: active_variant.and_then(|t| t.width),
            height: active_variant.and_then(|t| t.height),
            stream_bandwidth: active_variant.and_then(|t| t.bandwidth),
            load_latency: self.load_latency.map(|d| d.as_secs_f64()),
            manifest_attempts: self.manifest_attempts,
            switch_history: self.switch_history.clone(),
            state_history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_history_skips_repeats() {
        let mut recorder = StatsRecorder::new();
        recorder.record_state(SessionState::Loading);
        recorder.record_state(SessionState::Loading);
        recorder.record_state(SessionState::Loaded);

        let stats = recorder.snapshot(None);
        let states: Vec<SessionState> = stats.state_history.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![SessionState::Loading, SessionState::Loaded]);
    }

    #[test]
    fn test_snapshot_reports_active_variant() {
        let mut recorder = StatsRecorder::new();
        let track = Track::variant(3, "en", 500_000).with_resolution(1280, 720);
        recorder.record_switch(&track, true);
        recorder.set_load_latency(Duration::from_millis(250));

        let stats = recorder.snapshot(Some(&track));
        assert_eq!(stats.stream_bandwidth, Some(500_000));
        assert_eq!(stats.width, Some(1280));
        assert_eq!(stats.load_latency, Some(0.25));
        assert_eq!(stats.switch_history.len(), 1);
        assert!(stats.switch_history[0].from_adaptation);
    }
}
