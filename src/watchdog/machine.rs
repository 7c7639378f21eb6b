use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::stream::{build_stream_url, refresh_token};
use crate::types::LotId;

/// Stream lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamStatus {
    Loading,
    Playing,
    Failed,
}

/// Bounded linear backoff: retry N waits `backoff * N`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamState {
    pub url: Option<Url>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: StreamStatus,
}

/// Inputs to the machine. Events that may assign a new source carry the
/// cache-busting token to use.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start { token: i64 },
    Loaded { generation: u64, width: u32, height: u32 },
    LoadFailed { generation: u64 },
    HealthCheck { stalled: bool },
    RetryDue { token: i64 },
    ManualRetry { token: i64 },
    VisibilityChanged { visible: bool, stalled: bool, token: i64 },
}

/// Side effects for the caller to apply to the display surface
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    AssignSource { url: Url, generation: u64 },
    ScheduleRetry { attempt: u32, delay: Duration },
    ShowLoading,
    HideLoading,
    ShowError,
    HideError,
    ShowDisplay,
    HideDisplay,
}

/// Retry controller for one lot's video stream.
///
/// Every source assignment gets a new generation; load outcomes carrying an
/// older generation are stale and dropped. `reload_pending` is set while a
/// backoff timer is armed so that a health check racing the timer cannot
/// count the same failure twice.
#[derive(Debug)]
pub struct StreamMachine {
    base_url: Url,
    lot: LotId,
    policy: RetryPolicy,
    state: StreamState,
    generation: u64,
    in_flight: bool,
    reload_pending: bool,
}

impl StreamMachine {
    pub fn new(base_url: Url, lot: LotId, policy: RetryPolicy) -> Self {
        Self {
            base_url,
            lot,
            state: StreamState {
                url: None,
                retry_count: 0,
                max_retries: policy.max_retries,
                status: StreamStatus::Loading,
            },
            policy,
            generation: 0,
            in_flight: false,
            reload_pending: false,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn lot(&self) -> &LotId {
        &self.lot
    }

    #[cfg(test)]
    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start { token } => self.start(token),

            Event::Loaded { generation, width, height } => {
                if !self.accepts_outcome(generation) {
                    return Vec::new();
                }
                self.in_flight = false;
                if width == 0 || height == 0 {
                    tracing::warn!("⚠️ Video stream for lot {} loaded without a frame", self.lot);
                    return self.fail();
                }
                tracing::info!("✅ Video stream loaded successfully for lot {} ({}x{})", self.lot, width, height);
                self.state.retry_count = 0;
                self.state.status = StreamStatus::Playing;
                vec![Effect::HideLoading, Effect::HideError, Effect::ShowDisplay]
            }

            Event::LoadFailed { generation } => {
                if !self.accepts_outcome(generation) {
                    return Vec::new();
                }
                self.in_flight = false;
                tracing::error!("❌ Video stream error for lot {}", self.lot);
                self.fail()
            }

            Event::HealthCheck { stalled } => {
                if !stalled || self.state.status != StreamStatus::Playing || self.reload_pending {
                    return Vec::new();
                }
                tracing::warn!("🩺 Video stream health check failed for lot {}, attempting recovery", self.lot);
                self.fail()
            }

            Event::RetryDue { token } => {
                if !self.reload_pending {
                    return Vec::new();
                }
                self.reload_pending = false;
                let url = build_stream_url(&self.base_url, &self.lot, token);
                vec![self.assign(url)]
            }

            Event::ManualRetry { token } => {
                if self.state.status != StreamStatus::Failed {
                    tracing::debug!("Manual retry ignored, stream is {:?}", self.state.status);
                    return Vec::new();
                }
                tracing::info!("🔄 Manual video retry for lot {}", self.lot);
                let mut effects = vec![Effect::HideError, Effect::ShowDisplay];
                effects.extend(self.start(token));
                effects
            }

            Event::VisibilityChanged { visible, stalled, token } => {
                if !visible {
                    tracing::debug!("Page hidden, video continues in background");
                    return Vec::new();
                }
                tracing::debug!("Page visible, checking video stream");
                if !stalled
                    || self.state.status == StreamStatus::Failed
                    || self.reload_pending
                    || self.in_flight
                {
                    return Vec::new();
                }
                let Some(current) = self.state.url.as_ref() else {
                    return Vec::new();
                };
                tracing::info!("👀 Video stream for lot {} looks stuck, refreshing", self.lot);
                let url = refresh_token(current, token);
                self.state.status = StreamStatus::Loading;
                vec![self.assign(url)]
            }
        }
    }

    fn start(&mut self, token: i64) -> Vec<Effect> {
        self.state.retry_count = 0;
        self.state.status = StreamStatus::Loading;
        self.reload_pending = false;
        let url = build_stream_url(&self.base_url, &self.lot, token);
        vec![Effect::ShowLoading, self.assign(url)]
    }

    fn assign(&mut self, url: Url) -> Effect {
        self.generation += 1;
        self.in_flight = true;
        self.state.url = Some(url.clone());
        Effect::AssignSource { url, generation: self.generation }
    }

    fn accepts_outcome(&self, generation: u64) -> bool {
        if generation != self.generation || !self.in_flight {
            tracing::debug!(
                "Dropping stale load outcome (generation {}, current {})",
                generation, self.generation
            );
            return false;
        }
        true
    }

    fn fail(&mut self) -> Vec<Effect> {
        if self.reload_pending || self.state.status == StreamStatus::Failed {
            return Vec::new();
        }

        let mut effects = vec![Effect::HideLoading];
        if self.state.retry_count < self.policy.max_retries {
            self.state.retry_count += 1;
            self.state.status = StreamStatus::Loading;
            self.reload_pending = true;
            let attempt = self.state.retry_count;
            tracing::info!("🔁 Retrying video stream (attempt {}/{})", attempt, self.policy.max_retries);
            effects.push(Effect::ShowLoading);
            effects.push(Effect::ScheduleRetry { attempt, delay: self.policy.delay_for(attempt) });
        } else {
            tracing::error!("🚫 Video stream unavailable for lot {} after {} retries", self.lot, self.policy.max_retries);
            self.state.status = StreamStatus::Failed;
            effects.push(Effect::ShowError);
            effects.push(Effect::HideDisplay);
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> StreamMachine {
        StreamMachine::new(
            Url::parse("http://localhost:5000/").unwrap(),
            LotId::new("1"),
            RetryPolicy::default(),
        )
    }

    fn assigned_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::AssignSource { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("no source assigned")
    }

    fn scheduled_delay(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleRetry { delay, .. } => Some(*delay),
            _ => None,
        })
    }

    /// Fail the current source and fire the retry timer, returning the new generation
    fn fail_and_retry(m: &mut StreamMachine, generation: u64, token: i64) -> u64 {
        m.handle(Event::LoadFailed { generation });
        assigned_generation(&m.handle(Event::RetryDue { token }))
    }

    #[test]
    fn test_start_shows_loading_and_assigns_source() {
        let mut m = machine();
        let effects = m.handle(Event::Start { token: 42 });

        assert_eq!(effects[0], Effect::ShowLoading);
        assert_eq!(
            effects[1],
            Effect::AssignSource {
                url: Url::parse("http://localhost:5000/api/video-stream?lot=1&t=42").unwrap(),
                generation: 1,
            }
        );
        assert_eq!(m.state().status, StreamStatus::Loading);
    }

    #[test]
    fn test_backoff_grows_linearly_per_attempt() {
        let mut m = machine();
        let mut generation = assigned_generation(&m.handle(Event::Start { token: 1 }));

        for attempt in 1..=3u32 {
            let effects = m.handle(Event::LoadFailed { generation });
            assert_eq!(scheduled_delay(&effects), Some(Duration::from_millis(2000 * attempt as u64)));
            assert_eq!(m.state().retry_count, attempt);
            generation = assigned_generation(&m.handle(Event::RetryDue { token: attempt as i64 + 1 }));
        }
    }

    #[test]
    fn test_fails_after_retries_are_exhausted() {
        let mut m = machine();
        let mut generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        for token in 2..=4 {
            generation = fail_and_retry(&mut m, generation, token);
        }

        let effects = m.handle(Event::LoadFailed { generation });

        assert_eq!(m.state().status, StreamStatus::Failed);
        assert_eq!(m.state().retry_count, 3);
        assert_eq!(effects, vec![Effect::HideLoading, Effect::ShowError, Effect::HideDisplay]);

        // No automatic recovery once failed
        assert!(m.handle(Event::HealthCheck { stalled: true }).is_empty());
        assert!(m.handle(Event::RetryDue { token: 99 }).is_empty());
        assert!(m.handle(Event::VisibilityChanged { visible: true, stalled: true, token: 99 }).is_empty());
    }

    #[test]
    fn test_success_resets_retry_count() {
        let mut m = machine();
        let mut generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        generation = fail_and_retry(&mut m, generation, 2);
        generation = fail_and_retry(&mut m, generation, 3);
        assert_eq!(m.state().retry_count, 2);

        let effects = m.handle(Event::Loaded { generation, width: 640, height: 480 });

        assert_eq!(m.state().retry_count, 0);
        assert_eq!(m.state().status, StreamStatus::Playing);
        assert_eq!(effects, vec![Effect::HideLoading, Effect::HideError, Effect::ShowDisplay]);
    }

    #[test]
    fn test_manual_retry_restarts_from_zero() {
        let mut m = machine();
        let mut generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        for token in 2..=4 {
            generation = fail_and_retry(&mut m, generation, token);
        }
        m.handle(Event::LoadFailed { generation });
        assert_eq!(m.state().status, StreamStatus::Failed);

        let effects = m.handle(Event::ManualRetry { token: 10 });

        assert_eq!(&effects[..3], &[Effect::HideError, Effect::ShowDisplay, Effect::ShowLoading]);
        assert!(matches!(effects[3], Effect::AssignSource { .. }));
        assert_eq!(m.state().retry_count, 0);
        assert_eq!(m.state().status, StreamStatus::Loading);
        assert!(m.state().url.as_ref().unwrap().as_str().ends_with("t=10"));
    }

    #[test]
    fn test_manual_retry_ignored_unless_failed() {
        let mut m = machine();
        let generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        m.handle(Event::Loaded { generation, width: 10, height: 10 });
        assert!(m.handle(Event::ManualRetry { token: 2 }).is_empty());
    }

    #[test]
    fn test_loaded_without_frame_takes_error_path() {
        let mut m = machine();
        let generation = assigned_generation(&m.handle(Event::Start { token: 1 }));

        let effects = m.handle(Event::Loaded { generation, width: 0, height: 0 });

        assert_eq!(scheduled_delay(&effects), Some(Duration::from_secs(2)));
        assert_eq!(m.state().retry_count, 1);
        assert_eq!(m.state().status, StreamStatus::Loading);
    }

    #[test]
    fn test_stall_while_playing_counts_once() {
        let mut m = machine();
        let generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        m.handle(Event::Loaded { generation, width: 640, height: 480 });

        let first = m.handle(Event::HealthCheck { stalled: true });
        assert!(scheduled_delay(&first).is_some());
        assert!(m.reload_pending());

        // Same stall observed again before the backoff fires
        assert!(m.handle(Event::HealthCheck { stalled: true }).is_empty());
        assert!(m.handle(Event::LoadFailed { generation }).is_empty());
        assert_eq!(m.state().retry_count, 1);
    }

    #[test]
    fn test_health_check_ignores_healthy_or_loading_stream() {
        let mut m = machine();
        let generation = assigned_generation(&m.handle(Event::Start { token: 1 }));

        // Load still in flight
        assert!(m.handle(Event::HealthCheck { stalled: true }).is_empty());

        m.handle(Event::Loaded { generation, width: 640, height: 480 });
        assert!(m.handle(Event::HealthCheck { stalled: false }).is_empty());
        assert_eq!(m.state().retry_count, 0);
    }

    #[test]
    fn test_stale_outcomes_are_dropped() {
        let mut m = machine();
        let old = assigned_generation(&m.handle(Event::Start { token: 1 }));
        let current = fail_and_retry(&mut m, old, 2);
        assert_ne!(old, current);

        assert!(m.handle(Event::Loaded { generation: old, width: 1, height: 1 }).is_empty());
        assert_eq!(m.state().status, StreamStatus::Loading);

        m.handle(Event::Loaded { generation: current, width: 1, height: 1 });
        // A second outcome for an already settled source
        assert!(m.handle(Event::LoadFailed { generation: current }).is_empty());
        assert_eq!(m.state().status, StreamStatus::Playing);
    }

    #[test]
    fn test_visibility_refreshes_stalled_stream_token() {
        let mut m = machine();
        let generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        m.handle(Event::Loaded { generation, width: 640, height: 480 });

        assert!(m.handle(Event::VisibilityChanged { visible: false, stalled: true, token: 5 }).is_empty());
        assert!(m.handle(Event::VisibilityChanged { visible: true, stalled: false, token: 5 }).is_empty());

        let effects = m.handle(Event::VisibilityChanged { visible: true, stalled: true, token: 5 });
        match &effects[..] {
            [Effect::AssignSource { url, .. }] => {
                assert_eq!(url.as_str(), "http://localhost:5000/api/video-stream?lot=1&t=5");
            }
            other => panic!("unexpected effects: {other:?}"),
        }
        assert_eq!(m.state().retry_count, 0);
    }

    #[test]
    fn test_zero_retries_fails_immediately() {
        let mut m = StreamMachine::new(
            Url::parse("http://localhost:5000/").unwrap(),
            LotId::new("2"),
            RetryPolicy { max_retries: 0, backoff: Duration::from_secs(2) },
        );
        let generation = assigned_generation(&m.handle(Event::Start { token: 1 }));
        m.handle(Event::LoadFailed { generation });
        assert_eq!(m.state().status, StreamStatus::Failed);
    }
}
