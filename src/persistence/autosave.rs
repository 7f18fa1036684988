use crate::entities::player::PlayerMap;
use crate::persistence::store::SaveStore;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub interval_seconds: u64,
}

impl AutosaveConfig {
    pub fn interval(self) -> Option<Duration> {
        if self.interval_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.interval_seconds.max(1)))
        }
    }
}

/// Tracks when the next periodic save is due. An interval of zero
/// disables autosaving entirely.
#[derive(Debug, Clone)]
pub struct AutosaveState {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl AutosaveState {
    pub fn new(config: AutosaveConfig, now: Instant) -> Self {
        let interval = config.interval();
        let next_due = interval.map(|interval| now + interval);
        Self { interval, next_due }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.next_due.map_or(false, |next| now >= next)
    }

    pub fn mark_saved(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            self.next_due = Some(now + interval);
        }
    }
}

#[derive(Debug, Default)]
pub struct AutosaveReport {
    pub saved_players: usize,
    pub error: Option<String>,
}

pub fn autosave_players(players: &PlayerMap, store: &SaveStore) -> AutosaveReport {
    let mut report = AutosaveReport::default();
    match store.save_players(players.iter()) {
        Ok(count) => report.saved_players = count,
        Err(err) => report.error = Some(err),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_never_due() {
        let state = AutosaveState::new(AutosaveConfig { interval_seconds: 0 }, Instant::now());
        assert!(!state.due(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn due_after_interval_and_rearms() {
        let start = Instant::now();
        let mut state = AutosaveState::new(AutosaveConfig { interval_seconds: 60 }, start);
        assert!(!state.due(start + Duration::from_secs(59)));
        assert!(state.due(start + Duration::from_secs(60)));
        state.mark_saved(start + Duration::from_secs(60));
        assert!(!state.due(start + Duration::from_secs(61)));
        assert!(state.due(start + Duration::from_secs(120)));
    }
}
