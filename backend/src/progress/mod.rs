//! Aggregate progress, throughput and ETA for one upload session.
//!
//! Files transfer one at a time, so the tracker only ever accounts for
//! finished files (`uploaded_size`) plus the single file in flight
//! (`file_progress`):
//!
//! ```text
//! percentage = (uploaded_size + file_progress) / total_size * 100
//! ```
//!
//! Throughput is sampled, not computed per callback: a new speed is taken only
//! once [`SAMPLE_INTERVAL`] has passed since the previous sample, which keeps
//! the reported value from jumping with every small chunk. Time is passed in
//! explicitly so the maths stays deterministic under test.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Minimum spacing between two throughput samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

const MIB: f64 = 1024.0 * 1024.0;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of an upload session.
///
/// `Completed`, `Aborted` and `Failed` are terminal. `Aborted` (user
/// cancelled) and `Failed` (transport error) never both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    InProgress,
    Completed,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of a session, handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub state: SessionState,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    /// Aggregate percentage in `[0, 100]`.
    pub percentage: f64,
    /// Bytes per second from the latest sample.
    pub speed: f64,
    /// Seconds remaining; `None` until a positive speed has been sampled.
    pub eta_seconds: Option<f64>,
    /// Zero-based index of the file in flight.
    pub file_index: usize,
    pub file_count: usize,
    pub current_file: Option<String>,
}

impl ProgressSnapshot {
    /// Snapshot of a session that has not started.
    pub fn idle(total_bytes: u64, file_count: usize) -> Self {
        Self {
            state: SessionState::Idle,
            uploaded_bytes: 0,
            total_bytes,
            percentage: 0.0,
            speed: 0.0,
            eta_seconds: None,
            file_index: 0,
            file_count,
            current_file: None,
        }
    }

    /// One-line human summary, e.g. `62% | 3.4 MB/s | ~2 min remaining`.
    pub fn summary(&self) -> String {
        let mut line = format!("{:.0}%", self.percentage);
        if self.speed > 0.0 {
            line.push_str(&format!(" | {}", format_speed(self.speed)));
        }
        if let Some(eta) = self.eta_seconds.filter(|_| self.percentage < 99.0) {
            if let Some(text) = format_eta(eta) {
                line.push_str(&format!(" | {}", text));
            }
        }
        line
    }
}

// =============================================================================
// Tracker
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Sample {
    bytes: u64,
    at: Instant,
}

/// Progress accumulator for a single session.
///
/// Owned by the task driving the session; not shared.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_size: u64,
    uploaded_size: u64,
    file_progress: u64,
    file_index: usize,
    file_count: usize,
    current_file: Option<String>,
    last_sample: Sample,
    speed: f64,
    eta_seconds: Option<f64>,
    state: SessionState,
}

impl ProgressTracker {
    /// Create an idle tracker for files of the given sizes.
    pub fn new(sizes: &[u64], now: Instant) -> Self {
        Self {
            total_size: sizes.iter().sum(),
            uploaded_size: 0,
            file_progress: 0,
            file_index: 0,
            file_count: sizes.len(),
            current_file: None,
            last_sample: Sample { bytes: 0, at: now },
            speed: 0.0,
            eta_seconds: None,
            state: SessionState::Idle,
        }
    }

    /// Move to `InProgress` and restart the sampling clock.
    pub fn start(&mut self, now: Instant) {
        if self.state == SessionState::Idle {
            self.state = SessionState::InProgress;
            self.last_sample = Sample { bytes: self.bytes_now(), at: now };
        }
    }

    /// A new file is about to transfer.
    pub fn begin_file(&mut self, index: usize, name: &str) {
        self.file_index = index;
        self.file_progress = 0;
        self.current_file = Some(name.to_string());
    }

    /// Bytes transferred so far for the file in flight.
    ///
    /// Stale (smaller) values are ignored so the aggregate never moves backwards.
    pub fn on_progress(&mut self, loaded: u64, now: Instant) -> ProgressSnapshot {
        if self.state.is_terminal() {
            return self.snapshot();
        }

        self.file_progress = self.file_progress.max(loaded);
        let bytes_now = self.bytes_now();

        let elapsed = now.saturating_duration_since(self.last_sample.at);
        if elapsed >= SAMPLE_INTERVAL {
            let delta = bytes_now.saturating_sub(self.last_sample.bytes);
            self.speed = delta as f64 / elapsed.as_secs_f64();

            let remaining = self.total_size.saturating_sub(bytes_now);
            self.eta_seconds = if self.speed > 0.0 {
                Some(remaining as f64 / self.speed)
            } else {
                None
            };

            self.last_sample = Sample { bytes: bytes_now, at: now };
        }

        self.snapshot()
    }

    /// The file in flight finished; fold its full size into the total.
    pub fn finish_file(&mut self, size: u64) -> ProgressSnapshot {
        self.uploaded_size = self.uploaded_size.saturating_add(size);
        self.file_progress = 0;
        self.snapshot()
    }

    pub fn complete(&mut self) -> ProgressSnapshot {
        self.state = SessionState::Completed;
        self.eta_seconds = None;
        self.snapshot()
    }

    pub fn abort(&mut self) -> ProgressSnapshot {
        self.finish_with(SessionState::Aborted)
    }

    pub fn fail(&mut self) -> ProgressSnapshot {
        self.finish_with(SessionState::Failed)
    }

    fn finish_with(&mut self, state: SessionState) -> ProgressSnapshot {
        if !self.state.is_terminal() {
            self.state = state;
        }
        self.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn eta_seconds(&self) -> Option<f64> {
        self.eta_seconds
    }

    fn bytes_now(&self) -> u64 {
        self.uploaded_size
            .saturating_add(self.file_progress)
            .min(self.total_size)
    }

    /// Aggregate percentage; an empty session counts as done.
    pub fn percentage(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        (self.bytes_now() as f64 / self.total_size as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            state: self.state,
            uploaded_bytes: self.bytes_now(),
            total_bytes: self.total_size,
            percentage: self.percentage(),
            speed: self.speed,
            eta_seconds: self.eta_seconds,
            file_index: self.file_index,
            file_count: self.file_count,
            current_file: self.current_file.clone(),
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// `1.5 MB/s` style throughput (binary megabytes, one decimal).
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{:.1} MB/s", bytes_per_sec / MIB)
}

/// `~3 min remaining`, rounded up to whole minutes. `None` for non-positive ETAs.
pub fn format_eta(seconds: f64) -> Option<String> {
    if !(seconds > 0.0) || !seconds.is_finite() {
        return None;
    }
    let minutes = (seconds / 60.0).ceil() as u64;
    Some(format!("~{} min remaining", minutes))
}

/// `16.0 MB` style size.
pub fn format_size(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / MIB)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_percentage_after_each_file() {
        let t0 = Instant::now();
        let sizes = [10 * MB, 5 * MB, MB];
        let mut tracker = ProgressTracker::new(&sizes, t0);
        tracker.start(t0);

        let mut seen = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            tracker.begin_file(i, "file");
            tracker.on_progress(*size, t0 + ms(100 * (i as u64 + 1)));
            seen.push(tracker.finish_file(*size).percentage);
        }

        assert_eq!(seen, vec![62.5, 93.75, 100.0]);
        assert_eq!(tracker.complete().state, SessionState::Completed);
    }

    #[test]
    fn test_percentage_is_cumulative_within_file() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[100, 300], t0);
        tracker.start(t0);

        tracker.begin_file(0, "a");
        tracker.finish_file(100);
        tracker.begin_file(1, "b");
        let snap = tracker.on_progress(100, t0);
        assert_eq!(snap.percentage, 50.0);
        assert_eq!(snap.uploaded_bytes, 200);
        assert_eq!(snap.file_index, 1);
        assert_eq!(snap.current_file.as_deref(), Some("b"));
    }

    #[test]
    fn test_percentage_never_decreases_or_exceeds_100() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[1000], t0);
        tracker.start(t0);
        tracker.begin_file(0, "a");

        let mut last = 0.0;
        for loaded in [100, 400, 300, 900, 5000] {
            let p = tracker.on_progress(loaded, t0).percentage;
            assert!(p >= last, "{} < {}", p, last);
            assert!(p <= 100.0);
            last = p;
        }
        assert_eq!(last, 100.0);
    }

    #[test]
    fn test_speed_only_resampled_after_interval() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[10 * MB], t0);
        tracker.start(t0);
        tracker.begin_file(0, "a");

        // Too early: no sample yet.
        tracker.on_progress(MB, t0 + ms(200));
        assert_eq!(tracker.speed(), 0.0);
        assert_eq!(tracker.eta_seconds(), None);

        // 2 MB over 500ms = 4 MB/s.
        tracker.on_progress(2 * MB, t0 + ms(500));
        assert_eq!(tracker.speed(), 4.0 * MB as f64);
        assert_eq!(tracker.eta_seconds(), Some(2.0));

        // Rapid callbacks do not touch the sample.
        tracker.on_progress(3 * MB, t0 + ms(600));
        tracker.on_progress(6 * MB, t0 + ms(999));
        assert_eq!(tracker.speed(), 4.0 * MB as f64);
        assert_eq!(tracker.eta_seconds(), Some(2.0));

        // 4 MB since the last sample over 1s.
        tracker.on_progress(6 * MB, t0 + ms(1500));
        assert_eq!(tracker.speed(), 4.0 * MB as f64);
        assert_eq!(tracker.eta_seconds(), Some(1.0));
    }

    #[test]
    fn test_eta_unreported_without_positive_speed() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[1000], t0);
        tracker.start(t0);
        tracker.begin_file(0, "a");

        tracker.on_progress(500, t0 + ms(600));
        assert!(tracker.eta_seconds().is_some());

        // A stalled sample drops speed to zero and hides the ETA again.
        tracker.on_progress(500, t0 + ms(1200));
        assert_eq!(tracker.speed(), 0.0);
        assert_eq!(tracker.eta_seconds(), None);
    }

    #[test]
    fn test_tiny_file_does_not_divide_by_zero() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[1], t0);
        tracker.start(t0);
        tracker.begin_file(0, "a");
        let snap = tracker.on_progress(1, t0);
        assert_eq!(snap.percentage, 100.0);
        assert!(snap.speed.is_finite());
        assert_eq!(snap.eta_seconds, None);
    }

    #[test]
    fn test_empty_session_is_complete() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[], t0);
        tracker.start(t0);
        let snap = tracker.complete();
        assert_eq!(snap.percentage, 100.0);
        assert_eq!(snap.state, SessionState::Completed);
        assert_eq!(snap.file_count, 0);
    }

    #[test]
    fn test_terminal_states_are_exclusive() {
        let t0 = Instant::now();
        let mut tracker = ProgressTracker::new(&[10], t0);
        tracker.start(t0);
        assert_eq!(tracker.abort().state, SessionState::Aborted);
        assert_eq!(tracker.fail().state, SessionState::Aborted);

        let mut tracker = ProgressTracker::new(&[10], t0);
        tracker.start(t0);
        assert_eq!(tracker.fail().state, SessionState::Failed);
        assert_eq!(tracker.abort().state, SessionState::Failed);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_speed(1.5 * MB as f64), "1.5 MB/s");
        assert_eq!(format_eta(61.0).as_deref(), Some("~2 min remaining"));
        assert_eq!(format_eta(0.0), None);
        assert_eq!(format_size(16 * MB), "16.0 MB");

        let mut snap = ProgressSnapshot::idle(100, 1);
        snap.percentage = 40.0;
        snap.speed = 2.0 * MB as f64;
        snap.eta_seconds = Some(30.0);
        assert_eq!(snap.summary(), "40% | 2.0 MB/s | ~1 min remaining");
    }
}
