// ═══════════════════════════════════════════════════════════════
// RUN METRICS - how much suffering did that lookup cost?
// ═══════════════════════════════════════════════════════════════
//
// One collector is shared by every run in the process. Counters are plain
// atomics so parallel runs can bump them without taking turns. At exit the
// binary logs one JSON snapshot: sessions burned, CAPTCHAs attempted, queries
// replayed, rows kept and rows thrown away.

use std::time::Instant;

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub sessions_acquired: u64,
    pub session_failures: u64,
    pub captcha_attempts: u64,
    pub captcha_rejections: u64,
    pub query_submissions: u64,
    pub query_retries: u64,
    pub rows_parsed: u64,
    pub rows_skipped: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub uptime_seconds: u64,
}

pub struct RunMetrics {
    sessions_acquired: AtomicU64,
    session_failures: AtomicU64,
    captcha_attempts: AtomicU64,
    captcha_rejections: AtomicU64,
    query_submissions: AtomicU64,
    query_retries: AtomicU64,
    rows_parsed: AtomicU64,
    rows_skipped: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    start_time: Instant,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            sessions_acquired: AtomicU64::new(0),
            session_failures: AtomicU64::new(0),
            captcha_attempts: AtomicU64::new(0),
            captcha_rejections: AtomicU64::new(0),
            query_submissions: AtomicU64::new(0),
            query_retries: AtomicU64::new(0),
            rows_parsed: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_sessions_acquired(&self) {
        self.sessions_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_session_failures(&self) {
        self.session_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_captcha_attempts(&self) {
        self.captcha_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// OCR came back empty or unparseable.
    pub fn increment_captcha_rejections(&self) {
        self.captcha_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_query_submissions(&self) {
        self.query_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_query_retries(&self) {
        self.query_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rows(&self, parsed: usize, skipped: usize) {
        self.rows_parsed.fetch_add(parsed as u64, Ordering::Relaxed);
        self.rows_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
    }

    pub fn record_run(&self, succeeded: bool) {
        if succeeded {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_acquired: self.sessions_acquired.load(Ordering::Relaxed),
            session_failures: self.session_failures.load(Ordering::Relaxed),
            captcha_attempts: self.captcha_attempts.load(Ordering::Relaxed),
            captcha_rejections: self.captcha_rejections.load(Ordering::Relaxed),
            query_submissions: self.query_submissions.load(Ordering::Relaxed),
            query_retries: self.query_retries.load(Ordering::Relaxed),
            rows_parsed: self.rows_parsed.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RunMetrics::new();
        metrics.increment_sessions_acquired();
        metrics.increment_sessions_acquired();
        metrics.increment_query_retries();
        metrics.add_rows(7, 2);
        metrics.record_run(true);
        metrics.record_run(false);

        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_acquired, 2);
        assert_eq!(snap.query_retries, 1);
        assert_eq!(snap.rows_parsed, 7);
        assert_eq!(snap.rows_skipped, 2);
        assert_eq!(snap.runs_succeeded, 1);
        assert_eq!(snap.runs_failed, 1);
    }
}
