//! Streaming parser for ffmpeg's diagnostic output, turning `Duration:` and
//! `time=` timestamps into progress reports.

use crate::progress::ProgressSink;
use regex::Regex;

/// Stateful line observer bound to a [`ProgressSink`].
///
/// The first line carrying a `Duration: HH:MM:SS.CC` timestamp fixes the
/// total; every later `time=HH:MM:SS.CC` line reports `(elapsed, total)` in
/// milliseconds. Lines that match neither pattern, and malformed timestamps,
/// are ignored. This is a best-effort signal, not correctness-critical.
pub struct TimeProgress<S> {
    duration_re: Regex,
    time_re: Regex,
    total_millis: Option<u64>,
    sink: S,
}

impl<S: ProgressSink> TimeProgress<S> {
    pub fn new(sink: S) -> Self {
        Self {
            duration_re: Regex::new(r"Duration: (\d\d):(\d\d):(\d\d)\.(\d\d)").unwrap(),
            time_re: Regex::new(r"time=(\d\d):(\d\d):(\d\d)\.(\d\d)").unwrap(),
            total_millis: None,
            sink,
        }
    }

    pub fn observe_line(&mut self, line: &str) {
        if self.total_millis.is_none() {
            self.total_millis = clock_millis(&self.duration_re, line);
        }

        if let Some(total) = self.total_millis {
            if let Some(elapsed) = clock_millis(&self.time_re, line) {
                self.sink.report(elapsed, total);
            }
        }
    }
}

fn clock_millis(re: &Regex, line: &str) -> Option<u64> {
    let caps = re.captures(line)?;
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    let centis: u64 = caps[4].parse().ok()?;
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + centis * 10)
}
