//! Human-readable size and ETA strings derived from byte counters.
//!
//! Counters are refreshed on every progress event, the ETA only on the
//! fixed tick so it does not jitter at network-callback frequency.

use std::time::Duration;

use crate::domain::ProgressSample;

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Format a byte count with the largest unit whose scaled value is at least 1.
///
/// One (truncated) decimal below 10, otherwise a truncated whole number.
pub fn format_size(bytes: u64) -> String {
    let mut unit = 0;
    let mut divisor = 1u64;
    while unit + 1 < UNITS.len() && bytes / divisor >= 1024 {
        divisor *= 1024;
        unit += 1;
    }

    if unit == 0 {
        return format!("{}B", bytes);
    }

    let scaled = bytes as f64 / divisor as f64;
    if scaled < 10.0 {
        let tenths = (bytes as u128 * 10 / divisor as u128) as u64;
        format!("{}.{}{}", tenths / 10, tenths % 10, UNITS[unit])
    } else {
        format!("{}{}", bytes / divisor, UNITS[unit])
    }
}

pub fn format_eta(remaining: Option<Duration>) -> String {
    let Some(remaining) = remaining else {
        return "unknown".to_string();
    };

    let secs = remaining.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h{:02}m", hours, mins)
    } else if mins > 0 {
        format!("{}m{:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Display strings for one download.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    counters: String,
    eta: String,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self {
            counters: format_size(0),
            eta: format_eta(None),
        }
    }
}

impl ProgressReporter {
    /// Refresh the byte counters. Called for every raw progress event.
    pub fn on_progress(&mut self, sample: &ProgressSample) {
        self.counters = match sample.bytes_total {
            Some(total) => format!(
                "{} / {}",
                format_size(sample.bytes_received),
                format_size(total)
            ),
            None => format_size(sample.bytes_received),
        };
    }

    /// Refresh the ETA. Called on the fixed tick.
    pub fn on_tick(&mut self, sample: &ProgressSample) {
        self.eta = format_eta(sample.remaining());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn counters(&self) -> &str {
        &self.counters
    }

    pub fn eta(&self) -> &str {
        &self.eta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(received: u64, total: Option<u64>, elapsed_secs: f64) -> ProgressSample {
        ProgressSample {
            bytes_received: received,
            bytes_total: total,
            elapsed: Duration::from_secs_f64(elapsed_secs),
        }
    }

    #[test]
    fn test_format_size_fixed_counts() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(999), "999B");
        assert_eq!(format_size(1023), "1023B");
        assert_eq!(format_size(1024), "1.0KB");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(10239), "9.9KB");
        assert_eq!(format_size(10240), "10KB");
        assert_eq!(format_size(1024 * 1024), "1.0MB");
        assert_eq!(format_size(1024 * 1024 - 1), "1023KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 / 2), "1.5GB");
        assert_eq!(format_size(u64::MAX), "15EB");
    }

    #[test]
    fn test_format_size_picks_largest_unit() {
        for bytes in [1u64, 512, 1024, 4096, 1 << 20, 5 << 30, 7 << 40] {
            let formatted = format_size(bytes);
            let suffix = formatted.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
            let unit_index = UNITS.iter().position(|u| *u == suffix).unwrap();
            let scaled = bytes as f64 / 1024f64.powi(unit_index as i32);
            assert!(scaled >= 1.0, "{} -> {}", bytes, formatted);
            assert!(scaled < 1024.0, "{} -> {}", bytes, formatted);
        }
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "unknown");
        assert_eq!(format_eta(Some(Duration::from_secs(0))), "0s");
        assert_eq!(format_eta(Some(Duration::from_secs(42))), "42s");
        assert_eq!(format_eta(Some(Duration::from_secs(185))), "3m05s");
        assert_eq!(format_eta(Some(Duration::from_secs(3600 + 7 * 60 + 9))), "1h07m");
    }

    #[test]
    fn test_reporter_eta_only_changes_on_tick() {
        let mut reporter = ProgressReporter::default();
        let s = sample(512, Some(1024), 2.0);

        reporter.on_progress(&s);
        assert_eq!(reporter.counters(), "512B / 1.0KB");
        assert_eq!(reporter.eta(), "unknown");

        reporter.on_tick(&s);
        assert_eq!(reporter.eta(), "2s");
    }

    #[test]
    fn test_reporter_tick_with_absurd_content_length() {
        let mut reporter = ProgressReporter::default();
        let s = sample(1, Some(u64::MAX), 2.0);

        reporter.on_progress(&s);
        reporter.on_tick(&s);
        assert!(reporter.eta().ends_with('m'), "{}", reporter.eta());
        assert_eq!(reporter.counters(), "1B / 15EB");
    }

    #[test]
    fn test_reporter_indeterminate() {
        let mut reporter = ProgressReporter::default();
        reporter.on_progress(&sample(2048, None, 1.0));
        assert_eq!(reporter.counters(), "2.0KB");
        assert_eq!(sample(2048, None, 1.0).fraction(), None);
    }
}
