//! Utility functions and helpers
//!
//! - Time and duration formatting
//! - File system helpers (home expansion, line counting)
//! - Byte size conversion

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Time and duration utilities
pub mod time {
    use super::*;

    /// Format duration as human-readable string
    ///
    /// # Arguments
    /// * `duration` - Duration to format
    ///
    /// # Returns
    /// * `String` - Formatted duration (e.g., "1h 30m 45s")
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs == 0 {
            return format!("{}ms", duration.subsec_millis());
        }

        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        let mut parts = Vec::new();
        if hours > 0 {
            parts.push(format!("{hours}h"));
        }
        if minutes > 0 {
            parts.push(format!("{minutes}m"));
        }
        if seconds > 0 || parts.is_empty() {
            parts.push(format!("{seconds}s"));
        }
        parts.join(" ")
    }
}

/// File system utilities
pub mod fs {
    use super::*;
    use std::io::{BufRead, BufReader};

    /// Expand a leading `~` against `home`.
    ///
    /// Pure: the home directory is resolved once by the caller. Paths without
    /// a leading `~`, and every path when `home` is `None`, are returned
    /// unchanged.
    pub fn expand_path(path: &Path, home: Option<&Path>) -> PathBuf {
        let Some(home) = home else {
            return path.to_path_buf();
        };
        match path.strip_prefix("~") {
            Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
            Ok(rest) => home.join(rest),
            Err(_) => path.to_path_buf(),
        }
    }

    /// Count non-blank lines of a text file.
    pub fn count_lines(path: &Path) -> Result<u64> {
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut count = 0;
        for line in reader.lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }
}

pub mod convert {
    /// Format bytes as human-readable size
    ///
    /// # Returns
    /// * `String` - Formatted size (e.g., "1.50 MB")
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Parse human-readable size to bytes ("1024", "512KB", "1.5GB")
    pub fn parse_bytes(s: &str) -> Option<u64> {
        let s = s.trim().to_uppercase();
        let (num_str, unit) = if s.ends_with("TB") {
            (s.trim_end_matches("TB"), 1024u64.pow(4))
        } else if s.ends_with("GB") {
            (s.trim_end_matches("GB"), 1024u64.pow(3))
        } else if s.ends_with("MB") {
            (s.trim_end_matches("MB"), 1024u64.pow(2))
        } else if s.ends_with("KB") {
            (s.trim_end_matches("KB"), 1024u64)
        } else if s.ends_with('B') {
            (s.trim_end_matches('B'), 1)
        } else {
            return s.parse().ok();
        };

        let n = num_str.trim().parse::<f64>().ok()?;
        (n >= 0.0).then(|| (n * unit as f64) as u64)
    }
}
