/// Snapshot watch state and the size-based change detector.
///
/// Detection opens the file read-only and seeks to the end; it never reads
/// content. A size change is treated as "changed". Edits that preserve the
/// byte size are not detected.
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Minimum spacing, in display-clock seconds, between two completed reloads.
pub const RELOAD_COOLDOWN_SECS: f64 = 1.0;

/// Everything the scheduler tracks about the watched file.
#[derive(Debug, Clone)]
pub struct WatchState {
    /// Snapshot file being watched. Fixed at startup.
    pub path: PathBuf,
    /// Size at the last successful read. `None` until the baseline is taken.
    pub last_known_size: Option<u64>,
    pub last_check_time: f64,
    pub last_reload_time: f64,
    pub check_interval_secs: u64,
    pub reload_cooldown_secs: f64,
    pub debug: bool,
}

impl WatchState {
    pub fn new(path: impl Into<PathBuf>, check_interval_secs: u64, debug: bool) -> Self {
        Self {
            path: path.into(),
            last_known_size: None,
            last_check_time: 0.0,
            last_reload_time: 0.0,
            check_interval_secs,
            reload_cooldown_secs: RELOAD_COOLDOWN_SECS,
            debug,
        }
    }

    /// Has the file plausibly changed since the last successful check?
    ///
    /// The first successful observation only records the baseline. An
    /// unopenable file means "no new information" and leaves the baseline
    /// alone.
    pub fn detect(&mut self) -> bool {
        let size = match probe_size(&self.path) {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    path = %self.path.display(),
                    "cannot open snapshot"
                );
                return false;
            }
        };

        match self.last_known_size {
            None => {
                self.last_known_size = Some(size);
                tracing::debug!(bytes = size, "initial snapshot size");
                false
            }
            Some(previous) if previous != size => {
                tracing::debug!(from = previous, to = size, "snapshot size changed");
                self.last_known_size = Some(size);
                true
            }
            Some(_) => false,
        }
    }

    /// Is a check due at `now`?
    pub fn check_due(&self, now: f64) -> bool {
        now - self.last_check_time >= self.check_interval_secs as f64
    }

    /// Has the cooldown since the last successful reload elapsed at `now`?
    pub fn cooldown_elapsed(&self, now: f64) -> bool {
        now - self.last_reload_time >= self.reload_cooldown_secs
    }
}

fn probe_size(path: &Path) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_bytes(path: &Path, n: usize) {
        std::fs::write(path, vec![b'x'; n]).unwrap();
    }

    #[test]
    fn test_first_observation_is_baseline_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump");
        for size in [0, 1, 4096] {
            write_bytes(&path, size);
            let mut state = WatchState::new(&path, 2, false);
            assert!(!state.detect());
            assert_eq!(state.last_known_size, Some(size as u64));
        }
    }

    #[test]
    fn test_size_sequence_scenario() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump");
        let mut state = WatchState::new(&path, 2, false);

        let mut seen = Vec::new();
        for size in [100, 100, 250] {
            write_bytes(&path, size);
            seen.push(state.detect());
        }
        assert_eq!(seen, vec![false, false, true]);
        assert_eq!(state.last_known_size, Some(250));
    }

    #[test]
    fn test_shrinking_file_counts_as_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump");
        let mut state = WatchState::new(&path, 2, false);

        write_bytes(&path, 500);
        assert!(!state.detect());
        write_bytes(&path, 20);
        assert!(state.detect());
        assert_eq!(state.last_known_size, Some(20));
    }

    #[test]
    fn test_change_compares_against_latest_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump");
        let mut state = WatchState::new(&path, 2, false);

        write_bytes(&path, 10);
        state.detect();
        write_bytes(&path, 20);
        assert!(state.detect());
        // Same size as the last observation, not the baseline
        assert!(!state.detect());
    }

    #[test]
    fn test_same_size_rewrite_is_not_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump");
        let mut state = WatchState::new(&path, 2, false);

        std::fs::write(&path, b"aaaa").unwrap();
        state.detect();
        std::fs::write(&path, b"bbbb").unwrap();
        assert!(!state.detect());
    }

    #[test]
    fn test_missing_file_leaves_baseline_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump");
        let mut state = WatchState::new(&path, 2, false);

        assert!(!state.detect());
        assert_eq!(state.last_known_size, None);

        write_bytes(&path, 64);
        assert!(!state.detect());
        std::fs::remove_file(&path).unwrap();
        assert!(!state.detect());
        assert_eq!(state.last_known_size, Some(64));

        // Reappearing with a different size is a change
        write_bytes(&path, 65);
        assert!(state.detect());
    }

    #[test]
    fn test_check_due_and_cooldown() {
        let mut state = WatchState::new("dump", 2, false);
        state.last_check_time = 10.0;
        assert!(!state.check_due(11.9));
        assert!(state.check_due(12.0));

        state.last_reload_time = 10.0;
        assert!(!state.cooldown_elapsed(10.3));
        assert!(state.cooldown_elapsed(11.0));
    }

    #[test]
    fn test_zero_interval_checks_every_time() {
        let mut state = WatchState::new("dump", 0, false);
        state.last_check_time = 5.0;
        assert!(state.check_due(5.0));
    }
}
