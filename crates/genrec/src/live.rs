use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use recconfig::RecorderConfig;
use tracing::{debug, info, warn};

use crate::bootstrap::{load_config, Overrides};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Watches the configuration file and reloads it when its modification time
/// changes. Edits that fail to parse or validate are logged and ignored.
pub struct LiveConfig {
    path: PathBuf,
    overrides: Overrides,
    modified: Option<SystemTime>,
    last_poll: Option<Instant>,
    interval: Duration,
    current: RecorderConfig,
}

impl LiveConfig {
    pub fn new(path: PathBuf, overrides: Overrides, current: RecorderConfig) -> Self {
        let modified = modified_time(&path);
        Self {
            path,
            overrides,
            modified,
            last_poll: None,
            interval: POLL_INTERVAL,
            current,
        }
    }

    #[cfg(test)]
    fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> &RecorderConfig {
        &self.current
    }

    /// Rate-limited [`LiveConfig::check`].
    pub fn poll(&mut self, now: Instant) -> Option<RecorderConfig> {
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_poll = Some(now);
        self.check()
    }

    /// Returns the new configuration if the file changed and is valid.
    pub fn check(&mut self) -> Option<RecorderConfig> {
        let modified = modified_time(&self.path);
        if modified == self.modified {
            return None;
        }
        self.modified = modified;

        let config = match load_config(&self.path, &self.overrides) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring config edit: {err:#}");
                return None;
            }
        };

        let changed = self.current.changed_keys(&config);
        if changed.is_empty() {
            debug!(path = %self.path.display(), "config touched without changes");
            return None;
        }
        info!(keys = ?changed, "config reloaded");
        self.current = config.clone();
        Some(config)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
