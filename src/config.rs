use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_COMPACT_INTERVAL_SECS: u64 = 60;
const WAL_FILE_NAME: &str = "schedules.wal";

/// Runtime settings, read from `CLASSGRID_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Compact once this many events have been appended since the last compaction.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS),
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("CLASSGRID_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: lookup("CLASSGRID_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            compact_interval: lookup("CLASSGRID_COMPACT_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            metrics_port: lookup("CLASSGRID_METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.wal_path(), PathBuf::from("./data/schedules.wal"));
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CLASSGRID_DATA_DIR", "/var/lib/classgrid"),
            ("CLASSGRID_COMPACT_THRESHOLD", "50"),
            ("CLASSGRID_COMPACT_INTERVAL_SECS", "soon"),
            ("CLASSGRID_METRICS_PORT", "9100"),
        ]);
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/classgrid"));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.compact_interval, Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS));
        assert_eq!(config.metrics_port, Some(9100));
    }
}
