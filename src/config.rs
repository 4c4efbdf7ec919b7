use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// File name of the journal inside `data_dir`.
pub const JOURNAL_FILE: &str = "beds.wal";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Appends since the last compaction before the compactor rewrites the journal.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
    /// JSON export of the store of record, used when the journal is empty.
    pub seed_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
            seed_path: None,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("BEDQ_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            compact_threshold: parsed(&lookup, "BEDQ_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed::<u64>(&lookup, "BEDQ_COMPACT_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map_or(defaults.compact_interval, Duration::from_secs),
            metrics_port: parsed(&lookup, "BEDQ_METRICS_PORT"),
            seed_path: lookup("BEDQ_SEED_PATH").map(PathBuf::from),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE)
    }
}
