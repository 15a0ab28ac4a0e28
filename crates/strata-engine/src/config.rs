use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide settings.
#[derive(Clone, Debug)]
pub struct IndexingConfig {
    /// Files larger than this are never content-indexed unless an extension
    /// exempts them.
    pub max_file_size: u64,
    /// Roots that are never indexable (configuration/system directories).
    pub excluded_roots: Vec<PathBuf>,
    /// Tick interval of the quiescence-gated flush daemon.
    pub flush_interval: Duration,
    /// Whether to run the background flush daemon at all.
    pub flush_daemon: bool,
    /// Whether startup rebuilds produce a host notification.
    pub show_rebuild_notifications: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            excluded_roots: Vec::new(),
            flush_interval: Duration::from_secs(5),
            flush_daemon: true,
            show_rebuild_notifications: true,
        }
    }
}
