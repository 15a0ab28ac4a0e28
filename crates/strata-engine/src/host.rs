use strata_core::Cancelled;

/// How queries behave while the host is in dumb mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumbModePolicy {
    /// Block until the host reports smart mode.
    WaitForSmart,
    /// Fail the query with `NotReady`.
    Fail,
}

/// Hooks the engine needs from its embedder.
///
/// The default implementations describe a host that is never dumb, never
/// cancels, and ignores notifications; tests and simple embedders can use
/// [`DefaultHost`] as-is.
pub trait IndexHost: Send + Sync {
    /// Whether indices may currently be incomplete (host-signaled).
    fn is_dumb(&self) -> bool {
        false
    }

    fn dumb_mode_policy(&self) -> DumbModePolicy {
        DumbModePolicy::Fail
    }

    /// Blocks until smart mode; only called when the policy says to wait.
    fn wait_for_smart_mode(&self) {}

    /// Polled by long-running loops; a `Cancelled` return aborts the loop
    /// non-fatally (scheduled files stay scheduled).
    fn check_canceled(&self) -> Result<(), Cancelled> {
        Ok(())
    }

    /// Gates the periodic flush: while a heavy process runs, flushing would
    /// compete with it for IO.
    fn is_heavy_process_running(&self) -> bool {
        false
    }

    /// Human-readable startup notification ("corrupted", "format changed").
    fn notify_rebuild(&self, message: &str) {
        let _ = message;
    }

    /// Invoked after a successful index wipe so the host can enqueue a
    /// background re-scan of project files.
    fn schedule_index_rescan(&self) {}
}

/// Host with all default behaviors.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHost;

impl IndexHost for DefaultHost {}
