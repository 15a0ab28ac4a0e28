use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as channel;

use crate::registry::IndexRegistry;

/// Periodic quiescence-gated flusher.
///
/// On every tick, indices are flushed only when the global modification
/// counter has not advanced since the previous tick, so bursts of updates
/// batch together instead of fighting the writers for IO. The heavy-process
/// gate is checked inside [`IndexRegistry::flush_all`].
pub(crate) struct FlushDaemon {
    stop: channel::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl FlushDaemon {
    pub fn start(registry: Arc<IndexRegistry>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let thread = std::thread::Builder::new()
            .name("strata-flush".to_string())
            .spawn(move || {
                let tick = channel::tick(interval);
                let mut last_seen = registry.mod_count();
                loop {
                    channel::select! {
                        recv(stop_rx) -> _ => break,
                        recv(tick) -> _ => {
                            let current = registry.mod_count();
                            if current == last_seen {
                                registry.flush_all(current);
                            }
                            last_seen = current;
                        }
                    }
                }
            })
            .expect("failed to spawn flush daemon thread");

        Self {
            stop: stop_tx,
            thread: Some(thread),
        }
    }
}

impl Drop for FlushDaemon {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::debug!(
                    target = "strata.engine",
                    "flush daemon thread panicked (best effort join)"
                );
            }
        }
    }
}
