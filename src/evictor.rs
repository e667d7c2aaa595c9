//! The generic periodic-task scheduler behind the evictor.
//!
//! spec.md §4.6 describes *what* a tick does; this module only owns *when*
//! a tick runs. Grounded on the teacher's preference for channel-based
//! worker loops over raw `thread::sleep` polling (the monorepo's
//! `crates/*/src/manager/mod.rs` background-task patterns), adapted from
//! `tokio::time::interval` + a shutdown channel to `crossbeam_channel::tick`
//! + `select!` since this crate's core is deliberately `std::thread`-based
//! (spec.md §5: "real preemptive threads, not cooperative tasks").

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, select};

/// Handle to a running periodic task. Dropping this without calling
/// [`Evictor::stop`] leaves the background thread running; callers that want
/// a join should call `stop` explicitly (this is what [`crate::pool::KeyedPool::close`]
/// does).
pub struct Evictor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Evictor {
    /// Spawn a thread that calls `tick` every `period`, until `tick` returns
    /// `false` or [`Evictor::stop`] is called. The tick closure must not
    /// block indefinitely — it runs on the evictor's own thread and a slow
    /// tick simply delays the next one, matching spec.md §4.6's "evictor
    /// itself must never die" but making no liveness promise about individual
    /// tick latency.
    ///
    /// Fails only if the OS refuses to spawn the thread (e.g. resource
    /// exhaustion); propagated rather than panicking, matching the pool's
    /// own always-return-a-`Result` discipline.
    pub fn spawn<F>(period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("keyed-pool-evictor".to_owned())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if !tick() {
                                break;
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the background thread to stop and join it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            drop(tx);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Evictor {
    fn drop(&mut self) {
        self.stop();
    }
}
