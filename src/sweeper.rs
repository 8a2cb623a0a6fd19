// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Periodic ledger cleanup
//!
//! Runs [`SecurityGuard::sweep`] on a named background thread every
//! `interval`. Each ledger takes its own lock for the duration of its
//! cleanup, so sweeps interleave safely with classification.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::guard::SecurityGuard;

/// Handle to a running sweeper; dropping it stops the thread
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stops the thread and waits for an in-flight sweep to finish
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        // Dropping the sender disconnects the channel and wakes the thread
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Starts sweeping `guard` every `interval`
///
/// The first sweep happens one interval after the call.
pub fn spawn(guard: Arc<SecurityGuard>, interval: Duration) -> std::io::Result<SweeperHandle> {
    let (stop_tx, stop_rx) = channel::<()>();

    let thread = thread::Builder::new()
        .name("shellwarden-sweeper".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let summary = guard.sweep();
                    if summary.bans.is_empty()
                        && summary.threat_records == 0
                        && summary.idle_identities == 0
                        && !summary.log_rotated
                    {
                        debug!("Sweep found nothing to remove");
                    } else {
                        info!(
                            expired_bans = summary.bans.expired_bans,
                            stale_violation_records = summary.bans.stale_violation_records,
                            threat_records = summary.threat_records,
                            idle_identities = summary.idle_identities,
                            log_rotated = summary.log_rotated,
                            "Sweep completed"
                        );
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;

    Ok(SweeperHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    })
}
