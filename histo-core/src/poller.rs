// histo-core/src/poller.rs
use std::sync::Arc;
use std::time::Duration;

use histo_common::config::PollSettings;
use histo_common::model::JobState;
use histo_common::remote::RemoteStatusClient;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::reconciler::{PollOutcome, Reconciler};
use crate::registry::JobRef;

/// Spawns and runs the per-key poll loops.
pub struct Poller {
    remote: Arc<dyn RemoteStatusClient>,
    reconciler: Arc<Reconciler>,
    settings: PollSettings,
}

impl Poller {
    pub fn new(
        remote: Arc<dyn RemoteStatusClient>,
        reconciler: Arc<Reconciler>,
        settings: PollSettings,
    ) -> Self {
        Self {
            remote,
            reconciler,
            settings,
        }
    }

    pub(crate) fn spawn(self: &Arc<Self>, entry: JobRef) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move { poller.run(entry).await })
    }

    fn interval_for(&self, state: JobState) -> Duration {
        match state {
            JobState::Paused => self.settings.paused,
            _ => self.settings.active,
        }
    }

    /// Polls until the job is terminal or its token is cancelled. Errors only
    /// lengthen the next sleep; anything not transient is also logged at warn.
    async fn run(&self, entry: JobRef) {
        let key = entry.key().clone();
        let token = entry.cancel_token().clone();
        let mut delay = Duration::ZERO;
        let mut consecutive_failures: u32 = 0;
        debug!("[{}] Poller started", key);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = sleep(delay) => {}
            }
            if entry.is_terminal() {
                break;
            }

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = self.remote.poll(&key) => result,
            };

            match result {
                Ok(status) => {
                    if consecutive_failures > 0 {
                        debug!(
                            "[{}] Poll recovered after {} failure(s)",
                            key, consecutive_failures
                        );
                        consecutive_failures = 0;
                    }
                    trace!("[{}] Poll: {:?}", key, status);
                    let outcome = self.reconciler.apply_poll(&entry, &status).await;
                    entry.mark_settled();
                    delay = match outcome {
                        PollOutcome::Terminal(state) => {
                            debug!("[{}] Job reached {}", key, state);
                            break;
                        }
                        PollOutcome::Retry => self.settings.active,
                        PollOutcome::Continue(state) => self.interval_for(state),
                    };
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if e.is_transient() {
                        debug!(
                            "[{}] Poll failed ({} in a row), retrying: {}",
                            key, consecutive_failures, e
                        );
                    } else {
                        warn!(
                            "[{}] Unexpected poll error ({} in a row), retrying: {}",
                            key, consecutive_failures, e
                        );
                    }
                    delay = self.settings.backoff;
                }
            }
        }
        debug!("[{}] Poller stopped", key);
    }
}
