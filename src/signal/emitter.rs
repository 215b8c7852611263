// =============================================================================
// Signal emitter — idempotent dispatch to configured sinks
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::persistence::SignalStore;

use super::sink::{DeliveryOutcome, Sink};
use super::SignalRecord;

/// Tunables for the retry loop.
#[derive(Debug, Clone, Copy)]
pub struct EmitterConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Final disposition of one signal after the emitter has run it through every
/// sink and exhausted retries where needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Already seen this session or in the persistence layer; not re-sent.
    DuplicateSkipped,
    /// Delivered to every sink.
    Delivered,
    /// Delivered to at least one sink, but not all.
    PartiallyDelivered,
    /// Every sink gave up (permanent failure, or retries exhausted).
    DeadLettered,
}

/// Routes formatted signals to every configured [`Sink`], enforcing the
/// idempotency contract: a given `(plan_id, state, timestamp)` is emitted at
/// most once per process, and (when a [`SignalStore`] is attached) at most
/// once across restarts too.
pub struct Emitter {
    sinks: Vec<Arc<dyn Sink>>,
    store: Option<Arc<SignalStore>>,
    cfg: EmitterConfig,
    seen: Mutex<HashSet<(String, String, String)>>,
    dead_letters: Mutex<Vec<SignalRecord>>,
}

impl Emitter {
    pub fn new(sinks: Vec<Arc<dyn Sink>>, store: Option<Arc<SignalStore>>, cfg: EmitterConfig) -> Self {
        Self {
            sinks,
            store,
            cfg,
            seen: Mutex::new(HashSet::new()),
            dead_letters: Mutex::new(Vec::new()),
        }
    }

    fn dedup_triple(signal: &SignalRecord) -> (String, String, String) {
        (signal.plan_id.clone(), signal.state.clone(), signal.timestamp.to_rfc3339())
    }

    /// Emit one signal through every configured sink. Idempotent: repeated
    /// calls with the same `(plan_id, state, timestamp)` are no-ops.
    pub async fn emit(&self, signal: SignalRecord) -> EmitOutcome {
        let key = Self::dedup_triple(&signal);

        if self.seen.lock().contains(&key) {
            return EmitOutcome::DuplicateSkipped;
        }
        if let Some(store) = &self.store {
            match store.is_duplicate(&signal.plan_id, &signal.state, signal.timestamp) {
                Ok(true) => {
                    self.seen.lock().insert(key);
                    return EmitOutcome::DuplicateSkipped;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "duplicate check against persistence failed, proceeding"),
            }
            if let Err(e) = store.store_signal(&signal) {
                error!(error = %e, plan_id = %signal.plan_id, "failed to persist signal before delivery");
            }
        }

        let mut delivered_count = 0;
        for sink in &self.sinks {
            if self.deliver_with_retry(sink.as_ref(), &signal).await {
                delivered_count += 1;
            }
        }

        self.seen.lock().insert(key);

        if self.sinks.is_empty() || delivered_count == self.sinks.len() {
            info!(plan_id = %signal.plan_id, state = %signal.state, "signal delivered");
            EmitOutcome::Delivered
        } else if delivered_count > 0 {
            EmitOutcome::PartiallyDelivered
        } else {
            self.dead_letters.lock().push(signal);
            EmitOutcome::DeadLettered
        }
    }

    async fn deliver_with_retry(&self, sink: &dyn Sink, signal: &SignalRecord) -> bool {
        let mut attempt = 0;
        loop {
            let outcomes = sink.deliver(std::slice::from_ref(signal)).await;
            match outcomes.into_iter().next() {
                Some(DeliveryOutcome::Success) => return true,
                Some(DeliveryOutcome::Permanent(reason)) => {
                    error!(plan_id = %signal.plan_id, reason, "permanent delivery failure, not retrying");
                    return false;
                }
                Some(DeliveryOutcome::Retryable(reason)) => {
                    if attempt >= self.cfg.max_retries {
                        error!(plan_id = %signal.plan_id, reason, attempts = attempt + 1, "delivery retries exhausted");
                        return false;
                    }
                    warn!(plan_id = %signal.plan_id, reason, attempt, "delivery attempt failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.cfg.retry_delay).await;
                }
                None => return false,
            }
        }
    }

    /// Signals that exhausted every sink's retries or hit a permanent error
    /// on all sinks. Operators drain this for manual inspection/replay.
    pub fn drain_dead_letters(&self) -> Vec<SignalRecord> {
        std::mem::take(&mut self.dead_letters.lock())
    }

    /// Clear every in-memory dedup key belonging to `plan_id`. Called when a
    /// plan is removed so a later plan re-admitted under the same id is not
    /// silently deduplicated against its predecessor's emissions.
    pub fn forget_plan(&self, plan_id: &str) {
        self.seen.lock().retain(|(id, _, _)| id != plan_id);
    }
}
