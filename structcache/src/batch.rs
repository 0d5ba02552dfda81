use crate::aggregate::ErrorAggregator;
use crate::codec::Codec;
use crate::domain::{BatchRequest, DecodeFn, DecodeTarget};
use crate::ports::Transport;
use bytes::Bytes;
use shared::config::Config;
use shared::{Error, Result, validate_key};
use std::collections::HashSet;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Counts for a batch fetch that completed without errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub requested: usize,
    pub found: usize,
    pub decoded: usize,
}

/// Sent by a decode task when it is done, carrying the new value on success.
struct DecodeReport {
    key: String,
    outcome: Result<Box<dyn DecodeTarget>>,
}

/// Fetches many keys with one `get_multi` and decodes the payloads on
/// blocking threads, at most `workers` at a time.
///
/// Targets never leave the request. Each decode task builds a fresh value of
/// its target's type and sends it back over a channel, and the coordinating
/// task swaps it in. The request is therefore only written by the
/// coordinator, and a dropped fetch leaves every key in place. The call
/// returns once every dispatched task has reported.
#[derive(Clone)]
pub struct BatchFetchDecoder {
    transport: Arc<dyn Transport>,
    codec: Codec,
    workers: usize,
    deadline: Option<Duration>,
}

impl BatchFetchDecoder {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            transport,
            codec: Codec::new(config.max_value_bytes),
            workers: config.decode_workers.max(1),
            deadline: config.decode_deadline,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Populate every target in `request` whose key is present in the cache.
    ///
    /// Missing keys are not an error. If any payload fails to decode, the
    /// other targets are still populated and the error lists every failed
    /// key, with the last one received as the headline.
    pub async fn fetch(&self, request: &mut BatchRequest) -> Result<BatchSummary> {
        request.reset_populated();
        if request.is_empty() {
            return Ok(BatchSummary::default());
        }

        let keys: Vec<String> = request.keys().map(str::to_string).collect();
        for key in &keys {
            validate_key(key)?;
        }

        debug!("Fetching {} key(s) in one round trip", keys.len());
        let fetched = match self.transport.get_multi(&keys).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Multi-get for {} key(s) failed: {}", keys.len(), e);
                return Err(e);
            }
        };

        let mut summary = BatchSummary {
            requested: keys.len(),
            ..BatchSummary::default()
        };
        let gate = Arc::new(Semaphore::new(self.workers));
        let admit_by = self.deadline.map(|d| Instant::now() + d);
        let (tx, mut rx) = mpsc::unbounded_channel::<DecodeReport>();
        let mut aggregator = ErrorAggregator::new();
        let mut in_flight: HashSet<String> = HashSet::with_capacity(fetched.len());

        for (key, payload) in fetched {
            let Some(decode) = request.decoder_for(&key) else {
                warn!("Multi-get returned unrequested key '{}', ignoring", key);
                continue;
            };
            summary.found += 1;

            let permit = match admit(&gate, admit_by, &key).await {
                Ok(permit) => permit,
                Err(err) => {
                    aggregator.record_failure(key, err);
                    continue;
                }
            };

            in_flight.insert(key.clone());
            self.dispatch(key, decode, payload, permit, tx.clone());
        }
        drop(tx);

        debug!(
            "Dispatched {} decode task(s) for {} found key(s)",
            in_flight.len(),
            summary.found
        );

        while !in_flight.is_empty() {
            let Some(DecodeReport { key, outcome }) = rx.recv().await else {
                break;
            };
            in_flight.remove(&key);

            match outcome {
                Ok(target) => {
                    request.replace_decoded(key, target);
                    aggregator.record_success();
                }
                Err(err) => {
                    debug!("Decode failed for key '{}': {}", key, err);
                    aggregator.record_failure(key, err);
                }
            }
        }

        // Only reachable if the runtime dropped a task before it ran
        for key in in_flight {
            warn!("Decode task for key '{}' ended without reporting", key);
            let err = Error::Internal(format!("decode task for key '{}' aborted", key));
            aggregator.record_failure(key, err);
        }

        summary.decoded = aggregator.decoded();
        match aggregator.finish() {
            Ok(_) => Ok(summary),
            Err(e) => {
                warn!("Batch fetch of {} key(s) finished with errors: {}", summary.requested, e);
                Err(e)
            }
        }
    }

    fn dispatch(
        &self,
        key: String,
        decode: DecodeFn,
        payload: Bytes,
        permit: OwnedSemaphorePermit,
        tx: mpsc::UnboundedSender<DecodeReport>,
    ) {
        let codec = self.codec;
        tokio::task::spawn_blocking(move || {
            let decoded = panic::catch_unwind(AssertUnwindSafe(|| decode(&codec, &payload)));
            drop(permit);

            let outcome = match decoded {
                Ok(Ok(target)) => Ok(target),
                Ok(Err(e)) => Err(Error::Decode {
                    key: key.clone(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(Error::Internal(format!("decoding key '{}' panicked", key))),
            };
            // The coordinator only goes away if the caller dropped the fetch
            let _ = tx.send(DecodeReport { key, outcome });
        });
    }
}

/// Wait for a free decode slot, giving up once `admit_by` has passed.
async fn admit(
    gate: &Arc<Semaphore>,
    admit_by: Option<Instant>,
    key: &str,
) -> Result<OwnedSemaphorePermit> {
    let acquired = match admit_by {
        Some(deadline) if Instant::now() >= deadline => {
            return Err(Error::DeadlineExceeded(key.to_string()));
        }
        Some(deadline) => tokio::time::timeout_at(deadline, gate.clone().acquire_owned())
            .await
            .map_err(|_| Error::DeadlineExceeded(key.to_string()))?,
        None => gate.clone().acquire_owned().await,
    };
    acquired.map_err(|e| Error::Internal(format!("decode gate closed: {}", e)))
}

impl Debug for BatchFetchDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchFetchDecoder")
            .field("codec", &self.codec)
            .field("workers", &self.workers)
            .field("deadline", &self.deadline)
            .finish()
    }
}
