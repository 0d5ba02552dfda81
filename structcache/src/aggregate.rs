use shared::{BatchFailure, Error, Result};

/// Collects per-key outcomes reported by decode tasks.
///
/// Owned by the batch coordinator; tasks never touch it directly, their
/// reports arrive over a channel and are recorded one at a time.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    decoded: usize,
    failures: Vec<(String, Error)>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.decoded += 1;
    }

    pub fn record_failure(&mut self, key: impl Into<String>, err: Error) {
        self.failures.push((key.into(), err));
    }

    pub fn decoded(&self) -> usize {
        self.decoded
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// The most recently recorded error, if any.
    pub fn last_error(&self) -> Option<&Error> {
        self.failures.last().map(|(_, err)| err)
    }

    /// `Ok(decoded)` when nothing failed, otherwise every failure with the
    /// last one as the headline error.
    pub fn finish(self) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.decoded)
        } else {
            Err(Error::Batch(BatchFailure::new(self.decoded, self.failures)))
        }
    }
}
