use std::time::Instant;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::checksum::{IntegrityChecker, LocalChecksum};
use crate::error::SyncError;
use crate::ncbi::NcbiClient;
use crate::store::{Snapshot, SnapshotStore};

/// Verification failures allowed in one run. The run turns fatal once the
/// number of failures exceeds `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    failures: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            failures: 0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records one failed verification and reports whether the budget is spent.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.failures > self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedAttemptPolicy {
    #[default]
    Keep,
    Discard,
}

#[derive(Debug, Clone)]
pub struct VerifiedDownload {
    pub snapshot: Snapshot,
    pub downloads: u32,
    pub failed: Vec<Snapshot>,
}

#[derive(Debug)]
enum State {
    Allocate,
    Download(Snapshot),
    Verify(Snapshot),
    Retry(Snapshot),
    Done(Snapshot),
    Fatal(Snapshot),
}

pub struct Fetcher<'a, N: NcbiClient + ?Sized> {
    client: &'a N,
    store: &'a SnapshotStore,
    policy: FailedAttemptPolicy,
}

impl<'a, N: NcbiClient + ?Sized> Fetcher<'a, N> {
    pub fn new(client: &'a N, store: &'a SnapshotStore, policy: FailedAttemptPolicy) -> Self {
        Self {
            client,
            store,
            policy,
        }
    }

    /// Downloads the archive into `snapshot`, replacing whatever sits at the
    /// archive path already.
    pub fn download(&self, snapshot: &Snapshot) -> Result<Utf8PathBuf, SyncError> {
        let destination = snapshot.archive_path();
        let bytes = self.client.download_archive(destination.as_std_path())?;
        info!("retrieved {bytes} bytes, stored in {destination}");
        Ok(destination)
    }

    /// Allocates a new snapshot, downloads into it and verifies it, starting
    /// over in a fresh directory on every mismatch until `budget` runs out.
    pub fn download_with_verification<H: LocalChecksum>(
        &self,
        checker: &IntegrityChecker<H>,
        budget: &mut RetryBudget,
        today: NaiveDate,
        sink: &dyn ProgressSink,
    ) -> Result<VerifiedDownload, SyncError> {
        let mut downloads = 0u32;
        let mut failed = Vec::new();
        let mut state = State::Allocate;
        loop {
            state = match state {
                State::Allocate => State::Download(self.store.allocate_new(today)?),
                State::Download(snapshot) => {
                    sink.event(ProgressEvent {
                        message: format!("phase=Fetch; downloading into {}", snapshot.dir()),
                        elapsed: None,
                    });
                    let start = Instant::now();
                    self.download(&snapshot)?;
                    downloads += 1;
                    sink.event(ProgressEvent {
                        message: format!(
                            "ncbi.response latency_ms={}",
                            start.elapsed().as_millis()
                        ),
                        elapsed: Some(start.elapsed()),
                    });
                    State::Verify(snapshot)
                }
                State::Verify(snapshot) => {
                    sink.event(ProgressEvent {
                        message: "phase=Verify; comparing md5 with upstream".to_string(),
                        elapsed: None,
                    });
                    if checker.is_current(snapshot.archive_path().as_std_path())? {
                        State::Done(snapshot)
                    } else if budget.record_failure() {
                        State::Fatal(snapshot)
                    } else {
                        State::Retry(snapshot)
                    }
                }
                State::Retry(snapshot) => {
                    warn!(
                        "hash doesn't match downloaded file in {}, corrupted? redownloading ({}/{})",
                        snapshot.dir(),
                        budget.failures(),
                        budget.max_attempts()
                    );
                    sink.event(ProgressEvent {
                        message: format!("retry after corrupted download in {}", snapshot.dir()),
                        elapsed: None,
                    });
                    failed.push(snapshot);
                    State::Allocate
                }
                State::Done(snapshot) => {
                    info!("file not corrupted: {}", snapshot.archive_path());
                    self.settle_failed(&failed)?;
                    return Ok(VerifiedDownload {
                        snapshot,
                        downloads,
                        failed,
                    });
                }
                State::Fatal(snapshot) => {
                    failed.push(snapshot);
                    self.settle_failed(&failed)?;
                    error!("can't download database, hash won't match after {downloads} downloads");
                    return Err(SyncError::Integrity {
                        attempts: downloads,
                        directories: failed.iter().map(|s| s.dir().to_string()).collect(),
                        removed: self.policy == FailedAttemptPolicy::Discard,
                    });
                }
            };
        }
    }

    /// Applies the failed-attempt policy once the run is settled. Removal is
    /// deferred so every attempt of the run gets its own directory name.
    fn settle_failed(&self, failed: &[Snapshot]) -> Result<(), SyncError> {
        if self.policy == FailedAttemptPolicy::Keep {
            return Ok(());
        }
        for snapshot in failed {
            info!("removing failed attempt {}", snapshot.dir());
            self.store.remove_snapshot(snapshot)?;
        }
        Ok(())
    }
}
