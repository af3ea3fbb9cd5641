use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::archive::{self, ExpandOutcome};
use crate::blastdb::{self, DumpTool};
use crate::checksum::{IntegrityChecker, LocalChecksum};
use crate::domain::{ARCHIVE_NAME, ChecksumRecord, DateTag};
use crate::error::SyncError;
use crate::fasta::{self, RepairReport};
use crate::fetcher::{FailedAttemptPolicy, Fetcher, RetryBudget};
use crate::ncbi::NcbiClient;
use crate::store::{Snapshot, SnapshotEntry, SnapshotStore};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub max_attempts: u32,
    pub failed_attempts: FailedAttemptPolicy,
    pub skip_dump: bool,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    UpToDate,
    Downloaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub action: SyncAction,
    pub snapshot: DateTag,
    pub snapshot_dir: String,
    pub upstream_md5: ChecksumRecord,
    pub downloads: u32,
    pub failed_attempts: Vec<String>,
    pub expanded: bool,
    pub fasta: Option<String>,
    pub repair: Option<RepairReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub snapshot: Option<DateTag>,
    pub snapshot_dir: Option<String>,
    pub upstream_md5: ChecksumRecord,
    pub local_md5: Option<ChecksumRecord>,
    pub up_to_date: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub root: String,
    pub snapshots: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairResult {
    pub path: String,
    pub report: RepairReport,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Sync,
    Status,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn phase(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

pub struct App<N: NcbiClient, H: LocalChecksum, D: DumpTool> {
    store: SnapshotStore,
    ncbi: N,
    hasher: H,
    dump: D,
}

impl<N: NcbiClient, H: LocalChecksum + Clone, D: DumpTool> App<N, H, D> {
    pub fn new(store: SnapshotStore, ncbi: N, hasher: H, dump: D) -> Self {
        Self {
            store,
            ncbi,
            hasher,
            dump,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn ncbi(&self) -> &N {
        &self.ncbi
    }

    /// Brings the newest snapshot up to date with upstream, expands it and
    /// exports a repaired FASTA from it.
    pub fn sync(
        &self,
        options: SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, SyncError> {
        phase(sink, "phase=Resolve; fetching upstream md5".to_string());
        sink.event(ProgressEvent {
            message: "ncbi.request".to_string(),
            elapsed: None,
        });
        let checker = IntegrityChecker::fetch(&self.ncbi, self.hasher.clone())?;
        let mut budget = RetryBudget::new(options.max_attempts);

        phase(sink, "phase=Resolve; scanning local snapshots".to_string());
        let current = match self.store.find_newest(ARCHIVE_NAME)? {
            Some(snapshot) => {
                info!("checking local snapshot {}", snapshot.dir());
                phase(
                    sink,
                    format!("phase=Verify; comparing {} with upstream", snapshot.tag()),
                );
                if checker.is_current(snapshot.archive_path().as_std_path())? {
                    info!("up to date");
                    Some(snapshot)
                } else {
                    info!("not up to date, downloading new database");
                    None
                }
            }
            None => {
                info!("can't find a local database");
                None
            }
        };

        let (action, snapshot, downloads, failed) = match current {
            Some(snapshot) => (SyncAction::UpToDate, snapshot, 0, Vec::new()),
            None => {
                let fetcher = Fetcher::new(&self.ncbi, &self.store, options.failed_attempts);
                sink.event(ProgressEvent {
                    message: "ncbi.request".to_string(),
                    elapsed: None,
                });
                let verified = fetcher.download_with_verification(
                    &checker,
                    &mut budget,
                    options.today,
                    sink,
                )?;
                (
                    SyncAction::Downloaded,
                    verified.snapshot,
                    verified.downloads,
                    verified.failed,
                )
            }
        };

        phase(sink, format!("phase=Expand; {}", snapshot.dir()));
        let expanded = matches!(
            archive::expand(snapshot.dir().as_std_path(), ARCHIVE_NAME)?,
            ExpandOutcome::Expanded { .. }
        );

        let (fasta, repair) = if options.skip_dump {
            info!("skipping FASTA export");
            (None, None)
        } else {
            let (path, report) = self.export_fasta(&snapshot, sink)?;
            (Some(path.to_string()), Some(report))
        };

        info!("completed");
        Ok(SyncResult {
            action,
            snapshot: snapshot.tag(),
            snapshot_dir: snapshot.dir().to_string(),
            upstream_md5: checker.remote().clone(),
            downloads,
            failed_attempts: failed.iter().map(|s| s.dir().to_string()).collect(),
            expanded,
            fasta,
            repair,
        })
    }

    /// Reports whether the newest snapshot matches upstream without downloading.
    pub fn status(&self, sink: &dyn ProgressSink) -> Result<StatusResult, SyncError> {
        phase(sink, "phase=Resolve; fetching upstream md5".to_string());
        let checker = IntegrityChecker::fetch(&self.ncbi, self.hasher.clone())?;
        let newest = self.store.find_newest(ARCHIVE_NAME)?;
        let Some(snapshot) = newest else {
            return Ok(StatusResult {
                snapshot: None,
                snapshot_dir: None,
                upstream_md5: checker.remote().clone(),
                local_md5: None,
                up_to_date: false,
            });
        };
        phase(sink, format!("phase=Verify; hashing {}", snapshot.archive_path()));
        let local = checker.compute_local(snapshot.archive_path().as_std_path())?;
        Ok(StatusResult {
            snapshot: Some(snapshot.tag()),
            snapshot_dir: Some(snapshot.dir().to_string()),
            up_to_date: &local == checker.remote(),
            upstream_md5: checker.remote().clone(),
            local_md5: Some(local),
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, SyncError> {
        phase(sink, "phase=Resolve; scanning snapshots".to_string());
        Ok(ListResult {
            root: self.store.root().to_string(),
            snapshots: self.store.list()?,
        })
    }

    fn export_fasta(
        &self,
        snapshot: &Snapshot,
        sink: &dyn ProgressSink,
    ) -> Result<(Utf8PathBuf, RepairReport), SyncError> {
        let output = snapshot.fasta_path();
        if blastdb::ensure_dump_output(output.as_std_path()).is_ok() {
            info!("{output} already exported");
        } else {
            phase(sink, format!("phase=Dump; writing {output}"));
            let database = snapshot.database_prefix();
            self.dump
                .dump_fasta(database.as_std_path(), output.as_std_path())?;
        }
        phase(sink, format!("phase=Repair; {output}"));
        let report = fasta::repair_file(output.as_std_path())?;
        Ok((output, report))
    }
}
