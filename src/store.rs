use std::collections::BTreeSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{ARCHIVE_NAME, DATABASE_NAME, DateTag, FASTA_NAME};
use crate::error::SyncError;

/// Directory tree holding one subdirectory per downloaded snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    tag: DateTag,
    dir: Utf8PathBuf,
}

impl Snapshot {
    pub fn tag(&self) -> DateTag {
        self.tag
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn archive_path(&self) -> Utf8PathBuf {
        self.dir.join(ARCHIVE_NAME)
    }

    pub fn database_prefix(&self) -> Utf8PathBuf {
        self.dir.join(DATABASE_NAME)
    }

    pub fn fasta_path(&self) -> Utf8PathBuf {
        self.dir.join(FASTA_NAME)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub tag: Option<DateTag>,
    pub has_archive: bool,
    pub entries: usize,
    pub has_fasta: bool,
}

impl SnapshotStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), SyncError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))
    }

    pub fn snapshot(&self, tag: DateTag) -> Snapshot {
        Snapshot {
            tag,
            dir: self.root.join(tag.to_string()),
        }
    }

    /// Newest snapshot directory that contains `required_file`. Unparsable names
    /// and directories missing the file are skipped with a warning. The returned
    /// snapshot points at the directory as spelled on disk (`:01`, `:0`).
    pub fn find_newest(&self, required_file: &str) -> Result<Option<Snapshot>, SyncError> {
        self.ensure_root()?;
        let mut newest: Option<(DateTag, String)> = None;
        for name in self.subdirectory_names()? {
            let tag = match name.parse::<DateTag>() {
                Ok(tag) => tag,
                Err(err) => {
                    warn!("skipping {}: {err}", self.root.join(&name));
                    continue;
                }
            };
            if !self.root.join(&name).join(required_file).as_std_path().is_file() {
                warn!(
                    "skipping snapshot {}: missing {required_file}",
                    self.root.join(&name)
                );
                continue;
            }
            let candidate = (tag, name);
            if newest.as_ref().is_none_or(|current| candidate > *current) {
                newest = Some(candidate);
            }
        }
        Ok(newest.map(|(tag, name)| Snapshot {
            tag,
            dir: self.root.join(name),
        }))
    }

    /// Creates a fresh snapshot directory for `today`, using the lowest
    /// disambiguator not already taken on that day.
    pub fn allocate_new(&self, today: NaiveDate) -> Result<Snapshot, SyncError> {
        self.ensure_root()?;
        let base = DateTag::new(today, 0);
        let taken = self
            .entry_names()?
            .iter()
            .filter_map(|name| name.parse::<DateTag>().ok())
            .filter(|tag| tag.same_day(&base))
            .map(|tag| tag.disambiguator())
            .collect::<BTreeSet<_>>();

        let mut disambiguator = 0u32;
        loop {
            if taken.contains(&disambiguator) {
                disambiguator += 1;
                continue;
            }
            let snapshot = self.snapshot(base.with_disambiguator(disambiguator));
            match fs::create_dir(snapshot.dir.as_std_path()) {
                Ok(()) => {
                    debug!("allocated snapshot directory {}", snapshot.dir);
                    return Ok(snapshot);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    disambiguator += 1;
                }
                Err(err) => {
                    return Err(SyncError::Filesystem(format!(
                        "create {}: {err}",
                        snapshot.dir
                    )));
                }
            }
        }
    }

    pub fn remove_snapshot(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        if snapshot.dir.as_std_path().exists() {
            fs::remove_dir_all(snapshot.dir.as_std_path())
                .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<SnapshotEntry>, SyncError> {
        self.ensure_root()?;
        let mut items = Vec::new();
        for name in self.subdirectory_names()? {
            let dir = self.root.join(&name);
            let entries = fs::read_dir(dir.as_std_path())
                .map_err(|err| SyncError::Filesystem(err.to_string()))?
                .count();
            items.push(SnapshotEntry {
                tag: name.parse().ok(),
                has_archive: dir.join(ARCHIVE_NAME).as_std_path().is_file(),
                has_fasta: dir.join(FASTA_NAME).as_std_path().is_file(),
                entries,
                name,
            });
        }
        items.sort_by(|a, b| a.tag.cmp(&b.tag).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    fn subdirectory_names(&self) -> Result<Vec<String>, SyncError> {
        let mut names = Vec::new();
        for entry in self.read_root()? {
            let entry = entry.map_err(|err| SyncError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("skipping non-UTF-8 entry {raw:?} in {}", self.root),
            }
        }
        Ok(names)
    }

    fn entry_names(&self) -> Result<Vec<String>, SyncError> {
        let mut names = Vec::new();
        for entry in self.read_root()? {
            let entry = entry.map_err(|err| SyncError::Filesystem(err.to_string()))?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn read_root(&self) -> Result<fs::ReadDir, SyncError> {
        fs::read_dir(self.root.as_std_path())
            .map_err(|err| SyncError::Filesystem(format!("read {}: {err}", self.root)))
    }
}
