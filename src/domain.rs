use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const ARCHIVE_URL: &str = "https://ftp.ncbi.nlm.nih.gov/blast/db/16SMicrobial.tar.gz";
pub const CHECKSUM_URL: &str = "https://ftp.ncbi.nlm.nih.gov/blast/db/16SMicrobial.tar.gz.md5";
pub const ARCHIVE_NAME: &str = "16SMicrobial.tar.gz";
pub const DATABASE_NAME: &str = "16SMicrobial";
pub const FASTA_NAME: &str = "16SMicrobial.fasta";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

static DATE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?::(\d+))?$").unwrap());

/// Name of a snapshot directory: `YYYY-MM-DD`, or `YYYY-MM-DD:N` when several
/// snapshots were taken on the same calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTag {
    year: i32,
    month: u32,
    day: u32,
    disambiguator: u32,
}

impl DateTag {
    pub fn new(date: NaiveDate, disambiguator: u32) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            disambiguator,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn disambiguator(&self) -> u32 {
        self.disambiguator
    }

    pub fn same_day(&self, other: &DateTag) -> bool {
        (self.year, self.month, self.day) == (other.year, other.month, other.day)
    }

    pub fn with_disambiguator(self, disambiguator: u32) -> Self {
        Self {
            disambiguator,
            ..self
        }
    }
}

impl fmt::Display for DateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        if self.disambiguator > 0 {
            write!(f, ":{}", self.disambiguator)?;
        }
        Ok(())
    }
}

impl FromStr for DateTag {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || SyncError::InvalidDateTag(value.to_string());
        let caps = DATE_TAG_RE.captures(value).ok_or_else(invalid)?;
        let year = caps[1].parse::<i32>().map_err(|_| invalid())?;
        let month = caps[2].parse::<u32>().map_err(|_| invalid())?;
        let day = caps[3].parse::<u32>().map_err(|_| invalid())?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
        let disambiguator = match caps.get(4) {
            Some(m) => m.as_str().parse::<u32>().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self::new(date, disambiguator))
    }
}

impl Serialize for DateTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Hex digest token taken from a checksum listing such as `md5sum` output or
/// the upstream `.md5` file. Anything after the first token is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChecksumRecord(String);

impl ChecksumRecord {
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        text.split_whitespace()
            .next()
            .map(|token| Self(token.to_string()))
            .ok_or_else(|| SyncError::InvalidChecksum(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChecksumRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumBackend {
    #[default]
    Builtin,
    Md5sum,
}

impl fmt::Display for ChecksumBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumBackend::Builtin => write!(f, "builtin"),
            ChecksumBackend::Md5sum => write!(f, "md5sum"),
        }
    }
}

pub fn newest<'a>(tags: impl IntoIterator<Item = &'a DateTag>) -> Option<DateTag> {
    tags.into_iter().copied().max()
}
