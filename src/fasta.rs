use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use noodles::fasta;
use noodles::fasta::record::{Definition, Sequence};
use serde::Serialize;
use tracing::info;

use crate::error::SyncError;

/// Residues per sequence line, matching `blastdbcmd -outfmt %f`.
pub const LINE_BASES: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Definition line without the leading `>`.
    pub description: String,
    pub sequence: Vec<u8>,
}

impl FastaRecord {
    pub fn new(description: impl Into<String>, sequence: impl Into<Vec<u8>>) -> Self {
        Self {
            description: description.into(),
            sequence: sequence.into(),
        }
    }

    /// Several headers glued onto one description line.
    pub fn is_composite(&self) -> bool {
        self.description.contains('>')
    }

    fn to_record(&self) -> io::Result<fasta::Record> {
        let definition = format!(">{}", self.description)
            .parse::<Definition>()
            .map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("definition {:?}: {err}", self.description),
                )
            })?;
        Ok(fasta::Record::new(
            definition,
            Sequence::from(self.sequence.clone()),
        ))
    }
}

impl From<&fasta::Record> for FastaRecord {
    fn from(record: &fasta::Record) -> Self {
        let definition = record.definition().to_string();
        let description = definition.strip_prefix('>').unwrap_or(&definition);
        Self::new(description, record.sequence().as_ref().to_vec())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub records_in: usize,
    pub records_out: usize,
    pub composite: usize,
    pub dropped: usize,
}

/// Reads every record. Input must start with a definition line; anything else
/// is an `InvalidData` error.
pub fn read_fasta<R: BufRead>(reader: R) -> io::Result<Vec<FastaRecord>> {
    let mut reader = fasta::io::Reader::new(reader);
    reader
        .records()
        .map(|result| result.map(|record| FastaRecord::from(&record)))
        .collect()
}

pub fn write_fasta<W: Write>(writer: W, records: &[FastaRecord]) -> io::Result<()> {
    let mut writer = fasta::io::writer::Builder::default()
        .set_line_base_count(LINE_BASES)
        .build_from_writer(writer);
    for record in records {
        writer.write_record(&record.to_record()?)?;
    }
    Ok(())
}

/// Dedup key of one header segment: the first word after its last `|`.
pub fn genus_key(segment: &str) -> Option<&str> {
    let tail = match segment.rfind('|') {
        Some(index) => &segment[index + 1..],
        None => segment,
    };
    tail.split_whitespace().next()
}

/// Splits a composite record into one record per `>`-separated header, keeping
/// only the first header seen for each genus key. Every split record carries
/// the same sequence. Plain records, and composites with no non-empty segment,
/// come back unchanged.
pub fn split_composite(record: &FastaRecord) -> Vec<FastaRecord> {
    if !record.is_composite() {
        return vec![record.clone()];
    }
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for segment in record.description.split('>') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if let Some(key) = genus_key(segment) {
            if !seen.insert(key) {
                continue;
            }
        }
        out.push(FastaRecord::new(segment, record.sequence.clone()));
    }
    if out.is_empty() {
        return vec![record.clone()];
    }
    out
}

pub fn repair_records(records: &[FastaRecord]) -> (Vec<FastaRecord>, RepairReport) {
    let mut report = RepairReport {
        records_in: records.len(),
        ..RepairReport::default()
    };
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if record.is_composite() {
            report.composite += 1;
            let segments = record
                .description
                .split('>')
                .filter(|segment| !segment.trim().is_empty())
                .count();
            let split = split_composite(record);
            report.dropped += segments.saturating_sub(split.len());
            out.extend(split);
        } else {
            out.push(record.clone());
        }
    }
    report.records_out = out.len();
    (out, report)
}

/// Rewrites the FASTA file at `path` with every composite record split and
/// deduplicated. Running it again on its own output changes nothing. A file
/// that does not parse as FASTA is left as is and reported as `InvalidFasta`.
pub fn repair_file(path: &Path) -> Result<RepairReport, SyncError> {
    let invalid = |message: String| SyncError::InvalidFasta {
        path: path.to_path_buf(),
        message,
    };
    let file = File::open(path)
        .map_err(|err| SyncError::Filesystem(format!("read {}: {err}", path.display())))?;
    let records = read_fasta(BufReader::new(file)).map_err(|err| invalid(err.to_string()))?;
    let (repaired, report) = repair_records(&records);
    if report.composite == 0 {
        info!("{} has no composite headers", path.display());
        return Ok(report);
    }

    let mut content = Vec::new();
    write_fasta(&mut content, &repaired).map_err(|err| invalid(err.to_string()))?;
    let write_error =
        |err: io::Error| SyncError::Filesystem(format!("write {}: {err}", path.display()));
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::Builder::new()
        .prefix("ncbi16s-sync-fasta")
        .tempfile_in(parent)
        .map_err(write_error)?;
    temp.write_all(&content).map_err(write_error)?;
    temp.persist(path).map_err(|err| write_error(err.error))?;
    info!(
        "repaired {}: {} composite records, {} duplicates dropped",
        path.display(),
        report.composite,
        report.dropped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSITE: &str = "gi|123|ref|X|Genus1 species1>gi|456|ref|Y|Genus1 species2>gi|789|ref|Z|Genus2 species3";

    #[test]
    fn genus_key_takes_word_after_last_pipe() {
        assert_eq!(genus_key("gi|123|ref|X|Genus1 species1"), Some("Genus1"));
        assert_eq!(genus_key("Lonely header"), Some("Lonely"));
        assert_eq!(genus_key("gi|123|"), None);
    }

    #[test]
    fn composite_keeps_first_of_each_genus() {
        let record = FastaRecord::new(COMPOSITE, "ACGTTTGA");
        let split = split_composite(&record);
        assert_eq!(
            split,
            vec![
                FastaRecord::new("gi|123|ref|X|Genus1 species1", "ACGTTTGA"),
                FastaRecord::new("gi|789|ref|Z|Genus2 species3", "ACGTTTGA"),
            ]
        );
    }

    #[test]
    fn plain_record_is_untouched() {
        let record = FastaRecord::new("gi|1|ref|A|Genus species", "ACGT");
        assert_eq!(split_composite(&record), vec![record]);
    }

    #[test]
    fn segments_without_key_are_kept() {
        let record = FastaRecord::new("gi|1|>gi|2|>gi|3|ref|Q|Genus x>", "A");
        let split = split_composite(&record);
        let descriptions: Vec<_> = split.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["gi|1|", "gi|2|", "gi|3|ref|Q|Genus x"]);
    }

    #[test]
    fn composite_of_empty_segments_survives() {
        let record = FastaRecord::new("> >", "ACGT");
        assert_eq!(split_composite(&record), vec![record.clone()]);
        let (out, report) = repair_records(&[record.clone()]);
        assert_eq!(out, vec![record]);
        assert_eq!(report.dropped, 0);
    }

    #[test]
    fn reads_multiline_sequences() {
        let text = ">first desc\nACGT\nAC\n>second\n>third\nGG\n";
        let records = read_fasta(text.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![
                FastaRecord::new("first desc", "ACGTAC"),
                FastaRecord::new("second", ""),
                FastaRecord::new("third", "GG"),
            ]
        );
    }

    #[test]
    fn writes_wrapped_lines() {
        let sequence = "A".repeat(LINE_BASES + 5);
        let mut out = Vec::new();
        write_fasta(&mut out, &[FastaRecord::new("gi|1|ref|A|Genus x", sequence)]).unwrap();
        let expected = format!(
            ">gi|1|ref|A|Genus x\n{}\n{}\n",
            "A".repeat(LINE_BASES),
            "AAAAA"
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn text_before_first_header_is_rejected() {
        assert!(read_fasta("stray\n>a\nAC\n".as_bytes()).is_err());
    }

    #[test]
    fn report_counts_dropped_duplicates() {
        let records = vec![
            FastaRecord::new("gi|9|ref|P|Plain one", "AA"),
            FastaRecord::new(COMPOSITE, "CC"),
        ];
        let (out, report) = repair_records(&records);
        assert_eq!(out.len(), 3);
        assert_eq!(
            report,
            RepairReport {
                records_in: 2,
                records_out: 3,
                composite: 1,
                dropped: 1,
            }
        );
    }
}
