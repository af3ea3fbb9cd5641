use assert_matches::assert_matches;

use ncbi16s_sync::domain::{ChecksumRecord, DateTag, newest};
use ncbi16s_sync::error::SyncError;

#[test]
fn date_tags_round_trip_through_directory_names() {
    for name in ["2023-01-01", "2023-01-01:1", "2023-01-01:12", "1999-12-31"] {
        let tag: DateTag = name.parse().unwrap();
        assert_eq!(tag.to_string(), name);
    }
}

#[test]
fn same_day_tags_order_by_disambiguator() {
    let tags: Vec<DateTag> = ["2023-01-01", "2023-01-01:10", "2023-01-01:2", "2022-12-31:7"]
        .iter()
        .map(|name| name.parse().unwrap())
        .collect();
    assert_eq!(newest(&tags).unwrap().to_string(), "2023-01-01:10");
}

#[test]
fn rejects_names_that_are_not_dates() {
    for name in ["not-a-date", "2023-13-01", "2023-02-30", "2023-1-1", "2023-01-01:x", ""] {
        assert_matches!(name.parse::<DateTag>(), Err(SyncError::InvalidDateTag(_)));
    }
}

#[test]
fn checksum_listing_keeps_only_the_digest() {
    let record =
        ChecksumRecord::parse("0f343b0931126a20f133d67c2b018a3b  16SMicrobial.tar.gz\n").unwrap();
    assert_eq!(record.as_str(), "0f343b0931126a20f133d67c2b018a3b");
    assert_matches!(
        ChecksumRecord::parse("  \n"),
        Err(SyncError::InvalidChecksum(_))
    );
}
