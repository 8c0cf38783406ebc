//! Bootstrap table decoding for bootstrap-indexed delivery.
//!
//! The blob is an `abst` box holding one `asrt` (segment run table) and one
//! `afrt` (fragment run table). Fragment run records are
//! `(first_fragment, timestamp, duration)`; a record with zero duration
//! carries an extra discontinuity byte. Consecutive records imply a repeat
//! count for the earlier one, which can be derived two ways: from the
//! fragment-number delta, or from the elapsed time over the per-fragment
//! duration. Both are computed; when they disagree the delta wins and a
//! [`BootstrapWarning::RepeatDisagreement`] is recorded.

use tracing::warn;

use crate::bitstream::ByteReader;
use crate::{Error, Result};

/// Upper bound on the number of fragments a table may expand to.
pub const MAX_EXPANDED_FRAGMENTS: usize = 1_000_000;

/// One fragment run record as stored in the `afrt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRecord {
    pub first_fragment: u32,
    pub timestamp: u64,
    pub duration: u32,
    /// Present only when `duration` is zero.
    pub discontinuity: Option<u8>,
}

impl RunRecord {
    fn is_sentinel(&self) -> bool {
        self.first_fragment == 0 && self.timestamp == 0 && self.duration == 0
    }
}

/// One expanded fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapEntry {
    pub fragment: u32,
    pub timestamp: u64,
    pub duration: u32,
}

/// Non-fatal inconsistencies found while expanding the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapWarning {
    /// The fragment-number delta and the duration-based estimate differ.
    RepeatDisagreement {
        fragment: u32,
        by_index: u64,
        by_duration: u64,
    },
    /// Expanded entry count differs from the declared fragment count.
    CountMismatch { declared: u32, expanded: usize },
}

/// Decoded bootstrap table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapTable {
    pub timescale: u32,
    /// Total media time declared by the `abst`.
    pub media_time: u64,
    /// Fragments per segment from the `asrt`.
    pub declared_count: u32,
    pub records: Vec<RunRecord>,
    pub warnings: Vec<BootstrapWarning>,
    entries: Vec<BootstrapEntry>,
}

impl BootstrapTable {
    /// Decode a bootstrap blob.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let abst_size = r.read_u32()? as usize;
        expect_tag(&mut r, b"abst")?;
        let body_len = abst_size
            .checked_sub(8)
            .filter(|_| abst_size != 0)
            .unwrap_or(r.remaining())
            .min(r.remaining());
        let mut r = ByteReader::with_base(r.slice(body_len)?, 8);

        r.skip(4)?; // version, flags
        r.skip(4)?; // bootstrap info version
        r.skip(1)?; // profile, live, update
        let timescale = r.read_u32()?;
        let media_time = r.read_u64()?;
        r.skip(8)?; // smpte time code offset
        skip_cstring(&mut r)?; // movie identifier
        skip_strings(&mut r)?; // server entries
        skip_strings(&mut r)?; // quality entries
        skip_cstring(&mut r)?; // drm data
        skip_cstring(&mut r)?; // metadata

        let segment_tables = r.read_u8()?;
        let mut declared_count = None;
        for _ in 0..segment_tables {
            let count = parse_asrt(&mut r)?;
            declared_count = declared_count.or(count);
        }

        let fragment_tables = r.read_u8()?;
        let mut records = Vec::new();
        let mut afrt_timescale = timescale;
        for table in 0..fragment_tables {
            let (ts, recs) = parse_afrt(&mut r)?;
            if table == 0 {
                afrt_timescale = ts;
                records = recs;
            }
        }
        if fragment_tables == 0 {
            return Err(Error::invalid_table(r.position(), "no fragment run table"));
        }

        let mut table = Self {
            timescale: afrt_timescale,
            media_time,
            declared_count: declared_count.unwrap_or(0),
            records,
            warnings: Vec::new(),
            entries: Vec::new(),
        };
        table.expand()?;
        Ok(table)
    }

    fn expand(&mut self) -> Result<()> {
        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        let mut prev: Option<RunRecord> = None;

        for record in &self.records {
            if let Some(p) = prev.filter(|p| p.duration != 0) {
                let by_duration = self.media_time.saturating_sub(p.timestamp) / p.duration as u64;
                let repeat = if record.is_sentinel() {
                    by_duration
                } else {
                    let by_index = record.first_fragment.saturating_sub(p.first_fragment) as u64;
                    let by_gap = record.timestamp.saturating_sub(p.timestamp) / p.duration as u64;
                    if by_index != by_gap {
                        warn!(
                            fragment = p.first_fragment,
                            by_index, by_duration = by_gap, "bootstrap repeat count disagreement"
                        );
                        warnings.push(BootstrapWarning::RepeatDisagreement {
                            fragment: p.first_fragment,
                            by_index,
                            by_duration: by_gap,
                        });
                    }
                    by_index
                };
                push_run(&mut entries, &p, repeat)?;
            }
            prev = Some(*record);
        }

        if let Some(p) = prev.filter(|p| p.duration != 0 && self.media_time > p.timestamp) {
            let repeat = (self.media_time - p.timestamp) / p.duration as u64;
            push_run(&mut entries, &p, repeat)?;
        }

        if self.declared_count != 0 && entries.len() != self.declared_count as usize {
            warn!(
                declared = self.declared_count,
                expanded = entries.len(),
                "bootstrap fragment count mismatch"
            );
            warnings.push(BootstrapWarning::CountMismatch {
                declared: self.declared_count,
                expanded: entries.len(),
            });
        }

        self.entries = entries;
        self.warnings = warnings;
        Ok(())
    }

    /// Expanded `(fragment, timestamp, duration)` entries.
    pub fn entries(&self) -> &[BootstrapEntry] {
        &self.entries
    }

    /// Fragment numbers in order.
    pub fn segment_indexes(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.fragment).collect()
    }

    /// Whether the expansion reproduces the declared count.
    pub fn is_consistent(&self) -> bool {
        self.declared_count as usize == self.entries.len()
    }
}

fn push_run(entries: &mut Vec<BootstrapEntry>, record: &RunRecord, repeat: u64) -> Result<()> {
    let budget = MAX_EXPANDED_FRAGMENTS.saturating_sub(entries.len()) as u64;
    if repeat > budget {
        return Err(Error::invalid_table(
            0,
            format!(
                "run at fragment {} repeats {} times, table limit is {} fragments",
                record.first_fragment, repeat, MAX_EXPANDED_FRAGMENTS
            ),
        ));
    }
    for k in 0..repeat {
        let fragment = u32::try_from(k)
            .ok()
            .and_then(|k| record.first_fragment.checked_add(k));
        let timestamp = k
            .checked_mul(record.duration as u64)
            .and_then(|offset| record.timestamp.checked_add(offset));
        let (Some(fragment), Some(timestamp)) = (fragment, timestamp) else {
            return Err(Error::invalid_table(
                0,
                format!("run at fragment {} overflows after {} repeats", record.first_fragment, k),
            ));
        };
        entries.push(BootstrapEntry {
            fragment,
            timestamp,
            duration: record.duration,
        });
    }
    Ok(())
}

fn expect_tag(r: &mut ByteReader<'_>, tag: &[u8; 4]) -> Result<()> {
    let offset = r.position();
    let found = r.slice(4)?;
    if found != tag {
        return Err(Error::invalid_header(
            "bootstrap box tag",
            offset,
            String::from_utf8_lossy(tag),
            String::from_utf8_lossy(found),
        ));
    }
    Ok(())
}

fn skip_cstring(r: &mut ByteReader<'_>) -> Result<()> {
    while r.read_u8()? != 0 {}
    Ok(())
}

fn skip_strings(r: &mut ByteReader<'_>) -> Result<()> {
    let count = r.read_u8()?;
    for _ in 0..count {
        skip_cstring(r)?;
    }
    Ok(())
}

/// Parse one `asrt`, returning the first entry's fragments-per-segment.
fn parse_asrt(r: &mut ByteReader<'_>) -> Result<Option<u32>> {
    let size = r.read_u32()? as usize;
    expect_tag(r, b"asrt")?;
    let body = r.slice(size.saturating_sub(8))?;
    let mut b = ByteReader::new(body);
    b.skip(4)?;
    skip_strings(&mut b)?;
    let entries = b.read_u32()?;
    let mut first = None;
    for _ in 0..entries {
        let _first_segment = b.read_u32()?;
        let fragments = b.read_u32()?;
        first = first.or(Some(fragments));
    }
    Ok(first)
}

/// Parse one `afrt`, returning its timescale and run records.
fn parse_afrt(r: &mut ByteReader<'_>) -> Result<(u32, Vec<RunRecord>)> {
    let size = r.read_u32()? as usize;
    expect_tag(r, b"afrt")?;
    let body = r.slice(size.saturating_sub(8))?;
    let mut b = ByteReader::new(body);
    b.skip(4)?;
    let timescale = b.read_u32()?;
    skip_strings(&mut b)?;
    let count = b.read_u32()?;

    let mut records = Vec::new();
    for _ in 0..count {
        let first_fragment = b.read_u32()?;
        let timestamp = b.read_u64()?;
        let duration = b.read_u32()?;
        let discontinuity = if duration == 0 {
            Some(b.read_u8()?)
        } else {
            None
        };
        records.push(RunRecord {
            first_fragment,
            timestamp,
            duration,
            discontinuity,
        });
    }
    Ok((timescale, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::bootstrap_blob;

    #[test]
    fn test_layout_offsets() {
        let blob = bootstrap_blob(40_000, 4, &[(1, 0, 10_000)]);
        // Fixed positions of the packager's layout.
        assert_eq!(&blob[4..8], b"abst");
        assert_eq!(
            u64::from_be_bytes(blob[0x15..0x1d].try_into().unwrap()),
            40_000
        );
        assert_eq!(&blob[0x2f..0x33], b"asrt");
        assert_eq!(&blob[0x49..0x4d], b"afrt");
        assert_eq!(blob.len(), 0x5a + 16);
    }

    #[test]
    fn test_single_run_expands_to_media_time() {
        let blob = bootstrap_blob(40_000, 4, &[(1, 0, 10_000)]);
        let table = BootstrapTable::decode(&blob).unwrap();
        assert_eq!(table.segment_indexes(), vec![1, 2, 3, 4]);
        assert_eq!(table.entries()[2].timestamp, 20_000);
        assert!(table.is_consistent());
        assert!(table.warnings.is_empty());
    }

    #[test]
    fn test_multiple_runs_with_sentinel() {
        // 3 x 10s, then 2 x 5s, terminated by a sentinel record.
        let blob = bootstrap_blob(40_000, 5, &[(1, 0, 10_000), (4, 30_000, 5_000), (0, 0, 0)]);
        let table = BootstrapTable::decode(&blob).unwrap();
        assert_eq!(table.segment_indexes(), vec![1, 2, 3, 4, 5]);
        assert_eq!(table.records[2].discontinuity, Some(0));
        assert_eq!(table.entries()[4].timestamp, 35_000);
        assert!(table.is_consistent());
    }

    #[test]
    fn test_repeat_disagreement_is_warned_and_index_wins() {
        // Index delta says 3, timestamps say 2.
        let blob = bootstrap_blob(40_000, 5, &[(1, 0, 10_000), (4, 20_000, 10_000)]);
        let table = BootstrapTable::decode(&blob).unwrap();
        assert_eq!(&table.segment_indexes()[..3], &[1, 2, 3]);
        assert!(table.warnings.contains(&BootstrapWarning::RepeatDisagreement {
            fragment: 1,
            by_index: 3,
            by_duration: 2,
        }));
    }

    #[test]
    fn test_count_mismatch_warning() {
        let blob = bootstrap_blob(40_000, 7, &[(1, 0, 10_000)]);
        let table = BootstrapTable::decode(&blob).unwrap();
        assert!(!table.is_consistent());
        assert_eq!(
            table.warnings,
            vec![BootstrapWarning::CountMismatch {
                declared: 7,
                expanded: 4
            }]
        );
    }

    #[test]
    fn test_timestamp_overflow_rejected() {
        let blob = bootstrap_blob(0, 3, &[(1, u64::MAX - 5, 10), (3, u64::MAX - 1, 10)]);
        assert!(matches!(
            BootstrapTable::decode(&blob),
            Err(Error::InvalidTable { .. })
        ));
    }

    #[test]
    fn test_fragment_number_overflow_rejected() {
        let blob = bootstrap_blob(30, 3, &[(u32::MAX - 1, 0, 10)]);
        assert!(matches!(
            BootstrapTable::decode(&blob),
            Err(Error::InvalidTable { .. })
        ));
    }

    #[test]
    fn test_oversized_expansion_rejected() {
        // A 90-byte blob claiming 200 million one-tick fragments.
        let blob = bootstrap_blob(200_000_000, 1, &[(1, 0, 1)]);
        assert!(matches!(
            BootstrapTable::decode(&blob),
            Err(Error::InvalidTable { .. })
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut blob = bootstrap_blob(40_000, 4, &[(1, 0, 10_000)]);
        blob[0x49..0x4d].copy_from_slice(b"xxxx");
        assert!(matches!(
            BootstrapTable::decode(&blob),
            Err(Error::InvalidHeader { .. })
        ));
        assert!(BootstrapTable::decode(&[0u8; 4]).is_err());
    }
}
