//! End of run reports for both pipelines.

use crate::tile::TileCoord;
use std::{fmt, time::Duration};

/// A tile that could not be processed. Recorded and reported instead of
/// aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFailure {
    pub location: String,
    pub reason: String,
}

impl TileFailure {
    pub fn new(location: impl fmt::Display, reason: impl fmt::Display) -> Self {
        TileFailure {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn at(coord: &TileCoord, reason: impl fmt::Display) -> Self {
        Self::new(coord, reason)
    }
}

impl fmt::Display for TileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.reason)
    }
}

/// `h:mm:ss`, like the reports of the shell tools this replaces.
fn write_elapsed(f: &mut fmt::Formatter<'_>, elapsed: Duration) -> fmt::Result {
    let secs = elapsed.as_secs();

    writeln!(f, "Elapsed: {}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[TileFailure]) -> fmt::Result {
    writeln!(f, "Failed: {}", failures.len())?;

    for failure in failures {
        writeln!(f, "  {failure}")?;
    }

    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Tiles written during this run.
    pub extracted: u64,
    /// Tiles already present from an earlier run.
    pub existing: u64,
    /// Tiles the source archive does not cover.
    pub not_found: u64,
    pub failures: Vec<TileFailure>,
    pub elapsed: Duration,
}

impl ExtractSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Tiles extracted per second of this run.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();

        if secs > 0.0 {
            self.extracted as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for ExtractSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extracted: {}", self.extracted)?;
        writeln!(f, "Already present: {}", self.existing)?;
        writeln!(f, "Not in source: {}", self.not_found)?;
        write_failures(f, &self.failures)?;
        write_elapsed(f, self.elapsed)?;
        writeln!(f, "Rate: {:.1} tiles/s", self.rate())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Tiles inserted into the archive.
    pub written: u64,
    /// Committed transactions.
    pub batches: u64,
    /// Entries of the tree ignored because they are not tiles.
    pub skipped_entries: usize,
    pub failures: Vec<TileFailure>,
    /// Size of the finished archive in bytes.
    pub archive_size: u64,
    pub elapsed: Duration,
}

impl PackSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for PackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Written: {} tiles in {} batches", self.written, self.batches)?;
        writeln!(f, "Skipped entries: {}", self.skipped_entries)?;
        write_failures(f, &self.failures)?;
        writeln!(
            f,
            "Archive size: {:.1} MB",
            self.archive_size as f64 / (1024.0 * 1024.0)
        )?;
        write_elapsed(f, self.elapsed)
    }
}
