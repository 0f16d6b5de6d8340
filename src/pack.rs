//! Packing a ZXY tree into an MBTiles archive.
//!
//! Tiles are streamed from a [`TileWalker`] and inserted in batches, one
//! transaction per batch, with rows converted to the TMS convention. A crashed
//! run keeps the batches committed so far but cannot be resumed; delete the
//! archive and pack again.

use crate::{
    error::{Error, Result},
    schema::create_schema,
    summary::{PackSummary, TileFailure},
    tile::{TileCoord, TileFormat},
    walker::TileWalker,
};
use rusqlite::{params, Connection, ErrorCode};
use std::{
    fmt, fs, io,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

pub const DEFAULT_NAME: &str = "Tiles";

pub const DEFAULT_DESCRIPTION: &str = "Converted from ZXY";

pub const DEFAULT_BATCH_SIZE: usize = 1000;

const PROGRESS_INTERVAL: u64 = 5000;

/// Geographic extent in degrees, written to the `bounds` metadata entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    /// Full extent of the Web Mercator projection.
    pub const WORLD: Bounds = Bounds {
        west: -180.0,
        south: -85.05112877980659,
        east: 180.0,
        north: 85.05112877980659,
    };

    /// Longitude and latitude of the middle of the extent.
    pub fn center(&self) -> (f64, f64) {
        ((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds::WORLD
    }
}

impl FromStr for Bounds {
    type Err = Error;

    /// Parses `west,south,east,north`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidBounds(s.to_string());

        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        let [west, south, east, north] = values[..] else {
            return Err(invalid());
        };

        let lon = -180.0..=180.0;
        let lat = -90.0..=90.0;

        if !(lon.contains(&west) && lon.contains(&east) && west < east)
            || !(lat.contains(&south) && lat.contains(&north) && south < north)
        {
            return Err(invalid());
        }

        Ok(Bounds {
            west,
            south,
            east,
            north,
        })
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// Everything that shapes the archive besides the tiles themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct PackConfig {
    pub name: String,
    pub description: String,
    pub format: TileFormat,
    /// Tiles per transaction.
    pub batch_size: usize,
    /// Overrides the world extent written as `bounds`.
    pub bounds: Option<Bounds>,
    /// Only pack tiles within these zoom levels.
    pub zoom_range: Option<RangeInclusive<u8>>,
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        PackConfig {
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            format: TileFormat::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            bounds: None,
            zoom_range: None,
            overwrite: false,
        }
    }
}

impl PackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize(self.batch_size));
        }

        if let Some(range) = &self.zoom_range {
            if range.is_empty() {
                return Err(Error::InvalidZoomRange {
                    min: *range.start(),
                    max: *range.end(),
                });
            }
        }

        Ok(())
    }

    fn walker(&self, root: &Path) -> Result<TileWalker> {
        let walker = TileWalker::open(root)?.with_format(self.format);

        Ok(match &self.zoom_range {
            Some(range) => walker.with_zoom_range(range.clone()),
            None => walker,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    SchemaCreated,
    MetadataWritten,
    Inserting,
}

impl WriterState {
    fn name(self) -> &'static str {
        match self {
            WriterState::SchemaCreated => "awaiting metadata",
            WriterState::MetadataWritten => "ready for tiles",
            WriterState::Inserting => "inserting tiles",
        }
    }
}

/// Tiles of one batch that were inserted or turned away.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub rejected: Vec<TileFailure>,
}

/// Sole owner of an MBTiles archive while it is being written.
pub struct ArchiveWriter {
    conn: Connection,
    config: PackConfig,
    state: WriterState,
    batches: u64,
}

impl ArchiveWriter {
    /// Creates the archive at `path` and its schema.
    ///
    /// An existing file is only replaced when `config.overwrite` is set.
    pub fn create(path: &Path, config: &PackConfig) -> Result<Self> {
        config.validate()?;

        if path.exists() {
            if !config.overwrite {
                return Err(Error::DestinationExists(path.to_path_buf()));
            }

            log::info!("replacing existing archive {}", path.display());

            for file in [path.to_path_buf(), sibling(path, "-wal"), sibling(path, "-shm")] {
                match fs::remove_file(&file) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => {
                        return Err(Error::io(file, e));
                    }
                    _ => {}
                }
            }
        }

        let schema_error = |source| Error::SchemaCreation {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(schema_error)?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(schema_error)?;

        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(schema_error)?;

        create_schema(&conn).map_err(schema_error)?;

        log::debug!("created schema in {}", path.display());

        Ok(ArchiveWriter {
            conn,
            config: config.clone(),
            state: WriterState::SchemaCreated,
            batches: 0,
        })
    }

    fn expect_state(&self, expected: &[WriterState]) -> Result<()> {
        if expected.contains(&self.state) {
            return Ok(());
        }

        Err(Error::WriterState {
            expected: expected[0].name(),
            actual: self.state.name(),
        })
    }

    /// Fills the `metadata` table for a tileset spanning `min_zoom..=max_zoom`.
    pub fn write_metadata(&mut self, min_zoom: u8, max_zoom: u8) -> Result<()> {
        self.expect_state(&[WriterState::SchemaCreated])?;

        let bounds = self.config.bounds.unwrap_or_default();

        let (lon, lat) = bounds.center();

        let entries = [
            ("name", self.config.name.clone()),
            ("description", self.config.description.clone()),
            ("type", "baselayer".to_string()),
            ("version", "1.0.0".to_string()),
            ("format", self.config.format.to_string()),
            ("minzoom", min_zoom.to_string()),
            ("maxzoom", max_zoom.to_string()),
            ("bounds", bounds.to_string()),
            ("center", format!("{lon},{lat},{min_zoom}")),
        ];

        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare("INSERT INTO metadata (name, value) VALUES (?1, ?2)")?;

            for (name, value) in &entries {
                stmt.execute((name, value))?;
            }
        }

        tx.commit()?;

        self.state = WriterState::MetadataWritten;

        Ok(())
    }

    /// Inserts `tiles` in a single transaction.
    ///
    /// A tile whose coordinate is already in the archive is rejected and
    /// reported; the rest of the batch is still committed.
    pub fn insert_batch(&mut self, tiles: &[(TileCoord, Vec<u8>)]) -> Result<BatchOutcome> {
        self.expect_state(&[WriterState::MetadataWritten, WriterState::Inserting])?;

        let mut outcome = BatchOutcome::default();

        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (coord, data) in tiles {
                match stmt.execute(params![coord.zoom(), coord.column(), coord.tms_row(), data]) {
                    Ok(_) => outcome.inserted += 1,
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        log::warn!("tile {coord} is already in the archive, skipping");

                        outcome
                            .rejected
                            .push(TileFailure::at(coord, "duplicate tile coordinate"));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        tx.commit()?;

        self.batches += 1;
        self.state = WriterState::Inserting;

        log::debug!("committed batch {} ({} tiles)", self.batches, outcome.inserted);

        Ok(outcome)
    }

    /// Number of committed batches.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Folds the write-ahead log into the archive and closes it.
    pub fn finish(self) -> Result<()> {
        self.expect_state(&[WriterState::MetadataWritten, WriterState::Inserting])?;

        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;

        self.conn
            .pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get::<_, String>(0))?;

        self.conn.close().map_err(|(_, e)| e)?;

        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();

    name.push(suffix);

    PathBuf::from(name)
}

/// Number of tiles and their zoom range, `None` for an empty tree.
fn scan(root: &Path, config: &PackConfig) -> Result<Option<(u64, u8, u8)>> {
    let mut found: Option<(u64, u8, u8)> = None;

    for entry in config.walker(root)?.quiet() {
        let Ok(entry) = entry else {
            continue;
        };

        let zoom = entry.coord.zoom();

        found = Some(match found {
            None => (1, zoom, zoom),
            Some((count, min, max)) => (count + 1, min.min(zoom), max.max(zoom)),
        });
    }

    Ok(found)
}

/// Builds the archive at `destination` from the tiles below `root`.
pub fn pack(root: &Path, destination: &Path, config: &PackConfig) -> Result<PackSummary> {
    pack_with(root, destination, config, |path| fs::read(path))
}

fn pack_with(
    root: &Path,
    destination: &Path,
    config: &PackConfig,
    mut read_tile: impl FnMut(&Path) -> io::Result<Vec<u8>>,
) -> Result<PackSummary> {
    let started = Instant::now();

    config.validate()?;

    let mut walker = config.walker(root)?;

    log::info!("scanning {}", root.display());

    let Some((total, min_zoom, max_zoom)) = scan(root, config)? else {
        return Err(Error::EmptySource(root.to_path_buf()));
    };

    log::info!("found {total} tiles, zoom levels {min_zoom} to {max_zoom}");

    let mut writer = ArchiveWriter::create(destination, config)?;

    writer.write_metadata(min_zoom, max_zoom)?;

    let mut summary = PackSummary::default();
    let mut batch = Vec::with_capacity(config.batch_size);
    let mut processed = 0u64;

    for entry in walker.by_ref() {
        processed += 1;

        match entry {
            Ok(tile) => match read_tile(&tile.path) {
                Ok(data) => batch.push((tile.coord, data)),
                Err(e) => {
                    log::warn!("error reading tile {}: {e}", tile.path.display());

                    summary.failures.push(TileFailure::at(&tile.coord, e));
                }
            },
            Err(e) => {
                log::warn!("{e}");

                let location = e.path().unwrap_or(root).display().to_string();

                summary.failures.push(TileFailure::new(location, e));
            }
        }

        if batch.len() >= config.batch_size {
            commit(&mut writer, &mut batch, &mut summary)?;
        }

        if processed % PROGRESS_INTERVAL == 0 {
            log::info!("{processed}/{total} tiles");
        }
    }

    if !batch.is_empty() {
        commit(&mut writer, &mut batch, &mut summary)?;
    }

    summary.batches = writer.batches();
    summary.skipped_entries = walker.skipped();

    writer.finish()?;

    summary.archive_size = fs::metadata(destination)
        .map_err(|e| Error::io(destination, e))?
        .len();
    summary.elapsed = started.elapsed();

    log::info!(
        "archive {} complete: {} tiles written, {} failed",
        destination.display(),
        summary.written,
        summary.failures.len()
    );

    Ok(summary)
}

fn commit(
    writer: &mut ArchiveWriter,
    batch: &mut Vec<(TileCoord, Vec<u8>)>,
    summary: &mut PackSummary,
) -> Result<()> {
    let outcome = writer.insert_batch(batch)?;

    summary.written += outcome.inserted;
    summary.failures.extend(outcome.rejected);

    batch.clear();

    Ok(())
}
