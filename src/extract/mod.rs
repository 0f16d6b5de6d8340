//! Extraction of a zoom range from a tile archive into a ZXY tree.
//!
//! The tree itself is the progress record: a tile whose file already exists
//! with a non-zero size is never requested again, so an interrupted run is
//! continued by running it again with the same arguments.

mod command;

pub use command::{CommandExtractor, DEFAULT_ARGS, DEFAULT_PROGRAM, DEFAULT_TIMEOUT};

use crate::{
    error::{Error, Result},
    summary::{ExtractSummary, TileFailure},
    tile::{tiles_per_axis, TileCoord, TileFormat, MAX_ZOOM},
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};
use tempfile::NamedTempFile;

const PROGRESS_INTERVAL: u64 = 5000;

/// Result of asking the source archive for a single tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Tile(Vec<u8>),
    /// The archive has no tile at this coordinate.
    NotFound,
}

/// Capability to fetch one tile from a source archive.
///
/// An [`Error::Extraction`] is a failure of that tile only and is recorded;
/// any other error aborts the run.
pub trait TileExtractor {
    fn extract_tile(&self, coord: &TileCoord) -> Result<Extraction>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractConfig {
    pub output_dir: PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub format: TileFormat,
}

impl ExtractConfig {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        min_zoom: u8,
        max_zoom: u8,
        format: TileFormat,
    ) -> Result<Self> {
        if min_zoom > max_zoom || max_zoom > MAX_ZOOM {
            return Err(Error::InvalidZoomRange {
                min: min_zoom,
                max: max_zoom,
            });
        }

        Ok(ExtractConfig {
            output_dir: output_dir.into(),
            min_zoom,
            max_zoom,
            format,
        })
    }

    /// Where the tile at `coord` is stored.
    pub fn tile_path(&self, coord: &TileCoord) -> PathBuf {
        self.output_dir.join(coord.relative_path(self.format))
    }
}

/// A tile counts as extracted once its file exists and is not empty.
pub fn is_extracted(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

/// Materializes every tile of the configured zoom range that the tree does
/// not hold yet.
pub fn extract(config: &ExtractConfig, extractor: &dyn TileExtractor) -> Result<ExtractSummary> {
    fs::create_dir_all(&config.output_dir).map_err(|e| Error::io(&config.output_dir, e))?;

    log::info!(
        "extracting zoom levels {} to {} into {}",
        config.min_zoom,
        config.max_zoom,
        config.output_dir.display()
    );

    let started = Instant::now();

    let mut summary = ExtractSummary::default();

    for zoom in config.min_zoom..=config.max_zoom {
        extract_zoom(config, extractor, zoom, &mut summary)?;
    }

    summary.elapsed = started.elapsed();

    log::info!(
        "extraction finished: {} extracted, {} already present, {} not in source, {} failed",
        summary.extracted,
        summary.existing,
        summary.not_found,
        summary.failures.len()
    );

    Ok(summary)
}

fn extract_zoom(
    config: &ExtractConfig,
    extractor: &dyn TileExtractor,
    zoom: u8,
    summary: &mut ExtractSummary,
) -> Result<()> {
    let size = tiles_per_axis(zoom);
    let expected = u64::from(size) * u64::from(size);

    let start = summary.clone();
    let mut processed = 0u64;

    log::info!("zoom {zoom}: {expected} tiles expected");

    for column in 0..size {
        for row in 0..size {
            let coord = TileCoord::new(zoom, column, row)?;

            let target = config.tile_path(&coord);

            processed += 1;

            if processed % PROGRESS_INTERVAL == 0 {
                log::info!("zoom {zoom}: {processed}/{expected}");
            }

            if is_extracted(&target) {
                summary.existing += 1;

                continue;
            }

            match extractor.extract_tile(&coord) {
                Ok(Extraction::Tile(data)) if !data.is_empty() => {
                    write_tile(&target, &data)?;

                    summary.extracted += 1;
                }
                Ok(_) => {
                    log::debug!("tile {coord} not in source");

                    summary.not_found += 1;
                }
                Err(Error::Extraction(reason)) => {
                    log::warn!("error extracting tile {coord}: {reason}");

                    summary.failures.push(TileFailure::at(&coord, reason));
                }
                Err(e) => return Err(e),
            }
        }
    }

    log::info!(
        "zoom {zoom}: {} extracted, {} already present, {} not in source, {} failed",
        summary.extracted - start.extracted,
        summary.existing - start.existing,
        summary.not_found - start.not_found,
        summary.failures.len() - start.failures.len()
    );

    Ok(())
}

/// Writes through a temporary file in the target directory so the tile only
/// appears under its final name once complete.
fn write_tile(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;

    file.write_all(data).map_err(|e| Error::io(file.path(), e))?;

    file.persist(path).map_err(|e| Error::io(path, e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::TileWalker;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashSet};

    /// Source covering every tile (only those where `column <= row` when
    /// `sparse`), failing for the coordinates in `failing`.
    #[derive(Default)]
    struct FakeExtractor {
        calls: RefCell<Vec<TileCoord>>,
        failing: HashSet<TileCoord>,
        sparse: bool,
    }

    impl TileExtractor for FakeExtractor {
        fn extract_tile(&self, coord: &TileCoord) -> Result<Extraction> {
            self.calls.borrow_mut().push(*coord);

            if self.failing.contains(coord) {
                return Err(Error::Extraction(format!("cannot read {coord}")));
            }

            if self.sparse && coord.column() > coord.row() {
                return Ok(Extraction::NotFound);
            }

            Ok(Extraction::Tile(coord.to_string().into_bytes()))
        }
    }

    fn coord(zoom: u8, column: u32, row: u32) -> TileCoord {
        TileCoord::new(zoom, column, row).unwrap()
    }

    fn tiles(dir: &Path) -> Vec<(TileCoord, Vec<u8>)> {
        TileWalker::open(dir)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();

                (entry.coord, fs::read(&entry.path).unwrap())
            })
            .collect()
    }

    #[test]
    fn rejects_inverted_zoom_range() {
        let err = ExtractConfig::new("out", 5, 2, TileFormat::Png).unwrap_err();

        assert!(matches!(err, Error::InvalidZoomRange { min: 5, max: 2 }));
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_zoom_above_maximum() {
        assert!(ExtractConfig::new("out", 0, MAX_ZOOM + 1, TileFormat::Png).is_err());
    }

    #[test]
    fn extracts_covered_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tiles");

        let config = ExtractConfig::new(&out, 0, 2, TileFormat::Png).unwrap();
        let extractor = FakeExtractor {
            sparse: true,
            ..Default::default()
        };

        let summary = extract(&config, &extractor).unwrap();

        assert_eq!(extractor.calls.borrow().len(), 1 + 4 + 16);
        assert_eq!(summary.extracted, 1 + 3 + 10);
        assert_eq!(summary.not_found, 1 + 6);
        assert_eq!(summary.existing, 0);
        assert!(summary.is_complete());

        assert_eq!(
            fs::read(out.join("2/1/3.png")).unwrap(),
            b"2/1/3".to_vec()
        );
        assert!(!out.join("2/3/1.png").exists());
        assert!(!out.join("1/1/0.png").exists());
    }

    #[test]
    fn resumes_after_interruption() {
        let dir = tempfile::tempdir().unwrap();
        let interrupted = dir.path().join("interrupted");
        let single = dir.path().join("single");

        // first attempt only got through zoom 2
        let first = FakeExtractor::default();
        extract(&ExtractConfig::new(&interrupted, 0, 2, TileFormat::Png).unwrap(), &first).unwrap();

        let rerun = FakeExtractor::default();
        let config = ExtractConfig::new(&interrupted, 0, 5, TileFormat::Png).unwrap();
        let summary = extract(&config, &rerun).unwrap();

        let calls = rerun.calls.borrow();

        assert!(calls.iter().all(|c| c.zoom() > 2));
        assert_eq!(summary.existing, 1 + 4 + 16);
        assert_eq!(
            calls.iter().filter(|c| c.zoom() > 2).count(),
            64 + 256 + 1024
        );

        extract(
            &ExtractConfig::new(&single, 0, 5, TileFormat::Png).unwrap(),
            &FakeExtractor::default(),
        )
        .unwrap();

        assert_eq!(tiles(&interrupted), tiles(&single));
    }

    #[test]
    fn complete_tree_needs_no_extraction() {
        let dir = tempfile::tempdir().unwrap();

        let config = ExtractConfig::new(dir.path(), 0, 1, TileFormat::Webp).unwrap();

        for column in 0..2 {
            for row in 0..2 {
                let path = config.tile_path(&coord(1, column, row));

                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, b"tile").unwrap();
            }
        }

        let extractor = FakeExtractor::default();
        let summary = extract(&config, &extractor).unwrap();

        assert_eq!(*extractor.calls.borrow(), vec![coord(0, 0, 0)]);
        assert_eq!(summary.existing, 4);
        assert_eq!(summary.extracted, 1);
    }

    #[test]
    fn empty_file_is_extracted_again() {
        let dir = tempfile::tempdir().unwrap();

        let config = ExtractConfig::new(dir.path(), 0, 0, TileFormat::Png).unwrap();
        let path = config.tile_path(&coord(0, 0, 0));

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"").unwrap();

        assert!(!is_extracted(&path));

        let summary = extract(&config, &FakeExtractor::default()).unwrap();

        assert_eq!(summary.extracted, 1);
        assert_eq!(fs::read(&path).unwrap(), b"0/0/0".to_vec());
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();

        let config = ExtractConfig::new(dir.path(), 0, 2, TileFormat::Png).unwrap();

        let extractor = FakeExtractor {
            failing: [coord(1, 0, 0), coord(2, 2, 3)].into_iter().collect(),
            ..Default::default()
        };

        let summary = extract(&config, &extractor).unwrap();

        assert_eq!(extractor.calls.borrow().len(), 21);
        assert_eq!(
            summary.failures,
            vec![
                TileFailure::at(&coord(1, 0, 0), "cannot read 1/0/0"),
                TileFailure::at(&coord(2, 2, 3), "cannot read 2/2/3"),
            ]
        );
        assert_eq!(summary.extracted, 19);

        // the next run only retries what failed
        let retry = FakeExtractor::default();
        let summary = extract(&config, &retry).unwrap();

        assert!(summary.is_complete());
        assert_eq!(summary.extracted, 2);
    }

    #[test]
    fn fatal_errors_abort() {
        struct Broken;

        impl TileExtractor for Broken {
            fn extract_tile(&self, _coord: &TileCoord) -> Result<Extraction> {
                Err(Error::io(
                    "extractor",
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = ExtractConfig::new(dir.path(), 0, 3, TileFormat::Png).unwrap();

        assert!(matches!(extract(&config, &Broken), Err(Error::Io { .. })));
    }
}
