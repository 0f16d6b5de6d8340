//! Lazy traversal of a `<root>/<zoom>/<column>/<row>.<ext>` tree.
//!
//! Tiles come out ordered by zoom, then column, then row, all compared
//! numerically. Only the root listing is read up front; each zoom level is
//! walked on demand so no more than one column directory listing is held in
//! memory at a time.

use crate::{
    error::{Error, Result},
    tile::{parse_index, TileCoord, TileFormat},
};
use std::{
    cmp::Ordering,
    collections::VecDeque,
    fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};
use walkdir::{DirEntry, WalkDir};

/// A tile file found in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileEntry {
    pub coord: TileCoord,
    pub format: TileFormat,
    pub path: PathBuf,
}

pub struct TileWalker {
    zooms: Vec<(u8, PathBuf)>,
    pending: VecDeque<(u8, PathBuf)>,
    current: Option<walkdir::IntoIter>,
    format: Option<TileFormat>,
    skipped: usize,
    quiet: bool,
}

impl TileWalker {
    /// Opens `root` and lists its zoom level directories.
    pub fn open(root: &Path) -> Result<Self> {
        let invalid = |reason| Error::InvalidSource {
            path: root.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(root).map_err(|_| invalid("does not exist"))?;

        if !metadata.is_dir() {
            return Err(invalid("is not a directory"));
        }

        let mut zooms = Vec::new();
        let mut skipped = 0;

        for entry in fs::read_dir(root).map_err(|e| Error::io(root, e))? {
            let entry = entry.map_err(|e| Error::io(root, e))?;

            let path = entry.path();

            let zoom = entry
                .file_name()
                .to_str()
                .and_then(parse_index::<u8>)
                .filter(|_| path.is_dir());

            match zoom {
                Some(zoom) => zooms.push((zoom, path)),
                None => {
                    skipped += 1;

                    log::debug!("not a zoom level, skipping: {}", path.display());
                }
            }
        }

        zooms.sort();

        Ok(TileWalker {
            pending: zooms.iter().cloned().collect(),
            zooms,
            current: None,
            format: None,
            skipped,
            quiet: false,
        })
    }

    /// Restricts the walk to zoom levels within `range`.
    pub fn with_zoom_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.zooms.retain(|(zoom, _)| range.contains(zoom));
        self.pending.retain(|(zoom, _)| range.contains(zoom));
        self
    }

    /// Restricts the walk to tiles stored as `format`; files with other
    /// extensions are skipped.
    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Stops logging skipped entries, for walks repeating an earlier one.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Zoom levels that have a directory in the tree, ascending.
    pub fn zoom_levels(&self) -> Vec<u8> {
        self.zooms.iter().map(|(zoom, _)| *zoom).collect()
    }

    /// Number of entries skipped so far because they did not look like tiles.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn walk_zoom(dir: &Path) -> walkdir::IntoIter {
        WalkDir::new(dir)
            .min_depth(0)
            .max_depth(2)
            .follow_links(true)
            .sort_by(compare_numeric)
            .into_iter()
    }

    fn entry_to_tile(&mut self, entry: &DirEntry) -> Option<TileEntry> {
        let path = entry.path();

        if !entry.file_type().is_file() {
            self.skip(path);

            return None;
        }

        let Ok((coord, format)) = TileCoord::parse_path(path) else {
            self.skip(path);

            return None;
        };

        if self.format.is_some_and(|f| f != format) {
            self.skip(path);

            return None;
        }

        Some(TileEntry {
            coord,
            format,
            path: path.to_path_buf(),
        })
    }

    fn skip(&mut self, path: &Path) {
        self.skipped += 1;

        if !self.quiet {
            skip_log(path);
        }
    }
}

impl Iterator for TileWalker {
    type Item = Result<TileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let (zoom, dir) = self.pending.pop_front()?;

                log::debug!("walking zoom level {zoom}");

                self.current = Some(Self::walk_zoom(&dir));
            }

            let entries = self.current.as_mut()?;

            let entry = match entries.next() {
                None => {
                    self.current = None;

                    continue;
                }
                Some(Err(e)) => return Some(Err(Error::Walk(e))),
                Some(Ok(entry)) => entry,
            };

            match entry.depth() {
                0 => continue,
                1 => {
                    let is_dir = entry.file_type().is_dir();

                    if is_dir && numeric_name(&entry).is_some() {
                        continue;
                    }

                    if is_dir {
                        if let Some(entries) = self.current.as_mut() {
                            entries.skip_current_dir();
                        }
                    }

                    self.skip(entry.path());
                }
                _ => {
                    if let Some(tile) = self.entry_to_tile(&entry) {
                        return Some(Ok(tile));
                    }
                }
            }
        }
    }
}

fn skip_log(path: &Path) {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));

    if hidden {
        log::debug!("skipping hidden entry {}", path.display());
    } else {
        log::warn!("unexpected entry, skipping: {}", path.display());
    }
}

/// Numeric value of the part of the file name before the first dot.
fn numeric_name(entry: &DirEntry) -> Option<u32> {
    let name = entry.file_name().to_str()?;

    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);

    parse_index(stem)
}

fn compare_numeric(a: &DirEntry, b: &DirEntry) -> Ordering {
    match (numeric_name(a), numeric_name(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.file_name().cmp(b.file_name())),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.file_name().cmp(b.file_name()),
    }
}
