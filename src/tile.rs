//! Tile addressing: coordinates in the XYZ scheme, the TMS row flip used by
//! MBTiles, and the `<zoom>/<column>/<row>.<ext>` layout of a ZXY tree.

use crate::error::{Error, Result};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Highest zoom level accepted anywhere in the crate.
pub const MAX_ZOOM: u8 = 30;

/// Number of columns (and rows) at `zoom`, which must not exceed [`MAX_ZOOM`].
pub(crate) fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom
}

/// Converts a row between the XYZ (north-up) and TMS (south-up) conventions.
///
/// The conversion is its own inverse at a fixed zoom. Returns `None` when
/// `zoom` exceeds [`MAX_ZOOM`] or `row` is outside the zoom level.
pub fn flip_row(zoom: u8, row: u32) -> Option<u32> {
    if zoom > MAX_ZOOM {
        return None;
    }

    (tiles_per_axis(zoom) - 1).checked_sub(row)
}

/// Address of a single tile, row 0 being the northernmost row.
///
/// Only [`TileCoord::new`] and [`TileCoord::parse_path`] build one, so every
/// value is within range for its zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileCoord {
    zoom: u8,
    column: u32,
    row: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, column: u32, row: u32) -> Result<Self> {
        if zoom > MAX_ZOOM || column >= tiles_per_axis(zoom) || row >= tiles_per_axis(zoom) {
            return Err(Error::InvalidCoordinate { zoom, column, row });
        }

        Ok(TileCoord { zoom, column, row })
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    /// Row index as stored in the `tiles` table of an MBTiles archive.
    pub fn tms_row(&self) -> u32 {
        tiles_per_axis(self.zoom) - 1 - self.row
    }

    /// `<zoom>/<column>/<row>.<ext>`, relative to the root of a ZXY tree.
    pub fn relative_path(&self, format: TileFormat) -> PathBuf {
        PathBuf::from(self.zoom.to_string())
            .join(self.column.to_string())
            .join(format!("{}.{}", self.row, format.extension()))
    }

    /// Parses the last three components of `path` as `<zoom>/<column>/<row>.<ext>`.
    ///
    /// Anything before those components (such as the tree root) is ignored.
    pub fn parse_path(path: &Path) -> Result<(TileCoord, TileFormat)> {
        let malformed = || Error::MalformedPath(path.to_path_buf());

        let parts = path
            .components()
            .rev()
            .take(3)
            .map(|part| match part {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;

        let [file_name, column, zoom] = parts.as_slice() else {
            return Err(malformed());
        };

        let (row, ext) = file_name.split_once('.').ok_or_else(malformed)?;

        let format = ext.parse::<TileFormat>().map_err(|_| malformed())?;
        let zoom = parse_index::<u8>(zoom).ok_or_else(malformed)?;
        let column = parse_index::<u32>(column).ok_or_else(malformed)?;
        let row = parse_index::<u32>(row).ok_or_else(malformed)?;

        let coord = TileCoord::new(zoom, column, row).map_err(|_| malformed())?;

        Ok((coord, format))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Parses a base-10 path component; signs and whitespace are rejected.
pub(crate) fn parse_index<T: FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    text.parse().ok()
}

/// Tile encodings an archive may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    #[default]
    Png,
    Jpg,
    Webp,
    Pbf,
}

impl TileFormat {
    pub const ALL: [TileFormat; 4] = [
        TileFormat::Png,
        TileFormat::Jpg,
        TileFormat::Webp,
        TileFormat::Pbf,
    ];

    /// File extension in a ZXY tree, also the `format` metadata value.
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpg => "jpg",
            TileFormat::Webp => "webp",
            TileFormat::Pbf => "pbf",
        }
    }
}

impl FromStr for TileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpg),
            "webp" => Ok(TileFormat::Webp),
            "pbf" => Ok(TileFormat::Pbf),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
