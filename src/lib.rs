//! Conversion of map tiles between ZXY directory trees and MBTiles archives.
//!
//! Two independent pipelines share the tile model in [`tile`]:
//!
//! - [`extract`] fills a ZXY tree from a tile archive through an external
//!   per-tile extraction program, skipping tiles already on disk;
//! - [`pack`] walks a ZXY tree with [`walker::TileWalker`] and writes the tiles
//!   into an MBTiles archive in batched transactions.

pub mod error;
pub mod extract;
pub mod pack;
mod schema;
pub mod summary;
pub mod tile;
pub mod walker;

pub use error::{Error, Result};
pub use extract::{extract, CommandExtractor, ExtractConfig, Extraction, TileExtractor};
pub use pack::{pack, ArchiveWriter, Bounds, PackConfig};
pub use summary::{ExtractSummary, PackSummary, TileFailure};
pub use tile::{TileCoord, TileFormat};
pub use walker::{TileEntry, TileWalker};
