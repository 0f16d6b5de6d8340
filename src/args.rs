use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tilepack::{
    extract::{DEFAULT_ARGS, DEFAULT_PROGRAM, DEFAULT_TIMEOUT},
    pack::{DEFAULT_BATCH_SIZE, DEFAULT_DESCRIPTION, DEFAULT_NAME},
    Bounds, TileFormat,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, disable_help_subcommand = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract tiles from an archive into a ZXY directory
    Extract(ExtractArgs),

    /// Pack a ZXY directory into an MBTiles file
    Pack(PackArgs),
}

#[derive(clap::Args, Debug)]
pub struct ExtractArgs {
    /// Source archive (*.pmtiles)
    pub source_file: PathBuf,

    /// Output ZXY directory
    pub output_dir: PathBuf,

    /// Minimum zoom level
    pub min_zoom: u8,

    /// Maximum zoom level
    pub max_zoom: u8,

    /// Tile format
    #[arg(long, short, default_value_t = TileFormat::Png)]
    pub format: TileFormat,

    /// Program extracting a single tile
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    pub extractor: String,

    /// Extractor argument; {source}, {z}, {x}, {y}, {ext} and {output} are substituted
    #[arg(long = "extractor-arg", allow_hyphen_values = true, default_values_t = DEFAULT_ARGS.map(String::from))]
    pub extractor_args: Vec<String>,

    /// Extractor exit code meaning the tile is not in the source
    #[arg(long)]
    pub not_found_exit_code: Option<i32>,

    /// Seconds a single extractor run may take before the tile is failed
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
}

#[derive(clap::Args, Debug)]
pub struct PackArgs {
    /// Input ZXY directory
    pub source_dir: PathBuf,

    /// Output *.mbtiles file
    pub target_file: PathBuf,

    /// Name
    #[arg(long, short, default_value = DEFAULT_NAME)]
    pub name: String,

    /// Description
    #[arg(long, short, default_value = DEFAULT_DESCRIPTION)]
    pub description: String,

    /// Tile format
    #[arg(long, short, default_value_t = TileFormat::Png)]
    pub format: TileFormat,

    /// Tiles per transaction
    #[arg(long = "batchsize", short, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Lowest zoom level to pack
    #[arg(long)]
    pub min_zoom: Option<u8>,

    /// Highest zoom level to pack
    #[arg(long)]
    pub max_zoom: Option<u8>,

    /// Bounds as west,south,east,north (defaults to the whole world)
    #[arg(long, allow_hyphen_values = true)]
    pub bounds: Option<Bounds>,

    /// Overwrite an existing output file
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
