mod args;

use args::{Args, Command, ExtractArgs, PackArgs};
use clap::Parser;
use std::{process::ExitCode, time::Duration};
use tilepack::{extract, pack, tile::MAX_ZOOM, CommandExtractor, Error, ExtractConfig, PackConfig};

/// Bad arguments, same code clap uses for usage errors.
const EXIT_CONFIGURATION: u8 = 2;

/// The run finished but some tiles failed.
const EXIT_INCOMPLETE: u8 = 3;

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match try_main(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_INCOMPLETE),
        Err(e) => {
            eprintln!("{e}");

            if e.is_configuration() {
                ExitCode::from(EXIT_CONFIGURATION)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Runs the command, returning whether every tile was processed.
fn try_main(args: Args) -> Result<bool, Error> {
    match args.command {
        Command::Extract(args) => run_extract(args),
        Command::Pack(args) => run_pack(args),
    }
}

fn run_extract(args: ExtractArgs) -> Result<bool, Error> {
    let config = ExtractConfig::new(
        &args.output_dir,
        args.min_zoom,
        args.max_zoom,
        args.format,
    )?;

    let mut extractor = CommandExtractor::new(&args.source_file, args.format)?
        .with_command(args.extractor, args.extractor_args)
        .with_timeout(Duration::from_secs(args.timeout));

    if let Some(code) = args.not_found_exit_code {
        extractor = extractor.with_not_found_exit_code(code);
    }

    let summary = extract(&config, &extractor)?;

    print!("{summary}");

    Ok(summary.is_complete())
}

fn run_pack(args: PackArgs) -> Result<bool, Error> {
    let zoom_range = match (args.min_zoom, args.max_zoom) {
        (None, None) => None,
        (min, max) => Some(min.unwrap_or(0)..=max.unwrap_or(MAX_ZOOM)),
    };

    let config = PackConfig {
        name: args.name,
        description: args.description,
        format: args.format,
        batch_size: args.batch_size,
        bounds: args.bounds,
        zoom_range,
        overwrite: args.force,
    };

    let summary = pack(&args.source_dir, &args.target_file, &config)?;

    print!("{summary}");

    Ok(summary.is_complete())
}
