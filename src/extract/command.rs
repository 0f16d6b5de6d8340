use super::{Extraction, TileExtractor};
use crate::{
    error::{Error, Result},
    tile::{TileCoord, TileFormat},
};
use std::{
    ffi::OsString,
    fs,
    io::{self, Read, Seek},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Duration,
};
use tempfile::TempDir;
use wait_timeout::ChildExt;

/// GDAL's virtual file system copy utility.
pub const DEFAULT_PROGRAM: &str = "gdal_cp.py";

pub const DEFAULT_ARGS: [&str; 2] = ["/vsipmtiles/{source}/{z}/{x}/{y}.{ext}", "{output}"];

/// How long a single run of the program may take before the tile is failed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Extracts tiles by running an external program once per tile.
///
/// Each argument is a template in which `{source}`, `{z}`, `{x}`, `{y}`,
/// `{ext}` and `{output}` are replaced. The program is expected to write the
/// tile to `{output}`; exiting successfully without writing anything means the
/// source has no such tile.
pub struct CommandExtractor {
    source: PathBuf,
    format: TileFormat,
    program: OsString,
    args: Vec<String>,
    not_found_exit_code: Option<i32>,
    timeout: Duration,
    scratch: TempDir,
}

impl CommandExtractor {
    pub fn new(source: &Path, format: TileFormat) -> Result<Self> {
        if !source.is_file() {
            return Err(Error::InvalidSource {
                path: source.to_path_buf(),
                reason: "is not a file",
            });
        }

        let scratch = tempfile::Builder::new()
            .prefix("tilepack-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;

        Ok(CommandExtractor {
            source: source.to_path_buf(),
            format,
            program: DEFAULT_PROGRAM.into(),
            args: DEFAULT_ARGS.iter().map(|arg| arg.to_string()).collect(),
            not_found_exit_code: None,
            timeout: DEFAULT_TIMEOUT,
            scratch,
        })
    }

    pub fn with_command(mut self, program: impl Into<OsString>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    /// Exit code with which the program reports a tile missing from the source.
    pub fn with_not_found_exit_code(mut self, code: i32) -> Self {
        self.not_found_exit_code = Some(code);
        self
    }

    /// Kills the program and fails the tile when a run exceeds `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn expand(&self, template: &str, coord: &TileCoord, output: &Path) -> String {
        template
            .replace("{source}", &self.source.to_string_lossy())
            .replace("{z}", &coord.zoom().to_string())
            .replace("{x}", &coord.column().to_string())
            .replace("{y}", &coord.row().to_string())
            .replace("{ext}", self.format.extension())
            .replace("{output}", &output.to_string_lossy())
    }
}

impl TileExtractor for CommandExtractor {
    fn extract_tile(&self, coord: &TileCoord) -> Result<Extraction> {
        let output = self.scratch.path().join(format!(
            "{}-{}-{}.{}",
            coord.zoom(),
            coord.column(),
            coord.row(),
            self.format
        ));

        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| self.expand(arg, coord, &output))
            .collect();

        log::debug!("running {:?} {:?}", self.program, args);

        // stderr goes to a file so a chatty program cannot block on a full pipe
        let mut stderr = tempfile::tempfile_in(self.scratch.path())
            .map_err(|e| Error::io(self.scratch.path(), e))?;

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr.try_clone().map_err(|e| Error::io(self.scratch.path(), e))?)
            .spawn()
            .map_err(|e| Error::io(&self.program, e))?;

        let status = match child
            .wait_timeout(self.timeout)
            .map_err(|e| Error::io(&self.program, e))?
        {
            Some(status) => status,
            None => {
                child.kill().map_err(|e| Error::io(&self.program, e))?;
                child.wait().map_err(|e| Error::io(&self.program, e))?;

                remove_output(&output)?;

                return Err(Error::Extraction(format!(
                    "{:?} timed out after {}s",
                    self.program,
                    self.timeout.as_secs_f64()
                )));
            }
        };

        let data = match fs::read(&output) {
            Ok(data) => {
                remove_output(&output)?;

                data
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io(&output, e)),
        };

        if status.success() {
            return Ok(if data.is_empty() {
                Extraction::NotFound
            } else {
                Extraction::Tile(data)
            });
        }

        if status.code().is_some() && status.code() == self.not_found_exit_code {
            return Ok(Extraction::NotFound);
        }

        let mut message = String::new();

        stderr
            .rewind()
            .and_then(|_| stderr.read_to_string(&mut message))
            .map_err(|e| Error::io(self.scratch.path(), e))?;

        Err(Error::Extraction(format!(
            "{:?} exited with {}: {}",
            self.program,
            status,
            message.trim()
        )))
    }
}

fn remove_output(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::io(path, e)),
        _ => Ok(()),
    }
}
