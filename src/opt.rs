use clap::{ArgAction, Parser};
use std::convert::Infallible;
use std::path::PathBuf;

pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Options {
    /// Logging verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Directory uploaded files are stored in and served from
    #[arg(long, env = "FILEPILE_UPLOAD_DIR", default_value = "./files")]
    pub upload_dir: PathBuf,

    /// Maximum accepted upload size in bytes
    #[arg(
        long,
        env = "FILEPILE_MAX_UPLOAD_SIZE",
        default_value_t = DEFAULT_MAX_UPLOAD_SIZE,
        value_parser = max_upload_size,
    )]
    pub max_upload_size: u64,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

/// A size that doesn't parse falls back to the default instead of
/// refusing to start.
fn max_upload_size(arg: &str) -> Result<u64, Infallible> {
    Ok(arg.parse().unwrap_or(DEFAULT_MAX_UPLOAD_SIZE))
}
