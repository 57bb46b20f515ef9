use std::path::PathBuf;

/// Control node running the speedo `ingest` and `speedo` jobs.
///
/// Commands are read from stdin, one per line: `<job> <START|STOP> [args]`.
#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct SpeedoNode {
    /// JSON lines file of track points, used by `ingest` if START carries no path
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Jobs to START at boot, may be given multiple times
    #[arg(long = "start")]
    pub start: Vec<String>,
}
