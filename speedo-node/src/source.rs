use std::path::PathBuf;

use async_trait::async_trait;
use speedo::{
    control::LaunchError,
    pipeline::{SampleSource, SourceFactory},
    types::RawTrackPoint,
};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader, Lines},
};
use tracing::warn;

/// Track points read from a file with one JSON object per line
pub struct JsonLinesSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl JsonLinesSource {
    pub async fn open(path: PathBuf) -> std::io::Result<Self> {
        let file = File::open(&path).await?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
        })
    }
}

#[async_trait]
impl SampleSource for JsonLinesSource {
    async fn next(&mut self) -> Option<RawTrackPoint> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!(path = %self.path.display(), "Error reading source: {e}");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(point) => return Some(point),
                Err(e) => warn!(path = %self.path.display(), "Skipping unparsable line: {e}"),
            }
        }
    }
}

/// Opens the file given as START argument, or the default file
pub struct FileSources {
    default: Option<PathBuf>,
}

impl FileSources {
    pub fn new(default: Option<PathBuf>) -> Self {
        Self { default }
    }
}

#[async_trait]
impl SourceFactory for FileSources {
    async fn build(&self, args: Option<&str>) -> Result<Box<dyn SampleSource>, LaunchError> {
        let path = args
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.default.clone())
            .ok_or_else(|| LaunchError::InvalidArgs {
                target: "ingest".to_owned(),
                reason: "no source file given and no default configured".to_owned(),
            })?;
        Ok(Box::new(JsonLinesSource::open(path).await?))
    }
}
