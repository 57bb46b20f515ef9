use async_trait::async_trait;

use crate::{control::LaunchError, types::RawTrackPoint};

/// Ingestion transport delivering raw track points
#[async_trait]
pub trait SampleSource: Send {
    /// Next point, `None` once the source is exhausted
    async fn next(&mut self) -> Option<RawTrackPoint>;
}

/// Builds the source of an `ingest` job from the job's START arguments
#[async_trait]
pub trait SourceFactory: Send + Sync + 'static {
    async fn build(&self, args: Option<&str>) -> Result<Box<dyn SampleSource>, LaunchError>;
}

/// A source yielding the items of an iterator
pub struct IterSource<I> {
    inner: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = RawTrackPoint>,
{
    pub fn new(points: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: points.into_iter(),
        }
    }
}

#[async_trait]
impl<I> SampleSource for IterSource<I>
where
    I: Iterator<Item = RawTrackPoint> + Send,
{
    async fn next(&mut self) -> Option<RawTrackPoint> {
        self.inner.next()
    }
}

/// Factory replaying the same points for every launch, ignoring arguments
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    points: Vec<RawTrackPoint>,
}

impl ReplaySource {
    pub fn new(points: Vec<RawTrackPoint>) -> Self {
        Self { points }
    }
}

#[async_trait]
impl SourceFactory for ReplaySource {
    async fn build(&self, _args: Option<&str>) -> Result<Box<dyn SampleSource>, LaunchError> {
        Ok(Box::new(IterSource::new(self.points.clone())))
    }
}
