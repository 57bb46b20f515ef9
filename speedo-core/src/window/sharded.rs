use std::{str::FromStr, thread};

use bon::Builder;
use indexmap::IndexSet;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    partitioners::{index_select, rendezvous_select},
    types::{EventTime, PositionSample, SpeedObservation},
};

use super::{ShardMerge, SlidingWindows, WatermarkPolicy, WindowState, WindowingEngine};

/// How samples are distributed over the shards of a [ShardedEngine]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShardRouting {
    /// All samples of a key go to the same shard
    #[default]
    Key,
    /// Samples are spread evenly, a key's partials are merged across shards
    RoundRobin,
}

/// Routing name which is neither `key` nor `round-robin`
#[derive(Debug, Error)]
#[error("Unknown shard routing `{0}`, expected `key` or `round-robin`")]
pub struct UnknownRouting(String);

impl FromStr for ShardRouting {
    type Err = UnknownRouting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key" => Ok(Self::Key),
            "round-robin" | "roundrobin" => Ok(Self::RoundRobin),
            _ => Err(UnknownRouting(s.to_owned())),
        }
    }
}

/// Settings for a [ShardedEngine]
#[derive(Debug, Clone, Builder)]
pub struct EngineSettings {
    /// Window definition
    #[builder(default)]
    windows: SlidingWindows,
    /// Watermark policy of every shard
    #[builder(default)]
    watermark: WatermarkPolicy,
    /// Number of parallel shards, at least one shard is always started
    #[builder(default = 4)]
    shards: usize,
    /// Distribution of samples over shards
    #[builder(default)]
    routing: ShardRouting,
    /// Capacity of every shard's input queue and of the merge queue
    #[builder(default = 1024)]
    channel_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EngineSettings {
    /// Window definition
    pub fn windows(&self) -> SlidingWindows {
        self.windows
    }

    /// Number of shards which will be started
    pub fn shards(&self) -> usize {
        self.shards.max(1)
    }

    /// Distribution of samples over shards
    pub fn routing(&self) -> ShardRouting {
        self.routing
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Shard {0} is no longer running")]
    ShardClosed(usize),
    #[error("Shard worker {0} panicked")]
    WorkerPanicked(usize),
    #[error("Merge worker panicked")]
    MergePanicked,
    #[error("Error spawning worker thread: {0:?}")]
    Spawn(#[from] std::io::Error),
}

enum ShardInput {
    Sample(PositionSample),
    Finish,
}

enum ShardEvent {
    Partial(WindowState),
    Watermark { shard: usize, watermark: EventTime },
}

/// Runs one [WindowingEngine] per shard on its own thread and reduces their
/// partial aggregates in a single merge thread.
///
/// Finished observations are sent to the output channel given on spawn, in
/// no particular order across keys.
///
/// # Example
/// ```rust
/// use speedo::types::PositionSample;
/// use speedo::window::{EngineSettings, ShardedEngine};
///
/// let (tx, rx) = flume::unbounded();
/// let settings = EngineSettings::builder().shards(2).build();
/// let mut engine = ShardedEngine::spawn(&settings, tx).unwrap();
/// engine.ingest(PositionSample::new("neil", 0.0, 0.0, 0)).unwrap();
/// engine.ingest(PositionSample::new("neil", 0.0, 0.01, 60_000)).unwrap();
/// engine.finish().unwrap();
///
/// // the two samples share four of their five windows
/// let moving = rx.drain().filter(|x| x.is_moving()).count();
/// assert_eq!(moving, 4);
/// ```
pub struct ShardedEngine {
    inputs: Vec<flume::Sender<ShardInput>>,
    shard_ids: IndexSet<usize>,
    routing: ShardRouting,
    cursor: u64,
    workers: Vec<thread::JoinHandle<()>>,
    merger: thread::JoinHandle<()>,
}

impl ShardedEngine {
    /// Start all shard workers and the merge worker
    pub fn spawn(
        settings: &EngineSettings,
        output: flume::Sender<SpeedObservation>,
    ) -> Result<Self, EngineError> {
        let shards = settings.shards();
        let (merge_tx, merge_rx) = flume::bounded(settings.channel_capacity);
        let merge = ShardMerge::new(shards, settings.routing == ShardRouting::Key);
        let merger = thread::Builder::new()
            .name("speedo-merge".to_owned())
            .spawn(move || merge_loop(merge, merge_rx, output))?;

        let mut inputs = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);
        for shard in 0..shards {
            let (tx, rx) = flume::bounded(settings.channel_capacity);
            let engine = WindowingEngine::new(settings.windows, settings.watermark);
            let merge_tx = merge_tx.clone();
            let worker = thread::Builder::new()
                .name(format!("speedo-shard-{shard}"))
                .spawn(move || shard_loop(shard, engine, rx, merge_tx))?;
            inputs.push(tx);
            workers.push(worker);
        }
        info!(shards, routing = ?settings.routing, "Started windowing engine");

        Ok(Self {
            inputs,
            shard_ids: (0..shards).collect(),
            routing: settings.routing,
            cursor: 0,
            workers,
            merger,
        })
    }

    /// Number of shards
    pub fn shards(&self) -> usize {
        self.inputs.len()
    }

    fn route(&mut self, sample: &PositionSample) -> usize {
        let shard = match self.routing {
            ShardRouting::Key => rendezvous_select(sample.key(), &self.shard_ids),
            ShardRouting::RoundRobin => {
                let shard = index_select(self.cursor, &self.shard_ids);
                self.cursor = self.cursor.wrapping_add(1);
                shard
            }
        };
        shard.unwrap_or_default()
    }

    /// Hand a sample to its shard, blocking while the shard's queue is full
    pub fn ingest(&mut self, sample: PositionSample) -> Result<(), EngineError> {
        let shard = self.route(&sample);
        self.inputs
            .get(shard)
            .ok_or(EngineError::ShardClosed(shard))?
            .send(ShardInput::Sample(sample))
            .map_err(|_| EngineError::ShardClosed(shard))
    }

    /// Hand a sample to its shard, waiting asynchronously while the queue is full
    pub async fn ingest_async(&mut self, sample: PositionSample) -> Result<(), EngineError> {
        let shard = self.route(&sample);
        self.inputs
            .get(shard)
            .ok_or(EngineError::ShardClosed(shard))?
            .send_async(ShardInput::Sample(sample))
            .await
            .map_err(|_| EngineError::ShardClosed(shard))
    }

    /// Signal the end of input: every shard closes all of its open windows,
    /// the merge releases everything and all workers exit.
    ///
    /// Blocks until the workers have terminated.
    pub fn finish(self) -> Result<(), EngineError> {
        for input in self.inputs.iter() {
            // a shard which is gone reports itself on join
            let _ = input.send(ShardInput::Finish);
        }
        drop(self.inputs);
        for (shard, worker) in self.workers.into_iter().enumerate() {
            worker
                .join()
                .map_err(|_| EngineError::WorkerPanicked(shard))?;
        }
        self.merger.join().map_err(|_| EngineError::MergePanicked)
    }
}

fn shard_loop(
    shard: usize,
    mut engine: WindowingEngine,
    input: flume::Receiver<ShardInput>,
    merge: flume::Sender<ShardEvent>,
) {
    let mut last_watermark = None;
    while let Ok(msg) = input.recv() {
        let finishing = matches!(msg, ShardInput::Finish);
        let closed = match msg {
            ShardInput::Sample(sample) => engine.ingest(sample),
            ShardInput::Finish => engine.finish(),
        };
        // partials must reach the merge before the watermark closing them
        for partial in closed {
            if merge.send(ShardEvent::Partial(partial)).is_err() {
                return;
            }
        }
        let watermark = engine.watermark();
        if watermark != last_watermark {
            last_watermark = watermark;
            if let Some(watermark) = watermark {
                if merge
                    .send(ShardEvent::Watermark { shard, watermark })
                    .is_err()
                {
                    return;
                }
            }
        }
        if finishing {
            break;
        }
    }
    debug!(
        shard,
        open = engine.open_windows(),
        late = engine.late_samples(),
        "Shard worker exiting"
    );
}

fn merge_loop(
    mut merge: ShardMerge,
    events: flume::Receiver<ShardEvent>,
    output: flume::Sender<SpeedObservation>,
) {
    while let Ok(event) = events.recv() {
        let done = match event {
            ShardEvent::Partial(partial) => merge.offer(partial),
            ShardEvent::Watermark { shard, watermark } => merge.advance(shard, watermark),
        };
        for observation in done {
            if output.send(observation).is_err() {
                debug!("Observation receiver dropped, stopping merge");
                return;
            }
        }
    }
    debug!(pending = merge.pending(), "Merge worker exiting");
}
