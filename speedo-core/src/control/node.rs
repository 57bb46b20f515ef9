use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexSet;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    partitioners::rendezvous_select,
    store::{ChangeEvent, Namespace, Store, StoreError, Subscription},
};

use super::{CommandDispatcher, JobRegistry, JobRunner, JobState};

enum PartitionRequest {
    Command(ChangeEvent),
    Inspect(String, oneshot::Sender<Option<JobState>>),
}

/// Serves the command namespace of a store.
///
/// Runs a number of dispatcher partitions as tasks, each owning a
/// [JobRegistry]. Commands are routed to partitions by their job name, so all
/// commands for a job are handled in order by one partition.
pub struct ControlNode {
    partitions: Vec<flume::Sender<PartitionRequest>>,
    partition_ids: IndexSet<usize>,
    registry: JobRegistry,
    router: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl ControlNode {
    /// Subscribe to the command namespace and start serving commands.
    ///
    /// `registry` names the known jobs, every partition starts with a copy of it.
    pub async fn start<S, R>(
        store: &S,
        runner: Arc<R>,
        registry: JobRegistry,
        partitions: usize,
    ) -> Result<Self, StoreError>
    where
        S: Store + ?Sized,
        R: JobRunner + ?Sized,
    {
        let partitions = partitions.max(1);
        let subscription = store.subscribe(Namespace::Command).await?;

        let mut senders = Vec::with_capacity(partitions);
        let mut workers = Vec::with_capacity(partitions);
        for partition in 0..partitions {
            let (tx, rx) = flume::unbounded();
            let dispatcher = CommandDispatcher::new(registry.clone(), runner.clone());
            workers.push(tokio::spawn(partition_loop(partition, dispatcher, rx)));
            senders.push(tx);
        }
        let partition_ids: IndexSet<usize> = (0..partitions).collect();

        let router = tokio::spawn(route_commands(
            subscription,
            registry.clone(),
            partition_ids.clone(),
            senders.clone(),
        ));
        info!(partitions, "Control node started");

        Ok(Self {
            partitions: senders,
            partition_ids,
            registry,
            router,
            workers,
        })
    }

    /// Partition owning a job name
    pub fn partition_of(&self, target: &str) -> usize {
        owner(&self.registry, &self.partition_ids, target)
    }

    /// State of a job as seen by its owning partition.
    ///
    /// Only reflects commands the partition has already handled.
    pub async fn job_state(&self, target: &str) -> Option<JobState> {
        let partition = self.partition_of(target);
        let (tx, rx) = oneshot::channel();
        self.partitions
            .get(partition)?
            .send_async(PartitionRequest::Inspect(target.to_owned(), tx))
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Stop serving commands. Commands already routed are still handled.
    pub async fn shutdown(self) {
        self.router.abort();
        let _ = self.router.await;
        drop(self.partitions);
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                warn!("Dispatcher partition failed: {e}");
            }
        }
        info!("Control node stopped");
    }
}

/// Job names of the same job route equally regardless of case or alias
fn owner(registry: &JobRegistry, partitions: &IndexSet<usize>, target: &str) -> usize {
    let name = registry
        .resolve(target)
        .map(str::to_owned)
        .unwrap_or_else(|| target.trim().to_lowercase());
    rendezvous_select(name.as_str(), partitions).unwrap_or_default()
}

async fn route_commands(
    subscription: Subscription,
    registry: JobRegistry,
    partition_ids: IndexSet<usize>,
    partitions: Vec<flume::Sender<PartitionRequest>>,
) {
    while let Some(event) = subscription.next().await {
        let partition = owner(&registry, &partition_ids, &event.key);
        let Some(tx) = partitions.get(partition) else {
            continue;
        };
        debug!(key = %event.key, partition, "Routing command");
        if tx
            .send_async(PartitionRequest::Command(event))
            .await
            .is_err()
        {
            warn!(partition, "Dispatcher partition is gone, stopping router");
            return;
        }
    }
    debug!("Command subscription ended");
}

async fn partition_loop<R>(
    partition: usize,
    mut dispatcher: CommandDispatcher<R>,
    requests: flume::Receiver<PartitionRequest>,
) where
    R: JobRunner + ?Sized,
{
    while let Ok(request) = requests.recv_async().await {
        match request {
            PartitionRequest::Command(event) => {
                dispatcher.handle_event(&event).await;
            }
            PartitionRequest::Inspect(target, reply) => {
                let _ = reply.send(dispatcher.registry().state(&target));
            }
        }
    }
    debug!(partition, "Dispatcher partition exiting");
}
